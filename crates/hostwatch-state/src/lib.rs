//! hostwatch-state: verdict types and the expiring verdict store.
//!
//! Backed by [redb](https://docs.rs/redb). A single table maps the host key
//! (`system_health_status:<mac>`) to a JSON envelope holding the stored
//! verdict and its absolute expiry. Expired entries read as absent, so the
//! store behaves like a cache with per-key TTL.
//!
//! Stored values come in two encodings (see [`StoredVerdict`]): the bare
//! `"healthy"` string written by older writers and by `mark-healthy`, and
//! the structured record written by the health engine. Both are decoded
//! here, at the store boundary.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and is shared between the check loop and the HTTP reader.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
