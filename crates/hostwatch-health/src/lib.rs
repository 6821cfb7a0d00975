//! hostwatch-health: the health-check engine.
//!
//! Runs heterogeneous, flaky checks against the local host and turns them
//! into a single verdict stored under the host's key.
//!
//! # Architecture
//!
//! ```text
//! HealthEngine::run_cycle
//!   ├── ProbeSpec::plan(config)       routes, supervisor, containers, cron
//!   │   └── with_retry()              3 attempts, 500ms apart
//!   │       ├── RouteProber           HTTP GET (Host override, no TLS verify)
//!   │       └── SystemProbe           supervisorctl / docker / systemctl
//!   ├── aggregate() → HealthVerdict   ok iff no issues, ttl 480s
//!   ├── StateStore::put_verdict       key from IdentityResolver
//!   └── AlertDispatcher::notify       only when unhealthy, best-effort
//!
//! VerdictReader::read                 same IdentityResolver, any stored encoding
//! ```
//!
//! Issue strings are surfaced on the public health endpoint, so they are
//! kept short and free of internal detail.

pub mod aggregate;
pub mod alert;
pub mod engine;
pub mod identity;
pub mod probe;
pub mod reader;
pub mod retry;
pub mod route;
pub mod system;

#[cfg(test)]
mod testing;

pub use aggregate::aggregate;
pub use alert::{AlertDispatcher, AlertError, AlertMessage, LogMailer, Mailer, SendmailMailer};
pub use engine::{EngineError, HealthEngine, mark_healthy};
pub use identity::IdentityResolver;
pub use probe::{BoxFuture, ProbeOutcome, ProbeSpec};
pub use reader::{ReaderResponse, VerdictReader};
pub use retry::RetryPolicy;
pub use route::RouteProber;
pub use system::{CommandProbe, SystemProbe};
