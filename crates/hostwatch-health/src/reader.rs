//! Verdict reader: what the health endpoint serves.
//!
//! Interprets whatever encoding is stored under the host key. Anything
//! missing, unknown, or malformed reads as unhealthy.

use hostwatch_state::{LEGACY_HEALTHY, StateResult, StateStore, StoredVerdict, VerdictStatus};
use serde::Serialize;

use crate::identity::IdentityResolver;

/// Issue reported when nothing is stored for this host.
pub const NO_DATA_ISSUE: &str = "No recent health data";

/// Body of the health endpoint.
///
/// `checked_at` is omitted for legacy and absent payloads. Structured
/// payloads always carry it, as `null` when the record has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReaderResponse {
    pub status: VerdictStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<String>>,
}

impl ReaderResponse {
    pub fn is_ok(&self) -> bool {
        self.status == VerdictStatus::Ok
    }

    /// The echoed timestamp, if there is one.
    pub fn checked_at(&self) -> Option<&str> {
        self.checked_at.as_ref().and_then(|at| at.as_deref())
    }

    fn legacy(status: VerdictStatus) -> Self {
        Self {
            status,
            checked_at: None,
            issues: None,
        }
    }
}

/// Map a stored value (or its absence) to a response.
pub fn interpret(stored: Option<StoredVerdict>) -> ReaderResponse {
    match stored {
        None => ReaderResponse {
            status: VerdictStatus::Unhealthy,
            checked_at: None,
            issues: Some(vec![NO_DATA_ISSUE.to_string()]),
        },
        Some(StoredVerdict::Legacy(value)) if value == LEGACY_HEALTHY => {
            ReaderResponse::legacy(VerdictStatus::Ok)
        }
        Some(StoredVerdict::Legacy(_)) => ReaderResponse::legacy(VerdictStatus::Unhealthy),
        Some(StoredVerdict::Structured(record)) => match record.status.as_deref() {
            Some("ok") => ReaderResponse {
                status: VerdictStatus::Ok,
                checked_at: Some(record.checked_at),
                issues: None,
            },
            _ => ReaderResponse {
                status: VerdictStatus::Unhealthy,
                checked_at: Some(record.checked_at),
                issues: Some(record.issues.unwrap_or_default()),
            },
        },
        Some(StoredVerdict::Unrecognized(_)) => ReaderResponse::legacy(VerdictStatus::Unhealthy),
    }
}

/// Reads the current host's verdict from the store.
#[derive(Clone)]
pub struct VerdictReader {
    store: StateStore,
    identity: IdentityResolver,
}

impl VerdictReader {
    pub fn new(store: StateStore, identity: IdentityResolver) -> Self {
        Self { store, identity }
    }

    /// Read under the resolved host key. Store failures propagate.
    pub fn read(&self) -> StateResult<ReaderResponse> {
        self.read_key(&self.identity.resolve())
    }

    pub fn read_key(&self, key: &str) -> StateResult<ReaderResponse> {
        Ok(interpret(self.store.get_verdict(key)?))
    }
}
