//! Verdict types.
//!
//! [`HealthVerdict`] is what one check cycle produces. [`StoredVerdict`]
//! is what the store hands back on read: it accepts every encoding ever
//! written under a host key.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Cache lifetime of a verdict, also embedded in the payload (8 minutes).
pub const VERDICT_TTL_SECS: u64 = 8 * 60;

/// Legacy bare-string value meaning "healthy".
pub const LEGACY_HEALTHY: &str = "healthy";

/// Overall result of a check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Ok,
    Unhealthy,
}

impl VerdictStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerdictStatus::Ok => "ok",
            VerdictStatus::Unhealthy => "unhealthy",
        }
    }
}

/// The aggregate result of one check cycle.
///
/// Fields are private so that `issues` is non-empty exactly when `status`
/// is `Unhealthy`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthVerdict {
    status: VerdictStatus,
    checked_at: String,
    ttl_seconds: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<String>,
}

impl HealthVerdict {
    /// Build a verdict from the collected issues. No issues means `Ok`.
    pub fn new(issues: Vec<String>, checked_at: impl Into<String>, ttl_seconds: u64) -> Self {
        let status = if issues.is_empty() {
            VerdictStatus::Ok
        } else {
            VerdictStatus::Unhealthy
        };
        Self {
            status,
            checked_at: checked_at.into(),
            ttl_seconds,
            issues,
        }
    }

    pub fn status(&self) -> VerdictStatus {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == VerdictStatus::Ok
    }

    pub fn checked_at(&self) -> &str {
        &self.checked_at
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn issues(&self) -> &[String] {
        &self.issues
    }
}

/// Structured payload as found in the store. Every field is optional
/// because older or foreign writers may omit any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<String>>,
}

/// A value stored under a host key, in any of its encodings.
///
/// Decoding goes by JSON shape: strings are legacy, objects that fit
/// [`StoredRecord`] are structured, everything else (arrays included) is
/// unrecognized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoredVerdict {
    /// Bare status string (`"healthy"` / anything else).
    Legacy(String),
    /// Record shaped like [`HealthVerdict`].
    Structured(StoredRecord),
    /// Anything else. Readers treat it as unhealthy.
    Unrecognized(Value),
}

impl<'de> Deserialize<'de> for StoredVerdict {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(status) => StoredVerdict::Legacy(status),
            Value::Object(_) => match StoredRecord::deserialize(&value) {
                Ok(record) => StoredVerdict::Structured(record),
                Err(_) => StoredVerdict::Unrecognized(value),
            },
            other => StoredVerdict::Unrecognized(other),
        })
    }
}

impl StoredVerdict {
    /// The value written by `mark-healthy` on boot.
    pub fn legacy_healthy() -> Self {
        StoredVerdict::Legacy(LEGACY_HEALTHY.to_string())
    }
}

impl From<&HealthVerdict> for StoredVerdict {
    fn from(verdict: &HealthVerdict) -> Self {
        StoredVerdict::Structured(StoredRecord {
            status: Some(verdict.status.as_str().to_string()),
            checked_at: Some(verdict.checked_at.clone()),
            ttl_seconds: Some(verdict.ttl_seconds),
            issues: (!verdict.issues.is_empty()).then(|| verdict.issues.clone()),
        })
    }
}
