//! StateStore: redb-backed verdict cache.
//!
//! Values are JSON envelopes `{ "expires_at": <unix secs>, "value": ... }`
//! stored in redb's `&[u8]` value column. The store supports both on-disk
//! and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::VERDICTS;
use crate::types::StoredVerdict;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    expires_at: u64,
    value: StoredVerdict,
}

impl Envelope {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe verdict store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "verdict store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory verdict store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(VERDICTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Overwrite the value under `key`, expiring `ttl` from now.
    pub fn put_verdict(&self, key: &str, verdict: &StoredVerdict, ttl: Duration) -> StateResult<()> {
        let envelope = Envelope {
            expires_at: epoch_secs().saturating_add(ttl.as_secs()),
            value: verdict.clone(),
        };
        let value = serde_json::to_vec(&envelope).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(VERDICTS).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, ttl_secs = ttl.as_secs(), "verdict stored");
        Ok(())
    }

    /// Get the live value under `key`. Expired entries read as `None`.
    pub fn get_verdict(&self, key: &str) -> StateResult<Option<StoredVerdict>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VERDICTS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let envelope: Envelope =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                if envelope.is_expired(epoch_secs()) {
                    debug!(%key, "verdict expired");
                    return Ok(None);
                }
                Ok(Some(envelope.value))
            }
            None => Ok(None),
        }
    }

    /// Delete the value under `key`. Returns true if it existed.
    pub fn delete_verdict(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(VERDICTS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "verdict deleted");
        Ok(existed)
    }

    /// Remove every expired entry. Returns number removed.
    pub fn purge_expired(&self) -> StateResult<u32> {
        let now = epoch_secs();
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(VERDICTS).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, value) = entry.ok()?;
                    // Unreadable envelopes are dropped too.
                    let expired = serde_json::from_slice::<Envelope>(value.value())
                        .map(|e| e.is_expired(now))
                        .unwrap_or(true);
                    expired.then(|| key.value().to_string())
                })
                .collect()
        };
        if keys.is_empty() {
            return Ok(0);
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(VERDICTS).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count, "expired verdicts purged");
        Ok(count)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
