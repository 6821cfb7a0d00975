//! redb table definitions for the verdict store.

use redb::TableDefinition;

/// Verdict envelopes keyed by host key (`system_health_status:{mac}`).
pub const VERDICTS: TableDefinition<&str, &[u8]> = TableDefinition::new("verdicts");
