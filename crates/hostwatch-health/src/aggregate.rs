//! Verdict aggregation.

use chrono::{DateTime, SecondsFormat, Utc};
use hostwatch_state::{HealthVerdict, VERDICT_TTL_SECS};

use crate::probe::ProbeOutcome;

/// Combine outcomes into one verdict stamped with the current time.
pub fn aggregate<I>(outcomes: I) -> HealthVerdict
where
    I: IntoIterator<Item = ProbeOutcome>,
{
    aggregate_at(outcomes, Utc::now())
}

/// Issues keep the order of `outcomes`.
pub fn aggregate_at<I>(outcomes: I, checked_at: DateTime<Utc>) -> HealthVerdict
where
    I: IntoIterator<Item = ProbeOutcome>,
{
    let issues: Vec<String> = outcomes
        .into_iter()
        .flat_map(ProbeOutcome::into_issues)
        .collect();
    HealthVerdict::new(
        issues,
        checked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        VERDICT_TTL_SECS,
    )
}
