//! Bounded retry harness shared by every probe kind.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::probe::ProbeOutcome;

/// Attempt cap and fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Run `attempt` until it succeeds or the policy is exhausted.
///
/// Intermediate failures are only logged. On exhaustion the final failure
/// is turned into issue lines by `to_issues`.
pub async fn with_retry<A, Fut, E, M>(
    policy: RetryPolicy,
    label: &str,
    mut attempt: A,
    to_issues: M,
) -> ProbeOutcome
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
    M: FnOnce(E) -> Vec<String>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match attempt().await {
            Ok(()) => {
                if attempts > 1 {
                    debug!(probe = %label, attempts, "probe recovered");
                }
                return ProbeOutcome::Passed;
            }
            Err(failure) if attempts >= max_attempts => {
                let mut issues = to_issues(failure);
                if issues.is_empty() {
                    issues.push(format!("{label}: check failed"));
                }
                warn!(probe = %label, attempts, ?issues, "probe failed");
                return ProbeOutcome::Failed(issues);
            }
            Err(failure) => {
                debug!(probe = %label, attempt = attempts, error = %failure, "probe attempt failed");
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let calls = AtomicU32::new(0);
        let outcome = with_retry(
            fast(),
            "test",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            },
            |e| vec![e],
        )
        .await;

        assert_eq!(outcome, ProbeOutcome::Passed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_on_last_attempt() {
        let calls = AtomicU32::new(0);
        let outcome = with_retry(
            fast(),
            "test",
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(format!("fail {n}")) } else { Ok(()) }
            },
            |e| vec![e],
        )
        .await;

        assert_eq!(outcome, ProbeOutcome::Passed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_only_last_failure() {
        let calls = AtomicU32::new(0);
        let outcome = with_retry(
            fast(),
            "test",
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err::<(), _>(format!("fail {n}"))
            },
            |e| vec![format!("Thing: {e}")],
        )
        .await;

        assert_eq!(outcome, ProbeOutcome::Failed(vec!["Thing: fail 3".to_string()]));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn waits_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(30),
        };
        let start = Instant::now();
        let _ = with_retry(policy, "test", || async { Err::<(), _>("down") }, |_| vec![]).await;

        // Two waits, none after the final attempt.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn empty_issue_list_gets_placeholder() {
        let outcome = with_retry(fast(), "supervisor", || async { Err::<(), _>("x") }, |_| vec![]).await;
        assert_eq!(
            outcome,
            ProbeOutcome::Failed(vec!["supervisor: check failed".to_string()])
        );
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::from_millis(1),
        };
        let _ = with_retry(
            policy,
            "test",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("down")
            },
            |e| vec![e.to_string()],
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
