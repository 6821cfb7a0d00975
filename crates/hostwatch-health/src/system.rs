//! Subprocess-backed probes: supervisor programs, containers, and cron.
//!
//! The commands themselves sit behind [`SystemProbe`] so the engine can be
//! driven by a fake in tests. Parsing of their output lives in plain
//! functions below.

use std::fmt;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::probe::{BoxFuture, ProbeOutcome};
use crate::retry::{RetryPolicy, with_retry};

/// Access to the host's process supervisor, container runtime, and init
/// system. Each method returns the command's stdout, or `None` when the
/// command could not be run at all.
pub trait SystemProbe: Send + Sync {
    /// Output of `supervisorctl status`.
    fn supervisor_status(&self) -> BoxFuture<'_, Option<String>>;

    /// `"<running> <health>"` for one container, health possibly absent.
    fn container_state<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Option<String>>;

    /// Output of `systemctl is-active <service>`.
    fn service_state<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Option<String>>;
}

/// Runs the real commands, each bounded by a timeout.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Capture stdout regardless of exit status: `supervisorctl` exits
    /// non-zero whenever a program is down, and that output is what we need.
    async fn stdout(&self, program: &str, args: &[&str]) -> Option<String> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => Some(String::from_utf8_lossy(&output.stdout).into_owned()),
            Ok(Err(e)) => {
                debug!(%program, error = %e, "command failed to run");
                None
            }
            Err(_) => {
                debug!(%program, timeout_secs = self.timeout.as_secs(), "command timed out");
                None
            }
        }
    }
}

impl SystemProbe for CommandProbe {
    fn supervisor_status(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(self.stdout("supervisorctl", &["status"]))
    }

    fn container_state<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            self.stdout(
                "docker",
                &[
                    "inspect",
                    "--format",
                    "{{.State.Running}} {{if .State.Health}}{{.State.Health.Status}}{{end}}",
                    name,
                ],
            )
            .await
        })
    }

    fn service_state<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move { self.stdout("systemctl", &["is-active", service]).await })
    }
}

// ── Supervisor ─────────────────────────────────────────────────────

/// Issue lines of a failed supervisor attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorFailure(pub Vec<String>);

impl fmt::Display for SupervisorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

fn running_marker() -> &'static Regex {
    static RUNNING: OnceLock<Regex> = OnceLock::new();
    RUNNING.get_or_init(|| Regex::new(r"\s+RUNNING\s+").expect("static regex"))
}

/// Every non-empty status line without a whitespace-delimited `RUNNING`.
pub fn supervisor_issues(output: &str) -> Vec<String> {
    output
        .trim()
        .lines()
        .filter(|line| !line.is_empty() && !running_marker().is_match(line))
        .map(|line| format!("Supervisor: {line}"))
        .collect()
}

pub async fn probe_supervisor(system: &dyn SystemProbe, policy: RetryPolicy) -> ProbeOutcome {
    with_retry(
        policy,
        "supervisor",
        || async {
            let Some(output) = system.supervisor_status().await else {
                return Err(SupervisorFailure(vec![
                    "Supervisor: status unavailable".to_string(),
                ]));
            };
            let issues = supervisor_issues(&output);
            if issues.is_empty() {
                Ok(())
            } else {
                Err(SupervisorFailure(issues))
            }
        },
        |failure| failure.0,
    )
    .await
}

// ── Containers ─────────────────────────────────────────────────────

/// Evaluate `docker inspect` output for `name`.
pub fn container_check(name: &str, output: Option<&str>) -> Result<(), String> {
    let inspect = output.map(str::trim).unwrap_or_default();
    if inspect.is_empty() {
        return Err(format!("Docker: {name} not found or cannot inspect"));
    }

    let mut parts = inspect.split_whitespace();
    let running = parts.next().unwrap_or("false");
    let health = parts.next();

    if running != "true" {
        return Err(format!("Docker: {name} not running"));
    }
    match health {
        Some(health) if health != "healthy" => Err(format!("Docker: {name} health={health}")),
        _ => Ok(()),
    }
}

pub async fn probe_container(
    system: &dyn SystemProbe,
    name: &str,
    policy: RetryPolicy,
) -> ProbeOutcome {
    let label = format!("container {name}");
    with_retry(
        policy,
        &label,
        || async {
            let output = system.container_state(name).await;
            container_check(name, output.as_deref())
        },
        |issue| vec![issue],
    )
    .await
}

// ── Cron ───────────────────────────────────────────────────────────

/// Service whose liveness is checked.
pub const CRON_SERVICE: &str = "cron";

pub fn daemon_check(output: Option<&str>) -> Result<(), String> {
    match output.map(str::trim) {
        Some("active") => Ok(()),
        _ => Err("Cron: service not active".to_string()),
    }
}

pub async fn probe_daemon(system: &dyn SystemProbe, policy: RetryPolicy) -> ProbeOutcome {
    with_retry(
        policy,
        CRON_SERVICE,
        || async {
            let output = system.service_state(CRON_SERVICE).await;
            daemon_check(output.as_deref())
        },
        |issue| vec![issue],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSystem;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    const ALL_RUNNING: &str = "\
nginx                            RUNNING   pid 101, uptime 1 day, 2:03:04
queue-worker:queue-worker_00     RUNNING   pid 102, uptime 1 day, 2:03:04
";

    #[test]
    fn supervisor_all_running() {
        assert!(supervisor_issues(ALL_RUNNING).is_empty());
        assert!(supervisor_issues("").is_empty());
    }

    #[test]
    fn supervisor_collects_each_bad_line() {
        let output = "\
nginx                            RUNNING   pid 101, uptime 1 day, 2:03:04
horizon                          FATAL     Exited too quickly (process log may have details)

scheduler                        STOPPED   Not started
";
        assert_eq!(
            supervisor_issues(output),
            vec![
                "Supervisor: horizon                          FATAL     Exited too quickly (process log may have details)",
                "Supervisor: scheduler                        STOPPED   Not started",
            ]
        );
    }

    #[test]
    fn supervisor_marker_needs_surrounding_whitespace() {
        assert_eq!(supervisor_issues("app NOTRUNNING x").len(), 1);
        assert_eq!(supervisor_issues("app RUNNING").len(), 1);
        assert!(supervisor_issues("app\tRUNNING\tpid 1").is_empty());
    }

    #[test]
    fn container_states() {
        assert_eq!(container_check("redis", Some("true \n")), Ok(()));
        assert_eq!(container_check("redis", Some("true healthy")), Ok(()));
        assert_eq!(
            container_check("redis", Some("true unhealthy")),
            Err("Docker: redis health=unhealthy".to_string())
        );
        assert_eq!(
            container_check("redis", Some("true starting")),
            Err("Docker: redis health=starting".to_string())
        );
        assert_eq!(
            container_check("redis", Some("false healthy")),
            Err("Docker: redis not running".to_string())
        );
        assert_eq!(
            container_check("redis", Some("")),
            Err("Docker: redis not found or cannot inspect".to_string())
        );
        assert_eq!(
            container_check("redis", None),
            Err("Docker: redis not found or cannot inspect".to_string())
        );
    }

    #[test]
    fn daemon_states() {
        assert_eq!(daemon_check(Some("active\n")), Ok(()));
        assert!(daemon_check(Some("inactive")).is_err());
        assert!(daemon_check(Some("activating")).is_err());
        assert_eq!(daemon_check(None), Err("Cron: service not active".to_string()));
    }

    #[tokio::test]
    async fn command_probe_captures_stdout() {
        let probe = CommandProbe::new(Duration::from_secs(5));
        assert_eq!(probe.stdout("echo", &["active"]).await.as_deref(), Some("active\n"));
    }

    #[tokio::test]
    async fn command_probe_missing_binary_is_none() {
        let probe = CommandProbe::new(Duration::from_secs(5));
        assert_eq!(probe.stdout("hostwatch-no-such-command", &[]).await, None);
    }

    #[tokio::test]
    async fn command_probe_times_out() {
        let probe = CommandProbe::new(Duration::from_millis(50));
        assert_eq!(probe.stdout("sleep", &["5"]).await, None);
    }

    #[tokio::test]
    async fn supervisor_reports_final_attempt_lines() {
        let system = ScriptedSystem::default();
        system.push_supervisor(Some("web STARTING\n"));
        system.push_supervisor(Some("web BACKOFF\n"));
        system.push_supervisor(Some("web FATAL\nworker STOPPED\n"));

        let outcome = probe_supervisor(&system, fast()).await;
        assert_eq!(
            outcome,
            ProbeOutcome::Failed(vec![
                "Supervisor: web FATAL".to_string(),
                "Supervisor: worker STOPPED".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn supervisor_unavailable_is_unhealthy() {
        let system = ScriptedSystem::default();
        for _ in 0..3 {
            system.push_supervisor(None);
        }
        let outcome = probe_supervisor(&system, fast()).await;
        assert_eq!(outcome.issues(), ["Supervisor: status unavailable"]);
    }

    #[tokio::test]
    async fn container_recovers_during_restart() {
        let system = ScriptedSystem::default();
        system.push_container(Some("false"));
        system.push_container(Some("true healthy"));

        let outcome = probe_container(&system, "redis", fast()).await;
        assert!(outcome.is_passed());
        assert_eq!(system.container_calls(), 2);
    }

    #[tokio::test]
    async fn daemon_fails_after_three_attempts() {
        let system = ScriptedSystem::default();
        for _ in 0..3 {
            system.push_service(Some("inactive"));
        }
        let outcome = probe_daemon(&system, fast()).await;
        assert_eq!(outcome.issues(), ["Cron: service not active"]);
        assert_eq!(system.service_calls(), 3);
    }
}
