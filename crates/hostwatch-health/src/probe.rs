//! Probe definitions and outcomes.

use std::future::Future;
use std::pin::Pin;

use hostwatch_core::{MonitorConfig, RouteTarget};

/// Boxed future returned by the injectable capabilities.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One check against an external dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeSpec {
    /// HTTP GET, optionally sending a literal Host header.
    Route(RouteTarget),
    /// `supervisorctl status`.
    Supervisor,
    /// `docker inspect` of one container.
    Container { name: String },
    /// `systemctl is-active cron`.
    Daemon,
}

impl ProbeSpec {
    /// Short name for logs.
    pub fn label(&self) -> String {
        match self {
            ProbeSpec::Route(target) => format!("route {}", target.display_name()),
            ProbeSpec::Supervisor => "supervisor".to_string(),
            ProbeSpec::Container { name } => format!("container {name}"),
            ProbeSpec::Daemon => "cron".to_string(),
        }
    }

    /// Every probe a cycle runs, in execution order: routes, supervisor,
    /// containers, cron.
    pub fn plan(config: &MonitorConfig) -> Vec<ProbeSpec> {
        let mut plan: Vec<ProbeSpec> = config.routes.iter().cloned().map(ProbeSpec::Route).collect();
        plan.push(ProbeSpec::Supervisor);
        plan.extend(
            config
                .containers
                .iter()
                .map(|name| ProbeSpec::Container { name: name.clone() }),
        );
        plan.push(ProbeSpec::Daemon);
        plan
    }
}

/// Result of running one probe through the retry harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Passed,
    /// Display-safe issue lines from the final failing attempt. Never empty.
    Failed(Vec<String>),
}

impl ProbeOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, ProbeOutcome::Passed)
    }

    pub fn issues(&self) -> &[String] {
        match self {
            ProbeOutcome::Passed => &[],
            ProbeOutcome::Failed(issues) => issues,
        }
    }

    pub fn into_issues(self) -> Vec<String> {
        match self {
            ProbeOutcome::Passed => Vec::new(),
            ProbeOutcome::Failed(issues) => issues,
        }
    }
}
