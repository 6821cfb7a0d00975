//! HTTP route probe.
//!
//! Plain routes are fetched with certificate verification on. Routes with a
//! Host header override target a literal address before DNS and certificates
//! are in place, so they go through a second client that skips verification.

use std::fmt;
use std::time::Duration;

use hostwatch_core::RouteTarget;
use reqwest::header::{HOST, USER_AGENT};
use tracing::debug;

use crate::probe::ProbeOutcome;
use crate::retry::{RetryPolicy, with_retry};

const PROBE_USER_AGENT: &str = "hostwatch/0.1";

/// Why a single route attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteFailure {
    /// A response arrived with a non-2xx status.
    Status(u16),
    /// No response: timeout, refused connection, TLS error, ...
    Transport(String),
}

impl fmt::Display for RouteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteFailure::Status(code) => write!(f, "HTTP {code}"),
            RouteFailure::Transport(msg) => f.write_str(msg),
        }
    }
}

impl RouteFailure {
    /// Issue line for an exhausted probe.
    pub fn issue(&self, target: &RouteTarget) -> String {
        let name = target.display_name();
        match self {
            RouteFailure::Status(code) => format!("Route failed: {name} (HTTP {code})"),
            RouteFailure::Transport(msg) => format!("Route exception: {name} ({msg})"),
        }
    }
}

/// Issues GET requests for route probes.
#[derive(Clone)]
pub struct RouteProber {
    verified: reqwest::Client,
    insecure: reqwest::Client,
    timeout: Duration,
}

impl RouteProber {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let verified = reqwest::Client::builder().timeout(timeout).build()?;
        let insecure = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            verified,
            insecure,
            timeout,
        })
    }

    /// One GET. Success is any 2xx response.
    pub async fn attempt(&self, target: &RouteTarget) -> Result<(), RouteFailure> {
        let request = match &target.host_header {
            Some(host) => self.insecure.get(&target.url).header(HOST, host.as_str()),
            None => self.verified.get(&target.url),
        };

        match request.header(USER_AGENT, PROBE_USER_AGENT).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => {
                debug!(status = %resp.status(), url = %target.url, "route probe non-2xx");
                Err(RouteFailure::Status(resp.status().as_u16()))
            }
            Err(e) => {
                debug!(error = %e, url = %target.url, "route probe request failed");
                Err(RouteFailure::Transport(self.describe(&e)))
            }
        }
    }

    /// Run the route through the retry harness.
    pub async fn probe(&self, target: &RouteTarget, policy: RetryPolicy) -> ProbeOutcome {
        let label = target.display_name();
        with_retry(
            policy,
            &label,
            || self.attempt(target),
            |failure| vec![failure.issue(target)],
        )
        .await
    }

    // Keeps the message terse and free of the full URL.
    fn describe(&self, e: &reqwest::Error) -> String {
        if e.is_timeout() {
            format!("timed out after {}s", self.timeout.as_secs_f32())
        } else if e.is_connect() {
            "connection failed".to_string()
        } else {
            let mut msg = e.to_string();
            if let Some(url) = e.url() {
                msg = msg.replace(&format!(" for url ({url})"), "");
            }
            msg
        }
    }
}
