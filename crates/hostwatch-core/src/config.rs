//! hostwatch.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised while applying or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} is not a number")]
    InvalidNumber { key: String, value: String },

    #[error("{key} must be at least 1 second")]
    ZeroDuration { key: &'static str },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostwatchConfig {
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub alert: AlertSection,
}

/// What to probe. List fields are comma-separated strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Route entries: `url` or `ip-url|hostHeader`.
    pub routes: String,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
    /// Alert recipients.
    pub emails: String,
    pub docker_containers: String,
    /// Interface names tried in order when deriving the host key.
    pub interfaces: String,
    /// Upper bound on each supervisorctl/docker/systemctl invocation.
    pub command_timeout_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            routes: String::new(),
            timeout_secs: 5,
            emails: String::new(),
            docker_containers: String::new(),
            interfaces: "eth0,ens5".to_string(),
            command_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    pub data_dir: PathBuf,
    /// Seconds between health-check cycles.
    pub interval_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("/var/lib/hostwatch"),
            interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSection {
    /// Sender address. Alerts are only logged when unset.
    pub from: Option<String>,
    pub sendmail_path: PathBuf,
    pub timeout_secs: u64,
}

impl Default for AlertSection {
    fn default() -> Self {
        Self {
            from: None,
            sendmail_path: PathBuf::from("/usr/sbin/sendmail"),
            timeout_secs: 30,
        }
    }
}

/// A route to probe, parsed from one `routes` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub url: String,
    /// Literal Host header sent when `url` addresses the server directly by IP.
    pub host_header: Option<String>,
}

impl RouteTarget {
    /// Parse `url` or `url|hostHeader`. Returns `None` for blank entries.
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }
        let (url, host_header) = match entry.split_once('|') {
            Some((url, host)) => {
                let host = host.split('|').next().unwrap_or_default().trim();
                (url.trim(), (!host.is_empty()).then(|| host.to_string()))
            }
            None => (entry, None),
        };
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url: url.to_string(),
            host_header,
        })
    }

    /// Name used in issue strings: `host (via url)` for overrides, else
    /// the URL without its scheme.
    pub fn display_name(&self) -> String {
        match &self.host_header {
            Some(host) => format!("{host} (via {})", self.url),
            None => strip_scheme(&self.url).to_string(),
        }
    }
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

/// Typed view of `[monitor]`, passed by value into the health engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub routes: Vec<RouteTarget>,
    pub request_timeout: Duration,
    pub recipients: Vec<String>,
    pub containers: Vec<String>,
    pub interfaces: Vec<String>,
    pub command_timeout: Duration,
}

/// Split a comma-separated list, trimming entries and dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl HostwatchConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HostwatchConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Read the file if given (defaults otherwise), then apply
    /// `HOSTWATCH_*` environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!(?path, "loading config file");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero durations: a zero request or command timeout would fail
    /// every probe immediately.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("monitor.timeout_secs", self.monitor.timeout_secs),
            ("monitor.command_timeout_secs", self.monitor.command_timeout_secs),
            ("server.interval_secs", self.server.interval_secs),
            ("alert.timeout_secs", self.alert.timeout_secs),
        ];
        match durations.into_iter().find(|(_, secs)| *secs == 0) {
            Some((key, _)) => Err(ConfigError::ZeroDuration { key }),
            None => Ok(()),
        }
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HOSTWATCH_ROUTES") {
            self.monitor.routes = v;
        }
        if let Some(v) = lookup("HOSTWATCH_TIMEOUT") {
            self.monitor.timeout_secs = parse_number("HOSTWATCH_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("HOSTWATCH_EMAILS") {
            self.monitor.emails = v;
        }
        if let Some(v) = lookup("HOSTWATCH_DOCKER_CONTAINERS") {
            self.monitor.docker_containers = v;
        }
        if let Some(v) = lookup("HOSTWATCH_INTERFACES") {
            self.monitor.interfaces = v;
        }
        if let Some(v) = lookup("HOSTWATCH_PORT") {
            self.server.port = parse_number("HOSTWATCH_PORT", &v)?;
        }
        if let Some(v) = lookup("HOSTWATCH_DATA_DIR") {
            self.server.data_dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        let m = &self.monitor;
        MonitorConfig {
            routes: m.routes.split(',').filter_map(RouteTarget::parse).collect(),
            request_timeout: Duration::from_secs(m.timeout_secs),
            recipients: split_list(&m.emails),
            containers: split_list(&m.docker_containers),
            interfaces: split_list(&m.interfaces),
            command_timeout: Duration::from_secs(m.command_timeout_secs),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}
