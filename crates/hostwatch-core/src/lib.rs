//! hostwatch-core: configuration shared by every hostwatch crate.
//!
//! The on-disk `hostwatch.toml` keeps the flat, comma-separated string
//! surface operators already use (`routes = "https://a,10.0.0.5|b.example"`).
//! [`HostwatchConfig::monitor_config`] turns it into the typed, immutable
//! [`MonitorConfig`] handed to the health engine.

pub mod config;

pub use config::{
    AlertSection, ConfigError, HostwatchConfig, MonitorConfig, MonitorSection, RouteTarget,
    ServerSection,
};
