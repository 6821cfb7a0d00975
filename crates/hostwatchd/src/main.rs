//! hostwatchd: the hostwatch daemon.
//!
//! Single binary that wires the health engine, the verdict store (redb),
//! and the `/health` endpoint together.
//!
//! # Usage
//!
//! ```text
//! hostwatchd --config /etc/hostwatch.toml run --mark-healthy
//! hostwatchd check            # one cycle, print the verdict
//! hostwatchd status           # what /health would answer
//! hostwatchd mark-healthy     # boot hook: serve healthy until the first cycle
//! ```

mod daemon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hostwatch_core::HostwatchConfig;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,hostwatchd=debug,hostwatch_health=debug";

#[derive(Parser)]
#[command(name = "hostwatchd", about = "Periodic host health monitor")]
struct Cli {
    /// Path to hostwatch.toml. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run checks on an interval and serve `/health`.
    Run {
        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the verdict store.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Seconds between check cycles.
        #[arg(long)]
        interval: Option<u64>,

        /// Store the healthy marker before the first cycle.
        #[arg(long)]
        mark_healthy: bool,
    },
    /// Run a single check cycle and print the verdict.
    Check {
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the verdict currently served for this host.
    Status {
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Mark this instance healthy (run on boot).
    MarkHealthy {
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = HostwatchConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            port,
            data_dir,
            interval,
            mark_healthy,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(interval) = interval {
                config.server.interval_secs = interval;
            }
            apply_data_dir(&mut config, data_dir);
            daemon::run_daemon(config, mark_healthy).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { data_dir } => {
            apply_data_dir(&mut config, data_dir);
            exit_code(daemon::run_check(&config).await?)
        }
        Command::Status { data_dir } => {
            apply_data_dir(&mut config, data_dir);
            exit_code(daemon::run_status(&config)?)
        }
        Command::MarkHealthy { data_dir } => {
            apply_data_dir(&mut config, data_dir);
            daemon::run_mark_healthy(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// Logs go to stderr so `check`/`status` output stays parseable.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn apply_data_dir(config: &mut HostwatchConfig, data_dir: Option<PathBuf>) {
    if let Some(dir) = data_dir {
        config.server.data_dir = dir;
    }
}

fn exit_code(healthy: bool) -> anyhow::Result<ExitCode> {
    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
