//! Daemon wiring: opens the store, builds the engine, serves `/health`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hostwatch_core::HostwatchConfig;
use hostwatch_health::{
    CommandProbe, HealthEngine, IdentityResolver, LogMailer, Mailer, SendmailMailer,
    VerdictReader, mark_healthy,
};
use hostwatch_state::StateStore;
use tokio::sync::watch;
use tracing::{error, info, warn};

fn open_store(config: &HostwatchConfig) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join("hostwatch.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "verdict store opened");
    Ok(store)
}

fn identity(config: &HostwatchConfig) -> IdentityResolver {
    IdentityResolver::new(config.monitor_config().interfaces)
}

fn build_engine(config: &HostwatchConfig, store: StateStore) -> anyhow::Result<HealthEngine> {
    let monitor = config.monitor_config();
    info!(
        routes = monitor.routes.len(),
        containers = monitor.containers.len(),
        recipients = monitor.recipients.len(),
        "monitor configured"
    );

    let system = Arc::new(CommandProbe::new(monitor.command_timeout));
    let mailer: Arc<dyn Mailer> = match &config.alert.from {
        Some(from) => Arc::new(SendmailMailer::new(
            config.alert.sendmail_path.clone(),
            from.clone(),
            Duration::from_secs(config.alert.timeout_secs),
        )),
        None => {
            if !monitor.recipients.is_empty() {
                warn!("alert recipients configured without [alert].from; alerts will only be logged");
            }
            Arc::new(LogMailer)
        }
    };

    Ok(HealthEngine::new(monitor, store, system, mailer)?)
}

/// Run the check loop and the HTTP server until Ctrl-C.
pub async fn run_daemon(config: HostwatchConfig, mark: bool) -> anyhow::Result<()> {
    info!("hostwatch daemon starting");

    let store = open_store(&config)?;
    let engine = Arc::new(build_engine(&config, store.clone())?);
    info!(key = %engine.identity().resolve(), "host identity resolved");

    if mark {
        mark_healthy(&store, engine.identity())?;
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Check loop ─────────────────────────────────────────────

    let interval = Duration::from_secs(config.server.interval_secs.max(1));
    let engine_handle = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.run(interval, shutdown_rx).await;
        })
    };

    // ── API server ─────────────────────────────────────────────

    let reader = VerdictReader::new(store, engine.identity().clone());
    let router = hostwatch_api::build_router(reader);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = engine_handle.await;

    info!("hostwatch daemon stopped");
    Ok(())
}

/// Run one cycle and print the verdict. Returns whether it was ok.
pub async fn run_check(config: &HostwatchConfig) -> anyhow::Result<bool> {
    let store = open_store(config)?;
    let engine = build_engine(config, store)?;
    match engine.run_cycle().await? {
        Some(verdict) => {
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(verdict.is_ok())
        }
        None => anyhow::bail!("a check cycle is already running"),
    }
}

/// Print what `/health` would answer. Returns whether it is ok.
pub fn run_status(config: &HostwatchConfig) -> anyhow::Result<bool> {
    let store = open_store(config)?;
    let reader = VerdictReader::new(store, identity(config));
    let resp = reader.read()?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(resp.is_ok())
}

pub fn run_mark_healthy(config: &HostwatchConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let key = mark_healthy(&store, &identity(config))?;
    println!("{key}");
    Ok(())
}
