//! Health engine: one check cycle end to end.
//!
//! A cycle runs every probe, aggregates the outcomes into a verdict,
//! overwrites the host's entry in the store, and alerts if unhealthy.
//! Alerting happens strictly after the store write and never fails the
//! cycle; a store failure does.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use hostwatch_core::MonitorConfig;
use hostwatch_state::{HealthVerdict, StateError, StateResult, StateStore, StoredVerdict};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::aggregate::aggregate;
use crate::alert::{AlertDispatcher, Mailer};
use crate::identity::IdentityResolver;
use crate::probe::{ProbeOutcome, ProbeSpec};
use crate::retry::RetryPolicy;
use crate::route::RouteProber;
use crate::system::{SystemProbe, probe_container, probe_daemon, probe_supervisor};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

pub struct HealthEngine {
    config: MonitorConfig,
    store: StateStore,
    identity: IdentityResolver,
    routes: RouteProber,
    system: Arc<dyn SystemProbe>,
    alerts: AlertDispatcher,
    policy: RetryPolicy,
    /// Held for the duration of a cycle.
    in_flight: Mutex<()>,
}

impl HealthEngine {
    pub fn new(
        config: MonitorConfig,
        store: StateStore,
        system: Arc<dyn SystemProbe>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, EngineError> {
        let routes = RouteProber::new(config.request_timeout)
            .map_err(|e| EngineError::HttpClient(e.to_string()))?;
        let identity = IdentityResolver::new(config.interfaces.clone());
        Ok(Self {
            config,
            store,
            identity,
            routes,
            system,
            alerts: AlertDispatcher::new(mailer),
            policy: RetryPolicy::default(),
            in_flight: Mutex::new(()),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_identity(mut self, identity: IdentityResolver) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_alerts(mut self, alerts: AlertDispatcher) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    /// Run one probe through the retry harness.
    pub async fn probe(&self, spec: &ProbeSpec) -> ProbeOutcome {
        let system = self.system.as_ref();
        match spec {
            ProbeSpec::Route(target) => self.routes.probe(target, self.policy).await,
            ProbeSpec::Supervisor => probe_supervisor(system, self.policy).await,
            ProbeSpec::Container { name } => probe_container(system, name, self.policy).await,
            ProbeSpec::Daemon => probe_daemon(system, self.policy).await,
        }
    }

    /// Run every configured probe. Routes run concurrently; outcomes keep
    /// plan order.
    pub async fn probe_all(&self) -> Vec<ProbeOutcome> {
        let plan = ProbeSpec::plan(&self.config);
        let (routes, others): (Vec<&ProbeSpec>, Vec<&ProbeSpec>) = plan
            .iter()
            .partition(|spec| matches!(spec, ProbeSpec::Route(_)));

        let mut outcomes = join_all(routes.into_iter().map(|spec| self.probe(spec))).await;
        for spec in others {
            outcomes.push(self.probe(spec).await);
        }
        outcomes
    }

    /// Run one cycle. Returns `None` when another cycle is still running.
    pub async fn run_cycle(&self) -> Result<Option<HealthVerdict>, EngineError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("health check cycle already in flight, skipping");
            return Ok(None);
        };

        let started = Instant::now();
        let verdict = aggregate(self.probe_all().await);
        let key = self.identity.resolve();

        self.store.put_verdict(
            &key,
            &StoredVerdict::from(&verdict),
            Duration::from_secs(verdict.ttl_seconds()),
        )?;
        info!(
            %key,
            status = verdict.status().as_str(),
            issues = verdict.issues().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "health verdict stored"
        );

        if let Err(e) = self.store.purge_expired() {
            warn!(error = %e, "failed to purge expired verdicts");
        }

        if !verdict.is_ok() {
            self.alerts.notify(&verdict, &self.config.recipients).await;
        }

        Ok(Some(verdict))
    }

    /// Run a cycle every `interval` (first one immediately) until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "health engine started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(Some(verdict)) => debug!(status = verdict.status().as_str(), "cycle complete"),
                        Ok(None) => {}
                        Err(e) => error!(error = %e, "health check cycle failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("health engine shutting down");
                    break;
                }
            }
        }
    }
}

/// Store the legacy `"healthy"` marker under this host's key so a freshly
/// booted instance is served as healthy until the first cycle completes.
pub fn mark_healthy(store: &StateStore, identity: &IdentityResolver) -> StateResult<String> {
    let key = identity.resolve();
    store.put_verdict(
        &key,
        &StoredVerdict::legacy_healthy(),
        Duration::from_secs(hostwatch_state::VERDICT_TTL_SECS),
    )?;
    info!(%key, "instance marked healthy");
    Ok(key)
}
