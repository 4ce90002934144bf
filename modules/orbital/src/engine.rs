//! Orchestrator engine.
//!
//! One [`Orbital`] per process. The composition root wires operator clients
//! (one per region) and outcome handlers (one per job type), then calls
//! [`Orbital::start`] to spawn the worker pools. Every pool draws ready rows
//! through `FOR UPDATE SKIP LOCKED`, so multiple registry instances can share
//! one database without double-processing.

use std::collections::HashMap;
use std::sync::Arc;

use registry_db::Db;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::OperatorClient;
use crate::config::{OrbitalConfig, WorkerKind};
use crate::error::OrbitalError;
use crate::handler::JobHandler;
use crate::metrics::OrbitalMetrics;
use crate::worker;

pub struct Orbital {
    pub(crate) db: Db,
    pub(crate) cfg: OrbitalConfig,
    pub(crate) metrics: OrbitalMetrics,
    pub(crate) clients: HashMap<String, Arc<dyn OperatorClient>>,
    pub(crate) handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl Orbital {
    #[must_use]
    pub fn new(db: Db, cfg: OrbitalConfig, metrics: OrbitalMetrics) -> Self {
        Self {
            db,
            cfg,
            metrics,
            clients: HashMap::new(),
            handlers: HashMap::new(),
        }
    }

    /// Register the operator client of one region.
    #[must_use]
    pub fn with_client(mut self, region: impl Into<String>, client: Arc<dyn OperatorClient>) -> Self {
        self.clients.insert(region.into(), client);
        self
    }

    /// Register the outcome handler of one job type.
    #[must_use]
    pub fn with_handler(mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(job_type.into(), handler);
        self
    }

    pub(crate) fn handler(&self, job_type: &str) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(job_type)
    }

    /// Spawn every configured worker pool. Workers stop at the next tick after
    /// `cancel` fires; in-flight units of work finish within their timeout.
    pub fn start(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for worker_cfg in &self.cfg.workers {
            for _ in 0..worker_cfg.no_of_workers {
                let orbital = Arc::clone(self);
                let cancel = cancel.clone();
                let cfg = worker_cfg.clone();
                handles.push(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(cfg.exec_interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        tokio::select! {
                            () = cancel.cancelled() => {
                                debug!(worker = cfg.name.as_str(), "worker stopped");
                                break;
                            }
                            _ = ticker.tick() => {
                                match tokio::time::timeout(cfg.timeout, orbital.tick(cfg.name)).await {
                                    Ok(Ok(())) => {}
                                    Ok(Err(e)) => {
                                        warn!(worker = cfg.name.as_str(), error = %e, "worker tick failed");
                                    }
                                    Err(_) => {
                                        warn!(worker = cfg.name.as_str(), "worker tick timed out");
                                    }
                                }
                            }
                        }
                    }
                }));
            }
        }
        handles
    }

    /// One unit of work of the given pool. Exposed so tests can drive the
    /// pipeline deterministically.
    ///
    /// # Errors
    /// Propagates repository and client failures; the enclosing worker loop
    /// logs and retries on the next tick.
    pub async fn tick(&self, kind: WorkerKind) -> Result<(), OrbitalError> {
        match kind {
            WorkerKind::CreateTask => worker::create_task::run(self).await,
            WorkerKind::Reconcile => worker::reconcile::run(self).await,
            WorkerKind::ConfirmJob => worker::confirm::run(self).await,
            WorkerKind::NotifyEvent => worker::notify::run(self).await,
        }
    }
}
