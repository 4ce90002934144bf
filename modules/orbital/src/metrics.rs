//! Orchestrator counters.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

#[derive(Clone)]
pub struct OrbitalMetrics {
    /// Labelled by job type and terminal outcome.
    pub jobs_finalized: IntCounterVec,
    pub jobs_confirmed: IntCounter,
    pub tasks_dispatched: IntCounter,
    pub task_retries: IntCounter,
    pub tasks_failed: IntCounter,
    pub events_notified: IntCounter,
}

impl OrbitalMetrics {
    /// Create and register the counters.
    ///
    /// # Errors
    /// Fails when a collector with the same name is already registered.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let jobs_finalized = IntCounterVec::new(
            Opts::new("orbital_jobs_finalized_total", "Jobs reaching a terminal state"),
            &["job_type", "outcome"],
        )?;
        let jobs_confirmed = IntCounter::new(
            "orbital_jobs_confirmed_total",
            "Terminal jobs garbage-collected",
        )?;
        let tasks_dispatched = IntCounter::new(
            "orbital_tasks_dispatched_total",
            "Task requests published to operators",
        )?;
        let task_retries = IntCounter::new(
            "orbital_task_retries_total",
            "Task dispatches beyond the first attempt",
        )?;
        let tasks_failed = IntCounter::new(
            "orbital_tasks_failed_total",
            "Tasks failed terminally",
        )?;
        let events_notified = IntCounter::new(
            "orbital_job_events_notified_total",
            "Job events published to the observability pipeline",
        )?;

        registry.register(Box::new(jobs_finalized.clone()))?;
        registry.register(Box::new(jobs_confirmed.clone()))?;
        registry.register(Box::new(tasks_dispatched.clone()))?;
        registry.register(Box::new(task_retries.clone()))?;
        registry.register(Box::new(tasks_failed.clone()))?;
        registry.register(Box::new(events_notified.clone()))?;

        Ok(Self {
            jobs_finalized,
            jobs_confirmed,
            tasks_dispatched,
            task_retries,
            tasks_failed,
            events_notified,
        })
    }
}
