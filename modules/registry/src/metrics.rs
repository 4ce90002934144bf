//! RPC outcome counters.

use prometheus::{IntCounterVec, Opts, Registry};

#[derive(Clone)]
pub struct ApiMetrics {
    requests: IntCounterVec,
}

impl ApiMetrics {
    /// Create and register the counters.
    ///
    /// # Errors
    /// Fails when a collector with the same name is already registered.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests = IntCounterVec::new(
            Opts::new("registry_requests_total", "RPC requests by operation and outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(requests.clone()))?;
        Ok(Self { requests })
    }

    pub fn observe(&self, operation: &str, ok: bool) {
        self.requests
            .with_label_values(&[operation, if ok { "ok" } else { "error" }])
            .inc();
    }
}
