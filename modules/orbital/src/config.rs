//! Orchestrator configuration.
//!
//! Worker names form a closed set; anything else fails deserialization, and
//! [`OrbitalConfig::validate`] rejects the remaining invalid shapes before the
//! process accepts traffic.

use std::time::Duration;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrbitalConfig {
    /// Completed jobs older than this are garbage-collected.
    #[serde(with = "humantime_serde", default = "default_confirm_job_after")]
    pub confirm_job_after: Duration,
    /// Max rows one worker tick picks up.
    #[serde(default = "default_task_limit_num")]
    pub task_limit_num: u64,
    /// Attempts after which a task fails terminally.
    #[serde(default = "default_max_reconcile_count")]
    pub max_reconcile_count: u32,
    #[serde(with = "humantime_serde", default = "default_backoff_base")]
    pub backoff_base_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_backoff_max")]
    pub backoff_max_interval: Duration,
    pub targets: Vec<TargetConfig>,
    #[serde(default = "WorkerConfig::default_set")]
    pub workers: Vec<WorkerConfig>,
}

fn default_confirm_job_after() -> Duration {
    Duration::from_secs(600)
}

fn default_task_limit_num() -> u64 {
    50
}

fn default_max_reconcile_count() -> u32 {
    10
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(2)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(300)
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub region: String,
    pub connection: ConnectionConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    #[serde(rename = "type")]
    pub kind: ConnectionKind,
    pub amqp: AmqpConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionKind {
    Amqp,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmqpConfig {
    pub url: String,
    /// Queue the registry consumes operator responses from.
    pub source: String,
    /// Queue the registry publishes task requests to.
    pub target: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(rename = "type", default)]
    pub kind: AuthKind,
    #[serde(default)]
    pub mtls: Option<MtlsConfig>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthKind {
    #[default]
    None,
    Mtls,
}

/// Client TLS material. `cert_file` is the client identity as a PKCS#12
/// archive, `key_file` holds its passphrase, `ca_file` the PEM chain used to
/// verify the broker.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MtlsConfig {
    pub ca_file: String,
    pub cert_file: String,
    pub key_file: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerKind {
    ConfirmJob,
    CreateTask,
    Reconcile,
    NotifyEvent,
}

impl WorkerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerKind::ConfirmJob => "confirm-job",
            WorkerKind::CreateTask => "create-task",
            WorkerKind::Reconcile => "reconcile",
            WorkerKind::NotifyEvent => "notify-event",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    pub name: WorkerKind,
    #[serde(default = "default_workers")]
    pub no_of_workers: usize,
    #[serde(with = "humantime_serde", default = "default_exec_interval")]
    pub exec_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_workers() -> usize {
    1
}

fn default_exec_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl WorkerConfig {
    fn default_for(name: WorkerKind) -> Self {
        Self {
            name,
            no_of_workers: default_workers(),
            exec_interval: match name {
                WorkerKind::ConfirmJob => Duration::from_secs(60),
                _ => default_exec_interval(),
            },
            timeout: default_timeout(),
        }
    }

    #[must_use]
    pub fn default_set() -> Vec<Self> {
        vec![
            Self::default_for(WorkerKind::CreateTask),
            Self::default_for(WorkerKind::Reconcile),
            Self::default_for(WorkerKind::ConfirmJob),
            Self::default_for(WorkerKind::NotifyEvent),
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrbitalConfigError {
    #[error("orbital: at least one target is required")]
    NoTargets,
    #[error("orbital: duplicate target region {0}")]
    DuplicateRegion(String),
    #[error("orbital worker {0}: no_of_workers must be at least 1")]
    NoWorkers(&'static str),
    #[error("orbital worker {0}: exec_interval must be positive")]
    ZeroInterval(&'static str),
    #[error("orbital target {region}: mtls auth requires tls material")]
    MissingTls { region: String },
}

impl OrbitalConfig {
    /// Full schema validation, run once at startup.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), OrbitalConfigError> {
        if self.targets.is_empty() {
            return Err(OrbitalConfigError::NoTargets);
        }
        let mut regions = std::collections::HashSet::new();
        for target in &self.targets {
            if !regions.insert(target.region.as_str()) {
                return Err(OrbitalConfigError::DuplicateRegion(target.region.clone()));
            }
            if target.connection.auth.kind == AuthKind::Mtls
                && target.connection.auth.mtls.is_none()
            {
                return Err(OrbitalConfigError::MissingTls {
                    region: target.region.clone(),
                });
            }
        }
        for worker in &self.workers {
            if worker.no_of_workers == 0 {
                return Err(OrbitalConfigError::NoWorkers(worker.name.as_str()));
            }
            if worker.exec_interval.is_zero() {
                return Err(OrbitalConfigError::ZeroInterval(worker.name.as_str()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> OrbitalConfig {
        serde_json::from_value(serde_json::json!({
            "targets": [{
                "region": "test-region",
                "connection": {
                    "type": "amqp",
                    "amqp": {"url": "amqp://localhost:5672", "source": "ops.responses", "target": "ops.requests"}
                }
            }]
        }))
        .unwrap()
    }

    #[test]
    fn defaults_fill_worker_pools() {
        let cfg = minimal();
        assert_eq!(cfg.workers.len(), 4);
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_worker_name_is_rejected_by_serde() {
        let err = serde_json::from_value::<WorkerConfig>(serde_json::json!({
            "name": "shredder"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("shredder"));
    }

    #[test]
    fn mtls_without_material_fails_validation() {
        let mut cfg = minimal();
        cfg.targets[0].connection.auth.kind = AuthKind::Mtls;
        assert!(matches!(
            cfg.validate(),
            Err(OrbitalConfigError::MissingTls { .. })
        ));
    }

    #[test]
    fn empty_targets_fail_validation() {
        let mut cfg = minimal();
        cfg.targets.clear();
        assert!(matches!(cfg.validate(), Err(OrbitalConfigError::NoTargets)));
    }
}
