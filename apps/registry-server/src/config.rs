//! Server configuration.
//!
//! Layered: defaults -> YAML file -> `KCM__*` environment overlay. Secret
//! fields accept `${VAR}` references resolved at load time. The full schema
//! is validated once at startup; the process refuses to boot on the first
//! violation.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use orbital::OrbitalConfig;
use registry_validation::ValidatorConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub grpc_server: GrpcServerConfig,
    #[serde(default)]
    pub status_server: StatusServerConfig,
    pub database: DatabaseConfig,
    pub orbital: OrbitalConfig,
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,
    /// Tenant region allow-list; feeds the built-in enum rule.
    pub regions: Vec<String>,
    #[serde(default = "default_owner_types")]
    pub owner_types: Vec<String>,
    /// Enables RPC reflection.
    #[serde(default)]
    pub debug_mode: bool,
}

fn default_owner_types() -> Vec<String> {
    vec!["operator".to_owned(), "customer".to_owned()]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrpcServerConfig {
    #[serde(default = "default_grpc_address")]
    pub address: String,
    #[serde(default = "default_max_recv_msg_size")]
    pub max_recv_msg_size: usize,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            address: default_grpc_address(),
            max_recv_msg_size: default_max_recv_msg_size(),
            keepalive: KeepaliveConfig::default(),
        }
    }
}

fn default_grpc_address() -> String {
    "0.0.0.0:9090".to_owned()
}

fn default_max_recv_msg_size() -> usize {
    4 * 1024 * 1024
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeepaliveConfig {
    #[serde(with = "humantime_serde", default = "default_connection_idle")]
    pub max_connection_idle: Duration,
    #[serde(with = "humantime_serde", default = "default_connection_age")]
    pub max_connection_age: Duration,
    #[serde(with = "humantime_serde", default = "default_connection_age_grace")]
    pub max_connection_age_grace: Duration,
    /// Server keepalive ping interval.
    #[serde(with = "humantime_serde", default = "default_keepalive_time")]
    pub time: Duration,
    #[serde(with = "humantime_serde", default = "default_keepalive_timeout")]
    pub timeout: Duration,
    #[serde(default)]
    pub enforcement: EnforcementConfig,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            max_connection_idle: default_connection_idle(),
            max_connection_age: default_connection_age(),
            max_connection_age_grace: default_connection_age_grace(),
            time: default_keepalive_time(),
            timeout: default_keepalive_timeout(),
            enforcement: EnforcementConfig::default(),
        }
    }
}

fn default_connection_idle() -> Duration {
    Duration::from_secs(300)
}

fn default_connection_age() -> Duration {
    Duration::from_secs(600)
}

fn default_connection_age_grace() -> Duration {
    Duration::from_secs(30)
}

fn default_keepalive_time() -> Duration {
    Duration::from_secs(120)
}

fn default_keepalive_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnforcementConfig {
    #[serde(with = "humantime_serde", default = "default_min_time")]
    pub min_time: Duration,
    #[serde(default)]
    pub permit_without_stream: bool,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            min_time: default_min_time(),
            permit_without_stream: false,
        }
    }
}

fn default_min_time() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusServerConfig {
    #[serde(default = "default_status_address")]
    pub address: String,
}

impl Default for StatusServerConfig {
    fn default() -> Self {
        Self {
            address: default_status_address(),
        }
    }
}

fn default_status_address() -> String {
    "0.0.0.0:8080".to_owned()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub name: String,
    /// `${VAR}` references are expanded from the environment.
    pub user: String,
    pub password: String,
}

fn default_db_port() -> u16 {
    5432
}

impl DatabaseConfig {
    /// Postgres DSN with secret references resolved.
    ///
    /// # Errors
    /// Fails when a referenced environment variable is unset.
    pub fn dsn(&self) -> anyhow::Result<String> {
        let user = expand_env(&self.user)?;
        let password = expand_env(&self.password)?;
        Ok(format!(
            "postgres://{user}:{password}@{}:{}/{}",
            self.host, self.port, self.name
        ))
    }
}

/// Expand `${VAR}` references against the process environment.
fn expand_env(value: &str) -> anyhow::Result<String> {
    let pattern = regex::Regex::new(r"\$\{([A-Za-z0-9_]+)\}")?;
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for captures in pattern.captures_iter(value) {
        let whole = captures.get(0).map_or(0..0, |m| m.range());
        let name = &captures[1];
        out.push_str(&value[last..whole.start]);
        out.push_str(
            &std::env::var(name)
                .map_err(|_| anyhow::anyhow!("environment variable {name} is not set"))?,
        );
        last = whole.end;
    }
    out.push_str(&value[last..]);
    Ok(out)
}

impl AppConfig {
    /// Load the layered configuration.
    ///
    /// # Errors
    /// Propagates file, parse and schema errors.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed("KCM__").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Full schema validation; fail fast before accepting traffic.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.grpc_server
            .address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| anyhow::anyhow!("grpc_server.address: {e}"))?;
        self.status_server
            .address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| anyhow::anyhow!("status_server.address: {e}"))?;
        if self.regions.is_empty() {
            anyhow::bail!("regions: at least one tenant region is required");
        }
        if self.database.host.is_empty() || self.database.name.is_empty() {
            anyhow::bail!("database: host and name are required");
        }
        self.orbital.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_loads_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(
            &path,
            r#"
database:
  host: localhost
  name: registry
  user: registry
  password: secret
regions: [test-region]
orbital:
  targets:
    - region: test-region
      connection:
        type: amqp
        amqp:
          url: amqp://localhost:5672
          source: ops.responses
          target: ops.requests
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        config.validate().unwrap();
        assert_eq!(config.grpc_server.address, "0.0.0.0:9090");
        assert_eq!(config.orbital.workers.len(), 4);
        assert!(!config.debug_mode);
    }

    #[test]
    fn unknown_worker_name_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(
            &path,
            r#"
database: { host: localhost, name: registry, user: u, password: p }
regions: [test-region]
orbital:
  workers:
    - name: shredder
  targets:
    - region: test-region
      connection:
        type: amqp
        amqp: { url: amqp://localhost, source: s, target: t }
"#,
        )
        .unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn dsn_expands_env_references() {
        let cfg = DatabaseConfig {
            host: "db".to_owned(),
            port: 5432,
            name: "registry".to_owned(),
            user: "svc".to_owned(),
            password: "${KCM_TEST_DB_PASSWORD}".to_owned(),
        };
        // set_var is unsafe in edition 2024; the name is test-local.
        unsafe { std::env::set_var("KCM_TEST_DB_PASSWORD", "hunter2") };
        assert_eq!(
            cfg.dsn().unwrap(),
            "postgres://svc:hunter2@db:5432/registry"
        );
    }
}
