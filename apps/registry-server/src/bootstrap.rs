//! Composition root: wire the repository, validators, services, orchestrator
//! and the two listeners, then run until a shutdown signal.

use std::sync::Arc;

use anyhow::Context as _;
use orbital::{AmqpClient, Orbital, OrbitalMetrics};
use registry::api::grpc::{AuthApi, MappingApi, SystemApi, TenantApi};
use registry::domain::jobs;
use registry::domain::validation::register_builtin;
use registry::metrics::ApiMetrics;
use registry::{AuthProjector, AuthService, MappingService, SystemService, TenantService};
use registry_db::Db;
use registry_grpc::{
    AuthServiceServer, MappingServiceServer, SystemServiceServer, TenantServiceServer,
};
use registry_validation::ValidatorRegistry;
use sea_orm_migration::MigratorTrait;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::info;

use crate::config::AppConfig;
use crate::recover::RecoverLayer;
use crate::status;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let dsn = config.database.dsn()?;
    let db = Db::connect(&dsn).await.context("database connection")?;
    registry::infra::storage::migrations::Migrator::up(db.sea(), None)
        .await
        .context("registry migrations")?;
    orbital::migrations::Migrator::up(db.sea(), None)
        .await
        .context("orbital migrations")?;
    info!("database ready");

    // Validation: built-in rule sets, then config extensions.
    let mut validators = ValidatorRegistry::new();
    register_builtin(&mut validators, &config.regions, &config.owner_types)?;
    validators
        .apply_config(&config.validators)
        .context("validators config")?;
    let validators = Arc::new(validators);

    let metrics_registry = prometheus::Registry::new();
    let api_metrics = ApiMetrics::register(&metrics_registry)?;
    let orbital_metrics = OrbitalMetrics::register(&metrics_registry)?;

    // Orchestrator: one operator client per configured region, one outcome
    // handler per job type.
    let mut engine = Orbital::new(db.clone(), config.orbital.clone(), orbital_metrics)
        .with_handler(jobs::PROVISION_TENANT, Arc::new(jobs::TenantLifecycleHandler))
        .with_handler(jobs::BLOCK_TENANT, Arc::new(jobs::TenantLifecycleHandler))
        .with_handler(jobs::UNBLOCK_TENANT, Arc::new(jobs::TenantLifecycleHandler))
        .with_handler(jobs::TERMINATE_TENANT, Arc::new(jobs::TenantLifecycleHandler))
        .with_handler(jobs::APPLY_AUTH, Arc::new(jobs::AuthLifecycleHandler))
        .with_handler(jobs::REMOVE_AUTH, Arc::new(jobs::AuthLifecycleHandler));
    for target in &config.orbital.targets {
        let client = AmqpClient::connect(target)
            .await
            .with_context(|| format!("operator client for region {}", target.region))?;
        engine = engine.with_client(target.region.clone(), Arc::new(client));
    }
    let engine = Arc::new(engine);

    let cancel = CancellationToken::new();
    let worker_handles = engine.start(&cancel);
    info!(pools = config.orbital.workers.len(), "orbital workers started");

    // Domain services and their transports.
    let tenants = Arc::new(TenantService::new(
        db.clone(),
        validators.clone(),
        Arc::new(AuthProjector),
    ));
    let systems = Arc::new(SystemService::new(db.clone(), validators.clone()));
    let auths = Arc::new(AuthService::new(db.clone(), validators));
    let mappings = Arc::new(MappingService::new(db));

    let max_msg = config.grpc_server.max_recv_msg_size;
    let tenant_svc = TenantServiceServer::new(TenantApi::new(tenants, api_metrics.clone()))
        .max_decoding_message_size(max_msg);
    let system_svc = SystemServiceServer::new(SystemApi::new(systems, api_metrics.clone()))
        .max_decoding_message_size(max_msg);
    let mapping_svc = MappingServiceServer::new(MappingApi::new(mappings, api_metrics.clone()))
        .max_decoding_message_size(max_msg);
    let auth_svc = AuthServiceServer::new(AuthApi::new(auths, api_metrics.clone()))
        .max_decoding_message_size(max_msg);

    let (mut health_reporter, health_svc) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<TenantServiceServer<TenantApi>>()
        .await;
    health_reporter
        .set_serving::<SystemServiceServer<SystemApi>>()
        .await;
    health_reporter
        .set_serving::<MappingServiceServer<MappingApi>>()
        .await;
    health_reporter
        .set_serving::<AuthServiceServer<AuthApi>>()
        .await;

    // Reflection only in debug mode.
    let reflection_svc = if config.debug_mode {
        Some(
            tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(registry_grpc::v1::FILE_DESCRIPTOR_SET)
                .build_v1()?,
        )
    } else {
        None
    };

    let grpc_address: std::net::SocketAddr = config.grpc_server.address.parse()?;
    let keepalive = &config.grpc_server.keepalive;
    let grpc_cancel = cancel.clone();
    let grpc = Server::builder()
        .http2_keepalive_interval(Some(keepalive.time))
        .http2_keepalive_timeout(Some(keepalive.timeout))
        .tcp_keepalive(Some(keepalive.max_connection_idle))
        .max_connection_age(keepalive.max_connection_age)
        .layer(RecoverLayer::new(api_metrics))
        .add_service(health_svc)
        .add_service(tenant_svc)
        .add_service(system_svc)
        .add_service(mapping_svc)
        .add_service(auth_svc)
        .add_optional_service(reflection_svc)
        .serve_with_shutdown(grpc_address, async move {
            grpc_cancel.cancelled().await;
        });
    info!(address = %grpc_address, "rpc server started");

    let status_address: std::net::SocketAddr = config.status_server.address.parse()?;
    let status_task = tokio::spawn(status::serve(
        status_address,
        metrics_registry,
        cancel.clone(),
    ));

    tokio::select! {
        result = grpc => result.context("rpc server")?,
        () = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    // Stop the pools; in-flight units finish within their timeout.
    cancel.cancel();
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = status_task.await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            signal.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
