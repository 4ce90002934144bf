//! Lifecycle services against in-memory SQLite, with the orchestrator driven
//! through the in-memory operator client.

use std::collections::HashMap;
use std::sync::Arc;

use orbital::{MemoryClient, Orbital, OrbitalMetrics, WorkerKind};
use registry::domain::jobs::{self, AuthLifecycleHandler, TenantLifecycleHandler};
use registry::domain::model::{NewAuth, NewSystem, NewTenant, RegionSeed, SystemRef};
use registry::domain::validation::register_builtin;
use registry::infra::storage::entity::auth::{self, AuthStatus};
use registry::infra::storage::entity::regional_system;
use registry::infra::storage::entity::system;
use registry::infra::storage::entity::tenant::{self, TenantRole, TenantStatus};
use registry::{AuthProjector, AuthService, DomainError, MappingService, SystemService, TenantService};
use registry_db::{CompositeKey, Db, ListQuery};
use registry_grpc::operator::v1::{OperatorResponse, OperatorResult};
use registry_validation::ValidatorRegistry;
use sea_orm::ActiveValue::Set;
use sea_orm_migration::MigratorTrait;

const REGION: &str = "test-region";

struct Ctx {
    db: Db,
    tenants: TenantService,
    systems: SystemService,
    auths: AuthService,
    mappings: MappingService,
    engine: Arc<Orbital>,
    client: Arc<MemoryClient>,
}

async fn setup() -> Ctx {
    let db = Db::connect("sqlite::memory:").await.unwrap();
    registry::infra::storage::migrations::Migrator::up(db.sea(), None)
        .await
        .unwrap();
    orbital::migrations::Migrator::up(db.sea(), None).await.unwrap();

    let mut validators = ValidatorRegistry::new();
    register_builtin(
        &mut validators,
        &[REGION.to_owned()],
        &["operator".to_owned(), "customer".to_owned()],
    )
    .unwrap();
    let validators = Arc::new(validators);

    let orbital_cfg: orbital::OrbitalConfig = serde_json::from_value(serde_json::json!({
        "backoff_base_interval": "0s",
        "backoff_max_interval": "0s",
        "targets": [{
            "region": REGION,
            "connection": {
                "type": "amqp",
                "amqp": {
                    "url": "amqp://localhost:5672",
                    "source": "ops.responses",
                    "target": "ops.requests"
                }
            }
        }]
    }))
    .unwrap();
    let client = Arc::new(MemoryClient::new());
    let engine = Arc::new(
        Orbital::new(
            db.clone(),
            orbital_cfg,
            OrbitalMetrics::register(&prometheus::Registry::new()).unwrap(),
        )
        .with_client(REGION, client.clone() as Arc<dyn orbital::OperatorClient>)
        .with_handler(jobs::PROVISION_TENANT, Arc::new(TenantLifecycleHandler))
        .with_handler(jobs::BLOCK_TENANT, Arc::new(TenantLifecycleHandler))
        .with_handler(jobs::UNBLOCK_TENANT, Arc::new(TenantLifecycleHandler))
        .with_handler(jobs::TERMINATE_TENANT, Arc::new(TenantLifecycleHandler))
        .with_handler(jobs::APPLY_AUTH, Arc::new(AuthLifecycleHandler))
        .with_handler(jobs::REMOVE_AUTH, Arc::new(AuthLifecycleHandler)),
    );

    Ctx {
        tenants: TenantService::new(db.clone(), validators.clone(), Arc::new(AuthProjector)),
        systems: SystemService::new(db.clone(), validators.clone()),
        auths: AuthService::new(db.clone(), validators),
        mappings: MappingService::new(db.clone()),
        db,
        engine,
        client,
    }
}

fn new_tenant(id: &str) -> NewTenant {
    NewTenant {
        id: id.to_owned(),
        name: format!("tenant {id}"),
        region: REGION.to_owned(),
        owner_id: "O".to_owned(),
        owner_type: "operator".to_owned(),
        role: Some(TenantRole::Live),
        labels: HashMap::new(),
        user_groups: vec!["kms-admins".to_owned()],
    }
}

async fn force_tenant_status(db: &Db, id: &str, status: TenantStatus) {
    registry_db::patch(
        &db.conn(),
        tenant::ActiveModel {
            id: Set(id.to_owned()),
            status: Set(status),
            ..Default::default()
        },
    )
    .await
    .unwrap();
}

async fn force_auth_status(db: &Db, external_id: &str, status: AuthStatus) {
    registry_db::patch(
        &db.conn(),
        auth::ActiveModel {
            external_id: Set(external_id.to_owned()),
            status: Set(status),
            ..Default::default()
        },
    )
    .await
    .unwrap();
}

/// Drive the orchestrator one full round: fan out created jobs, dispatch
/// their tasks, then answer every request on the bus with `result`.
/// Responses for already-terminal tasks are ignored by the reconciler, so
/// pending jobs from earlier steps cannot corrupt state (their projections
/// are guarded by the current status).
async fn run_cycle(ctx: &Ctx, result: OperatorResult) {
    ctx.engine.tick(WorkerKind::CreateTask).await.unwrap();
    ctx.engine.tick(WorkerKind::Reconcile).await.unwrap();
    for request in ctx.client.sent() {
        ctx.client.push_response(OperatorResponse {
            task_id: request.task_id.clone(),
            job_id: request.job_id.clone(),
            result: result.into(),
            message: String::new(),
        });
    }
    ctx.engine.tick(WorkerKind::Reconcile).await.unwrap();
}

async fn register_system(ctx: &Ctx, external_id: &str, system_type: &str) {
    ctx.systems
        .register(NewSystem {
            external_id: external_id.to_owned(),
            system_type: system_type.to_owned(),
            tenant_id: None,
            labels: HashMap::new(),
            regions: vec![RegionSeed {
                region: REGION.to_owned(),
                l2_key_id: format!("l2-{external_id}"),
            }],
        })
        .await
        .unwrap();
}

fn type_ref(external_id: &str, system_type: &str) -> SystemRef {
    SystemRef {
        external_id: external_id.to_owned(),
        system_type: Some(system_type.to_owned()),
    }
}

// --- tenant lifecycle ----------------------------------------------------

#[tokio::test]
async fn tenant_provisioning_reaches_active_on_operator_success() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    assert_eq!(
        ctx.tenants.get("T1").await.unwrap().status,
        TenantStatus::Provisioning
    );

    run_cycle(&ctx, OperatorResult::Done).await;

    assert_eq!(ctx.tenants.get("T1").await.unwrap().status, TenantStatus::Active);
    let jobs_rows = registry_db::list::<orbital::entity::job::Entity, _>(
        &ctx.db.conn(),
        &ListQuery::new().with_filter(CompositeKey::new().eq("external_id", "T1")),
    )
    .await
    .unwrap()
    .items;
    assert_eq!(jobs_rows.len(), 1);
    assert_eq!(jobs_rows[0].state, orbital::entity::JobState::Done);
}

#[tokio::test]
async fn tenant_provisioning_failure_surfaces_error_status() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    run_cycle(&ctx, OperatorResult::Failed).await;
    assert_eq!(
        ctx.tenants.get("T1").await.unwrap().status,
        TenantStatus::ProvisioningError
    );

    // PROVISIONING_ERROR allows a fresh registration attempt.
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    assert_eq!(
        ctx.tenants.get("T1").await.unwrap().status,
        TenantStatus::Provisioning
    );
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    let err = ctx.tenants.register(new_tenant("T1")).await.unwrap_err();
    assert!(matches!(err, DomainError::AlreadyExists(_)));
}

#[tokio::test]
async fn registration_validates_fields() {
    let ctx = setup().await;

    let mut bad_region = new_tenant("T1");
    bad_region.region = "mars-1".to_owned();
    let err = ctx.tenants.register(bad_region).await.unwrap_err();
    assert!(err.to_string().contains("Tenant.Region"));

    let mut no_role = new_tenant("T2");
    no_role.role = None;
    let err = ctx.tenants.register(no_role).await.unwrap_err();
    assert!(err.to_string().contains("Tenant.Role"));

    let mut bad_group = new_tenant("T3");
    bad_group.user_groups = vec!["not valid!".to_owned()];
    let err = ctx.tenants.register(bad_group).await.unwrap_err();
    assert!(err.to_string().contains("Tenant.UserGroups"));
}

#[tokio::test]
async fn block_requires_active_status() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();

    let err = ctx.tenants.block("T1").await.unwrap_err();
    assert!(matches!(err, DomainError::FailedPrecondition { .. }));
    assert_eq!(
        ctx.tenants.get("T1").await.unwrap().status,
        TenantStatus::Provisioning
    );

    let err = ctx.tenants.block("ghost").await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));
}

#[tokio::test]
async fn block_with_transient_auth_is_rejected_and_rows_unchanged() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T2")).await.unwrap();
    force_tenant_status(&ctx.db, "T2", TenantStatus::Active).await;
    ctx.auths
        .apply(NewAuth {
            external_id: "A2".to_owned(),
            tenant_id: "T2".to_owned(),
            auth_type: "oidc".to_owned(),
            properties: HashMap::new(),
        })
        .await
        .unwrap();
    // A2 is APPLYING: mid-flight.
    let err = ctx.tenants.block("T2").await.unwrap_err();
    assert!(matches!(err, DomainError::FailedPrecondition { .. }));
    assert!(err.to_string().contains("A2"));

    assert_eq!(ctx.tenants.get("T2").await.unwrap().status, TenantStatus::Active);
    assert_eq!(ctx.auths.get("A2").await.unwrap().status, AuthStatus::Applying);
}

#[tokio::test]
async fn block_projects_onto_applied_auths() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;
    ctx.auths
        .apply(NewAuth {
            external_id: "A1".to_owned(),
            tenant_id: "T1".to_owned(),
            auth_type: "oidc".to_owned(),
            properties: HashMap::new(),
        })
        .await
        .unwrap();
    force_auth_status(&ctx.db, "A1", AuthStatus::Applied).await;

    ctx.tenants.block("T1").await.unwrap();
    assert_eq!(ctx.tenants.get("T1").await.unwrap().status, TenantStatus::Blocking);
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Blocking);

    run_cycle(&ctx, OperatorResult::Done).await;
    assert_eq!(ctx.tenants.get("T1").await.unwrap().status, TenantStatus::Blocked);
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Blocked);
}

#[tokio::test]
async fn block_cycle_carries_error_state_auths() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;
    ctx.auths
        .apply(NewAuth {
            external_id: "A1".to_owned(),
            tenant_id: "T1".to_owned(),
            auth_type: "oidc".to_owned(),
            properties: HashMap::new(),
        })
        .await
        .unwrap();
    // An apply that failed on the operator side is non-transient and must
    // still follow the tenant through block and unblock.
    force_auth_status(&ctx.db, "A1", AuthStatus::ApplyingError).await;

    ctx.tenants.block("T1").await.unwrap();
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Blocking);

    run_cycle(&ctx, OperatorResult::Done).await;
    assert_eq!(ctx.tenants.get("T1").await.unwrap().status, TenantStatus::Blocked);
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Blocked);

    ctx.tenants.unblock("T1").await.unwrap();
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Unblocking);

    run_cycle(&ctx, OperatorResult::Done).await;
    assert_eq!(ctx.tenants.get("T1").await.unwrap().status, TenantStatus::Active);
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Applied);
}

#[tokio::test]
async fn removed_auths_are_left_alone_by_tenant_transitions() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;
    ctx.auths
        .apply(NewAuth {
            external_id: "A1".to_owned(),
            tenant_id: "T1".to_owned(),
            auth_type: "oidc".to_owned(),
            properties: HashMap::new(),
        })
        .await
        .unwrap();
    force_auth_status(&ctx.db, "A1", AuthStatus::Removed).await;

    ctx.tenants.block("T1").await.unwrap();
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Removed);
}

#[tokio::test]
async fn unblock_cycle_returns_auths_to_applied() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Blocked).await;
    ctx.db
        .transaction::<_, DomainError, _>(|tx| {
            Box::pin(async move {
                registry_db::create(
                    tx,
                    auth::ActiveModel {
                        external_id: Set("A1".to_owned()),
                        tenant_id: Set("T1".to_owned()),
                        auth_type: Set("oidc".to_owned()),
                        properties: Set(None),
                        status: Set(AuthStatus::Blocked),
                        created_at: Set(chrono::Utc::now()),
                        updated_at: Set(chrono::Utc::now()),
                    },
                )
                .await
                .map_err(DomainError::from)
            })
        })
        .await
        .unwrap();

    ctx.tenants.unblock("T1").await.unwrap();
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Unblocking);

    run_cycle(&ctx, OperatorResult::Done).await;
    assert_eq!(ctx.tenants.get("T1").await.unwrap().status, TenantStatus::Active);
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Applied);
}

#[tokio::test]
async fn terminate_runs_auths_through_removal() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;
    ctx.auths
        .apply(NewAuth {
            external_id: "A1".to_owned(),
            tenant_id: "T1".to_owned(),
            auth_type: "oidc".to_owned(),
            properties: HashMap::new(),
        })
        .await
        .unwrap();
    force_auth_status(&ctx.db, "A1", AuthStatus::Applied).await;
    force_tenant_status(&ctx.db, "T1", TenantStatus::Blocked).await;
    force_auth_status(&ctx.db, "A1", AuthStatus::Blocked).await;

    ctx.tenants.terminate("T1").await.unwrap();
    assert_eq!(
        ctx.tenants.get("T1").await.unwrap().status,
        TenantStatus::Terminating
    );
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Removing);

    run_cycle(&ctx, OperatorResult::Done).await;
    assert_eq!(
        ctx.tenants.get("T1").await.unwrap().status,
        TenantStatus::Terminated
    );
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Removed);
}

#[tokio::test]
async fn tenant_labels_merge_and_remove() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();

    ctx.tenants
        .set_labels("T1", HashMap::from([("env".to_owned(), "prod".to_owned())]))
        .await
        .unwrap();
    ctx.tenants
        .set_labels("T1", HashMap::from([("team".to_owned(), "kms".to_owned())]))
        .await
        .unwrap();

    // Unknown keys on remove are a no-op success.
    ctx.tenants
        .remove_labels("T1", vec!["env".to_owned(), "ghost".to_owned()])
        .await
        .unwrap();

    let row = ctx.tenants.get("T1").await.unwrap();
    let labels = row.labels.unwrap();
    assert!(labels.get("team").is_some());
    assert!(labels.get("env").is_none());

    let err = ctx
        .tenants
        .set_labels("T1", HashMap::from([("  ".to_owned(), "x".to_owned())]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Tenant.Labels"));
}

#[tokio::test]
async fn tenant_pages_are_disjoint_under_equal_created_at() {
    let ctx = setup().await;
    // Three rows sharing one creation instant; the id tie-breaker must keep
    // the pages disjoint and complete.
    let stamp = chrono::Utc::now();
    for id in ["P1", "P2", "P3"] {
        ctx.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    registry_db::create(
                        tx,
                        tenant::ActiveModel {
                            id: Set(id.to_owned()),
                            name: Set(format!("tenant {id}")),
                            region: Set(REGION.to_owned()),
                            owner_id: Set("O".to_owned()),
                            owner_type: Set("operator".to_owned()),
                            role: Set(TenantRole::Live),
                            status: Set(TenantStatus::Active),
                            labels: Set(None),
                            user_groups: Set(None),
                            created_at: Set(stamp),
                            updated_at: Set(stamp),
                        },
                    )
                    .await
                    .map_err(DomainError::from)
                })
            })
            .await
            .unwrap();
    }

    let filter = registry::domain::model::TenantFilter::default();
    let first = ctx
        .tenants
        .list(
            &filter,
            &registry::domain::model::PageRequest {
                limit: Some(2),
                page_token: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(first.items.len(), 2);
    let token = first.next_cursor.expect("second page expected");

    let second = ctx
        .tenants
        .list(
            &filter,
            &registry::domain::model::PageRequest {
                limit: Some(2),
                page_token: Some(token),
            },
        )
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.next_cursor.is_none());

    let mut ids: Vec<_> = first
        .items
        .iter()
        .chain(second.items.iter())
        .map(|t| t.id.clone())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids, ["P1", "P2", "P3"]);
}

#[tokio::test]
async fn garbage_page_token_is_invalid_argument() {
    let ctx = setup().await;
    let err = ctx
        .tenants
        .list(
            &registry::domain::model::TenantFilter::default(),
            &registry::domain::model::PageRequest {
                limit: None,
                page_token: Some("not-a-token!".to_owned()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidArgument { .. }));
}

// --- auths ---------------------------------------------------------------

#[tokio::test]
async fn apply_auth_is_idempotent_and_updates_properties() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;

    let mut new = NewAuth {
        external_id: "A1".to_owned(),
        tenant_id: "T1".to_owned(),
        auth_type: "oidc".to_owned(),
        properties: HashMap::from([("issuer".to_owned(), "one".to_owned())]),
    };
    ctx.auths.apply(new.clone()).await.unwrap();
    new.properties.insert("issuer".to_owned(), "two".to_owned());
    ctx.auths.apply(new).await.unwrap();

    let rows = registry_db::list::<auth::Entity, _>(
        &ctx.db.conn(),
        &ListQuery::new().with_filter(CompositeKey::new().eq("tenant_id", "T1")),
    )
    .await
    .unwrap()
    .items;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].properties.as_ref().and_then(|p| p.get("issuer")).and_then(|v| v.as_str()),
        Some("two")
    );

    // Only the first apply submitted a job.
    let job_rows = registry_db::list::<orbital::entity::job::Entity, _>(
        &ctx.db.conn(),
        &ListQuery::new().with_filter(CompositeKey::new().eq("external_id", "A1")),
    )
    .await
    .unwrap()
    .items;
    assert_eq!(job_rows.len(), 1);
}

#[tokio::test]
async fn apply_auth_requires_active_tenant() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();

    let err = ctx
        .auths
        .apply(NewAuth {
            external_id: "A1".to_owned(),
            tenant_id: "T1".to_owned(),
            auth_type: "oidc".to_owned(),
            properties: HashMap::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::FailedPrecondition { .. }));
}

#[tokio::test]
async fn remove_auth_requires_applied_status() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;
    ctx.auths
        .apply(NewAuth {
            external_id: "A1".to_owned(),
            tenant_id: "T1".to_owned(),
            auth_type: "oidc".to_owned(),
            properties: HashMap::new(),
        })
        .await
        .unwrap();

    let err = ctx.auths.remove("A1").await.unwrap_err();
    assert!(matches!(err, DomainError::FailedPrecondition { .. }));

    force_auth_status(&ctx.db, "A1", AuthStatus::Applied).await;
    ctx.auths.remove("A1").await.unwrap();
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Removing);

    run_cycle(&ctx, OperatorResult::Done).await;
    assert_eq!(ctx.auths.get("A1").await.unwrap().status, AuthStatus::Removed);
}

// --- systems -------------------------------------------------------------

#[tokio::test]
async fn link_rolls_back_atomically() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T3")).await.unwrap();
    force_tenant_status(&ctx.db, "T3", TenantStatus::Active).await;
    register_system(&ctx, "S1", "hana").await;
    register_system(&ctx, "S2", "hana").await;
    ctx.systems
        .link_to_tenant(vec![type_ref("S1", "hana")], "T3")
        .await
        .unwrap();

    // S1 is already linked: the whole call must fail and S2 stay unlinked.
    let err = ctx
        .systems
        .link_to_tenant(vec![type_ref("S1", "hana"), type_ref("S2", "hana")], "T3")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::FailedPrecondition { .. }));

    let s2 = ctx.systems.get(&type_ref("S2", "hana")).await.unwrap();
    assert!(s2.system.tenant_id.is_none());
}

#[tokio::test]
async fn l1_key_claim_pins_the_link() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;
    register_system(&ctx, "S1", "hana").await;
    ctx.systems
        .link_to_tenant(vec![type_ref("S1", "hana")], "T1")
        .await
        .unwrap();
    ctx.systems
        .update_l1_key_claim(&type_ref("S1", "hana"), REGION, "T1", true)
        .await
        .unwrap();

    let err = ctx
        .systems
        .unlink_from_tenant(vec![type_ref("S1", "hana")], "T1")
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("externalID=S1"));
    assert!(message.contains("type=hana"));
    assert!(message.contains(&format!("region={REGION}")));

    let row = ctx.systems.get(&type_ref("S1", "hana")).await.unwrap();
    assert_eq!(row.system.tenant_id.as_deref(), Some("T1"));

    // Repeating the same claim value is rejected as a no-op.
    let err = ctx
        .systems
        .update_l1_key_claim(&type_ref("S1", "hana"), REGION, "T1", true)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::FailedPrecondition { .. }));
}

#[tokio::test]
async fn unlink_shares_the_active_tenant_precondition() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;
    register_system(&ctx, "S1", "hana").await;
    ctx.systems
        .link_to_tenant(vec![type_ref("S1", "hana")], "T1")
        .await
        .unwrap();

    let err = ctx
        .systems
        .unlink_from_tenant(vec![type_ref("S1", "hana")], "ghost")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));

    force_tenant_status(&ctx.db, "T1", TenantStatus::Blocked).await;
    let err = ctx
        .systems
        .unlink_from_tenant(vec![type_ref("S1", "hana")], "T1")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::FailedPrecondition { .. }));

    let row = ctx.systems.get(&type_ref("S1", "hana")).await.unwrap();
    assert_eq!(row.system.tenant_id.as_deref(), Some("T1"));
}

#[tokio::test]
async fn typeless_lookup_resolves_unique_and_rejects_ambiguity() {
    let ctx = setup().await;
    register_system(&ctx, "S1", "hana").await;

    let untyped = SystemRef {
        external_id: "S1".to_owned(),
        system_type: None,
    };
    assert_eq!(
        ctx.systems.get(&untyped).await.unwrap().system.system_type,
        "hana"
    );

    register_system(&ctx, "S1", "s4").await;
    let err = ctx.systems.get(&untyped).await.unwrap_err();
    assert!(matches!(err, DomainError::TooManyTypes(_)));

    // Deleting something that does not exist at all is silent success.
    ctx.systems
        .delete(
            &SystemRef {
                external_id: "ghost".to_owned(),
                system_type: None,
            },
            REGION,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_system_keeps_parent_while_regions_remain() {
    let ctx = setup().await;
    ctx.systems
        .register(NewSystem {
            external_id: "S1".to_owned(),
            system_type: "hana".to_owned(),
            tenant_id: None,
            labels: HashMap::new(),
            regions: vec![
                RegionSeed {
                    region: "r1".to_owned(),
                    l2_key_id: "k1".to_owned(),
                },
                RegionSeed {
                    region: "r2".to_owned(),
                    l2_key_id: "k2".to_owned(),
                },
            ],
        })
        .await
        .unwrap();

    ctx.systems.delete(&type_ref("S1", "hana"), "r1").await.unwrap();
    let row = ctx.systems.get(&type_ref("S1", "hana")).await.unwrap();
    assert_eq!(row.regions.len(), 1);

    ctx.systems.delete(&type_ref("S1", "hana"), "r2").await.unwrap();
    let remaining = registry_db::find::<system::Entity, _>(
        &ctx.db.conn(),
        &CompositeKey::new().eq("external_id", "S1").eq("type", "hana"),
    )
    .await
    .unwrap();
    assert!(remaining.is_none(), "parent goes with the last region");
}

#[tokio::test]
async fn delete_linked_system_is_rejected() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;
    register_system(&ctx, "S1", "hana").await;
    ctx.systems
        .link_to_tenant(vec![type_ref("S1", "hana")], "T1")
        .await
        .unwrap();

    let err = ctx.systems.delete(&type_ref("S1", "hana"), REGION).await.unwrap_err();
    assert!(matches!(err, DomainError::FailedPrecondition { .. }));
}

#[tokio::test]
async fn register_system_rejects_conflicting_tenant() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;
    register_system(&ctx, "S1", "hana").await;
    ctx.systems
        .link_to_tenant(vec![type_ref("S1", "hana")], "T1")
        .await
        .unwrap();

    let err = ctx
        .systems
        .register(NewSystem {
            external_id: "S1".to_owned(),
            system_type: "hana".to_owned(),
            tenant_id: Some("OTHER".to_owned()),
            labels: HashMap::new(),
            regions: vec![RegionSeed {
                region: REGION.to_owned(),
                l2_key_id: "k".to_owned(),
            }],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidArgument { .. }));
}

// --- mapping -------------------------------------------------------------

#[tokio::test]
async fn mapping_creates_system_implicitly_and_unmaps() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;

    ctx.mappings
        .map(&type_ref("S9", "hana"), "T1")
        .await
        .unwrap();
    let mapping = ctx.mappings.get(&type_ref("S9", "hana")).await.unwrap();
    assert_eq!(mapping.tenant_id.as_deref(), Some("T1"));

    ctx.mappings
        .unmap(&type_ref("S9", "hana"), "T1")
        .await
        .unwrap();
    let mapping = ctx.mappings.get(&type_ref("S9", "hana")).await.unwrap();
    assert!(mapping.tenant_id.is_none());

    // Unmapping a system linked to someone else fails.
    let err = ctx.mappings.unmap(&type_ref("S9", "hana"), "T1").await.unwrap_err();
    assert!(matches!(err, DomainError::FailedPrecondition { .. }));
}

#[tokio::test]
async fn unmap_shares_the_active_tenant_precondition() {
    let ctx = setup().await;
    ctx.tenants.register(new_tenant("T1")).await.unwrap();
    force_tenant_status(&ctx.db, "T1", TenantStatus::Active).await;
    ctx.mappings
        .map(&type_ref("S9", "hana"), "T1")
        .await
        .unwrap();

    force_tenant_status(&ctx.db, "T1", TenantStatus::Blocked).await;
    let err = ctx
        .mappings
        .unmap(&type_ref("S9", "hana"), "T1")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::FailedPrecondition { .. }));

    let mapping = ctx.mappings.get(&type_ref("S9", "hana")).await.unwrap();
    assert_eq!(mapping.tenant_id.as_deref(), Some("T1"));
}

// --- regional system status ----------------------------------------------

#[tokio::test]
async fn update_status_flips_regional_row() {
    let ctx = setup().await;
    register_system(&ctx, "S1", "hana").await;

    ctx.systems
        .update_status(
            &type_ref("S1", "hana"),
            REGION,
            registry::infra::storage::entity::RegionalSystemStatus::Processing,
        )
        .await
        .unwrap();

    let row = registry_db::find::<regional_system::Entity, _>(
        &ctx.db.conn(),
        &CompositeKey::new()
            .eq("external_id", "S1")
            .eq("type", "hana")
            .eq("region", REGION),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(
        row.status,
        registry::infra::storage::entity::RegionalSystemStatus::Processing
    );
}
