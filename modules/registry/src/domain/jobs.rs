//! Job types and outcome handlers.
//!
//! Services submit one job per accepted lifecycle command; these handlers
//! close the loop by projecting the orchestrator's terminal outcome back onto
//! the tenant or auth row in the same transaction that finalises the job,
//! guarded by the current status so a replay changes nothing.

use async_trait::async_trait;
use chrono::Utc;
use orbital::{JobHandler, JobOutcome, OrbitalError};
use prost::Message;
use registry_db::{CompositeKey, RepoTx};
use registry_grpc::operator::v1::AuthJobData;
use registry_grpc::v1;
use sea_orm::ActiveValue::Set;

use crate::domain::snapshot;
use crate::infra::storage::entity::{auth, tenant, AuthStatus, TenantStatus};

pub const PROVISION_TENANT: &str = "PROVISION_TENANT";
pub const BLOCK_TENANT: &str = "BLOCK_TENANT";
pub const UNBLOCK_TENANT: &str = "UNBLOCK_TENANT";
pub const TERMINATE_TENANT: &str = "TERMINATE_TENANT";
pub const APPLY_AUTH: &str = "APPLY_AUTH";
pub const REMOVE_AUTH: &str = "REMOVE_AUTH";

/// Encode the tenant snapshot carried by tenant lifecycle jobs.
pub fn tenant_job_data(model: &tenant::Model) -> Vec<u8> {
    snapshot::tenant_to_proto(model).encode_to_vec()
}

/// Encode the auth snapshot (plus owning tenant region) carried by auth jobs.
pub fn auth_job_data(model: &auth::Model, tenant_region: &str) -> Vec<u8> {
    AuthJobData {
        auth: Some(snapshot::auth_to_proto(model)),
        tenant_region: tenant_region.to_owned(),
    }
    .encode_to_vec()
}

/// Status projection of one tenant job type: expected transient state and
/// the sink per outcome.
struct TenantProjection {
    from: TenantStatus,
    on_done: TenantStatus,
    on_failed: TenantStatus,
    auth: Option<AuthRule>,
}

/// Auth fan-out of one tenant job type. Success drags the in-flight state
/// plus every projectable straggler into the final status, so no
/// non-transient auth can survive a completed cycle in the wrong state;
/// failure only reverts the in-flight state.
struct AuthRule {
    in_flight: AuthStatus,
    on_done: AuthStatus,
    on_failed: AuthStatus,
}

fn tenant_projection(job_type: &str) -> Option<TenantProjection> {
    match job_type {
        PROVISION_TENANT => Some(TenantProjection {
            from: TenantStatus::Provisioning,
            on_done: TenantStatus::Active,
            on_failed: TenantStatus::ProvisioningError,
            // Freshly provisioned tenants own no auths yet.
            auth: None,
        }),
        BLOCK_TENANT => Some(TenantProjection {
            from: TenantStatus::Blocking,
            on_done: TenantStatus::Blocked,
            on_failed: TenantStatus::BlockingError,
            auth: Some(AuthRule {
                in_flight: AuthStatus::Blocking,
                on_done: AuthStatus::Blocked,
                on_failed: AuthStatus::BlockingError,
            }),
        }),
        UNBLOCK_TENANT => Some(TenantProjection {
            from: TenantStatus::Unblocking,
            on_done: TenantStatus::Active,
            on_failed: TenantStatus::UnblockingError,
            auth: Some(AuthRule {
                in_flight: AuthStatus::Unblocking,
                on_done: AuthStatus::Applied,
                on_failed: AuthStatus::UnblockingError,
            }),
        }),
        TERMINATE_TENANT => Some(TenantProjection {
            from: TenantStatus::Terminating,
            on_done: TenantStatus::Terminated,
            on_failed: TenantStatus::TerminationError,
            auth: Some(AuthRule {
                in_flight: AuthStatus::Removing,
                on_done: AuthStatus::Removed,
                on_failed: AuthStatus::RemovingError,
            }),
        }),
        _ => None,
    }
}

/// Outcome handler for the four tenant lifecycle job types.
pub struct TenantLifecycleHandler;

#[async_trait]
impl JobHandler for TenantLifecycleHandler {
    fn targets(&self, job: &orbital::entity::job::Model) -> Result<Vec<String>, OrbitalError> {
        let tenant = v1::Tenant::decode(job.data.as_slice())
            .map_err(|e| OrbitalError::BadJobData(e.to_string()))?;
        if tenant.region.is_empty() {
            return Err(OrbitalError::BadJobData("tenant snapshot without region".to_owned()));
        }
        Ok(vec![tenant.region])
    }

    async fn apply(
        &self,
        tx: &RepoTx<'_>,
        job: &orbital::entity::job::Model,
        outcome: JobOutcome,
    ) -> Result<(), OrbitalError> {
        let Some(projection) = tenant_projection(&job.job_type) else {
            return Err(OrbitalError::UnknownJobType(job.job_type.clone()));
        };
        let now = Utc::now();
        let to = match outcome {
            JobOutcome::Done => projection.on_done,
            JobOutcome::Failed => projection.on_failed,
        };

        registry_db::patch_all(
            tx,
            tenant::ActiveModel {
                status: Set(to),
                updated_at: Set(now),
                ..Default::default()
            },
            &CompositeKey::new()
                .eq("id", job.external_id.as_str())
                .eq("status", active_enum_value(&projection.from))
                .into(),
        )
        .await?;

        if let Some(rule) = projection.auth {
            let (from, auth_to) = match outcome {
                JobOutcome::Done => {
                    let mut from = vec![rule.in_flight];
                    from.extend_from_slice(auth::PROJECTABLE);
                    from.retain(|s| *s != rule.on_done);
                    (from, rule.on_done)
                }
                JobOutcome::Failed => (vec![rule.in_flight], rule.on_failed),
            };
            registry_db::patch_all(
                tx,
                auth::ActiveModel {
                    status: Set(auth_to),
                    updated_at: Set(now),
                    ..Default::default()
                },
                &CompositeKey::new()
                    .eq("tenant_id", job.external_id.as_str())
                    .field(
                        "status",
                        registry_db::FieldFilter::In(
                            from.iter().map(|s| active_enum_value(s).into()).collect(),
                        ),
                    )
                    .into(),
            )
            .await?;
        }
        Ok(())
    }
}

/// Outcome handler for auth apply/remove jobs.
pub struct AuthLifecycleHandler;

#[async_trait]
impl JobHandler for AuthLifecycleHandler {
    fn targets(&self, job: &orbital::entity::job::Model) -> Result<Vec<String>, OrbitalError> {
        let data = AuthJobData::decode(job.data.as_slice())
            .map_err(|e| OrbitalError::BadJobData(e.to_string()))?;
        if data.tenant_region.is_empty() {
            return Err(OrbitalError::BadJobData("auth snapshot without tenant region".to_owned()));
        }
        Ok(vec![data.tenant_region])
    }

    async fn apply(
        &self,
        tx: &RepoTx<'_>,
        job: &orbital::entity::job::Model,
        outcome: JobOutcome,
    ) -> Result<(), OrbitalError> {
        let (from, to) = match (job.job_type.as_str(), outcome) {
            (APPLY_AUTH, JobOutcome::Done) => (AuthStatus::Applying, AuthStatus::Applied),
            (APPLY_AUTH, JobOutcome::Failed) => (AuthStatus::Applying, AuthStatus::ApplyingError),
            (REMOVE_AUTH, JobOutcome::Done) => (AuthStatus::Removing, AuthStatus::Removed),
            (REMOVE_AUTH, JobOutcome::Failed) => (AuthStatus::Removing, AuthStatus::RemovingError),
            _ => return Err(OrbitalError::UnknownJobType(job.job_type.clone())),
        };

        registry_db::patch_all(
            tx,
            auth::ActiveModel {
                status: Set(to),
                updated_at: Set(Utc::now()),
                ..Default::default()
            },
            &CompositeKey::new()
                .eq("external_id", job.external_id.as_str())
                .eq("status", active_enum_value(&from))
                .into(),
        )
        .await?;
        Ok(())
    }
}

/// String value of a sea-orm active enum, for composite-key filters.
pub(crate) fn active_enum_value<E: sea_orm::ActiveEnum<Value = String>>(value: &E) -> String {
    value.to_value()
}
