//! Job submission.
//!
//! Services enqueue a job inside the same repository transaction that
//! persists their entity write; the worker pools pick it up asynchronously.

use chrono::Utc;
use registry_db::{RepoTx, Runner};
use sea_orm::Set;
use uuid::Uuid;

use crate::entity::job::{self, JobState};
use crate::error::OrbitalError;

/// Intent for one RPC-triggered action.
#[derive(Clone, Debug)]
pub struct NewJob {
    /// Action name, e.g. `PROVISION_TENANT`. Keys the outcome handler.
    pub job_type: String,
    /// Scope of the job: tenant id or auth external id.
    pub external_id: String,
    /// Protobuf-encoded entity snapshot.
    pub data: Vec<u8>,
}

/// Insert the job row in `CREATED` state using the caller's transaction, so
/// the entity write and the job submission commit or roll back together.
///
/// # Errors
/// Propagates repository failures.
pub async fn enqueue(tx: &RepoTx<'_>, new_job: NewJob) -> Result<String, OrbitalError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    registry_db::create(
        tx,
        job::ActiveModel {
            id: Set(id.clone()),
            job_type: Set(new_job.job_type),
            external_id: Set(new_job.external_id),
            data: Set(new_job.data),
            state: Set(JobState::Created),
            reconcile_count: Set(0),
            next_reconcile_after: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        },
    )
    .await?;
    Ok(id)
}

/// Look up a job by id (tests and handlers).
///
/// # Errors
/// Propagates repository failures.
pub async fn find_job<R: Runner>(
    runner: &R,
    id: &str,
) -> Result<Option<job::Model>, OrbitalError> {
    Ok(registry_db::find::<job::Entity, _>(
        runner,
        &registry_db::CompositeKey::new().eq("id", id),
    )
    .await?)
}
