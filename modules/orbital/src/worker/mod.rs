//! Worker pool bodies.

pub(crate) mod confirm;
pub(crate) mod create_task;
pub(crate) mod notify;
pub(crate) mod reconcile;

use chrono::Utc;
use registry_db::{CompositeKey, ListQuery, RepoTx};
use sea_orm::ActiveValue::Set;
use sea_orm::ActiveEnum;
use tracing::info;

use crate::engine::Orbital;
use crate::entity::job::{self, JobState};
use crate::entity::{job_event, task};
use crate::error::OrbitalError;
use crate::handler::JobOutcome;

/// Finalise `job` once every task is terminal: project the outcome onto the
/// originating entity, advance the job row and append the event, all in the
/// caller's transaction. A job already terminal is left untouched, which makes
/// duplicate reconciliation a no-op.
pub(crate) async fn maybe_finalize_job(
    orbital: &Orbital,
    tx: &RepoTx<'_>,
    job_id: &str,
) -> Result<(), OrbitalError> {
    let Some(job_row) =
        registry_db::find::<job::Entity, _>(tx, &CompositeKey::new().eq("id", job_id)).await?
    else {
        return Ok(());
    };
    if job_row.state.is_terminal() {
        return Ok(());
    }

    let tasks = registry_db::list::<task::Entity, _>(
        tx,
        &ListQuery::new()
            .with_filter(CompositeKey::new().eq("job_id", job_id))
            .with_limit(registry_db::MAX_LIMIT),
    )
    .await?
    .items;
    if tasks.is_empty() || !tasks.iter().all(|t| t.state.is_terminal()) {
        return Ok(());
    }

    let outcome = if tasks.iter().all(|t| t.state == task::TaskState::Done) {
        JobOutcome::Done
    } else {
        JobOutcome::Failed
    };
    finalize_job(orbital, tx, &job_row, outcome).await
}

/// Write the terminal state of `job_row` and run the outcome projection.
pub(crate) async fn finalize_job(
    orbital: &Orbital,
    tx: &RepoTx<'_>,
    job_row: &job::Model,
    outcome: JobOutcome,
) -> Result<(), OrbitalError> {
    if let Some(handler) = orbital.handler(&job_row.job_type) {
        handler.apply(tx, job_row, outcome).await?;
    }

    let now = Utc::now();
    registry_db::patch(
        tx,
        job::ActiveModel {
            id: Set(job_row.id.clone()),
            state: Set(match outcome {
                JobOutcome::Done => JobState::Done,
                JobOutcome::Failed => JobState::Failed,
            }),
            updated_at: Set(now),
            ..Default::default()
        },
    )
    .await?;

    registry_db::create(
        tx,
        job_event::ActiveModel {
            job_id: Set(job_row.id.clone()),
            job_type: Set(job_row.job_type.clone()),
            external_id: Set(job_row.external_id.clone()),
            outcome: Set(outcome.as_str().to_owned()),
            created_at: Set(now),
            ..Default::default()
        },
    )
    .await?;

    orbital
        .metrics
        .jobs_finalized
        .with_label_values(&[job_row.job_type.as_str(), outcome.as_str()])
        .inc();
    info!(
        job_id = %job_row.id,
        job_type = %job_row.job_type,
        outcome = outcome.as_str(),
        "job finalized"
    );
    Ok(())
}

/// `state IN (…)` filter helper for job rows.
pub(crate) fn job_state_filter(states: &[JobState]) -> CompositeKey {
    CompositeKey::new().field(
        "state",
        registry_db::FieldFilter::In(states.iter().map(|s| s.to_value().into()).collect()),
    )
}

/// `state IN (…)` filter helper for task rows.
pub(crate) fn task_state_filter(states: &[task::TaskState]) -> CompositeKey {
    CompositeKey::new().field(
        "state",
        registry_db::FieldFilter::In(states.iter().map(|s| s.to_value().into()).collect()),
    )
}
