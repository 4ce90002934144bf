//! confirm-job pool: garbage-collect terminal jobs past the retention window.

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use registry_db::{CompositeKey, FieldFilter};

use super::job_state_filter;
use crate::engine::Orbital;
use crate::entity::job::{self, JobState};
use crate::entity::{job_event, task};
use crate::error::OrbitalError;

pub(crate) async fn run(orbital: &Orbital) -> Result<(), OrbitalError> {
    let Ok(retention) = chrono::Duration::from_std(orbital.cfg.confirm_job_after) else {
        return Ok(());
    };
    let threshold = Utc::now() - retention;
    let limit = orbital.cfg.task_limit_num;

    orbital
        .db
        .transaction::<_, OrbitalError, _>(|tx: &registry_db::RepoTx<'_>| -> Pin<
            Box<dyn Future<Output = Result<(), OrbitalError>> + Send + '_>,
        > {
            Box::pin(async move {
                let expired = registry_db::list_for_update_skip_locked::<job::Entity, _>(
                    tx,
                    &job_state_filter(&[JobState::Done, JobState::Failed])
                        .field("updated_at", FieldFilter::LtEq(threshold.into()))
                        .into(),
                    "updated_at",
                    limit,
                )
                .await?;

                for job_row in expired {
                    registry_db::delete::<task::Entity, _>(
                        tx,
                        &CompositeKey::new().eq("job_id", job_row.id.as_str()),
                    )
                    .await?;
                    registry_db::delete::<job_event::Entity, _>(
                        tx,
                        &CompositeKey::new().eq("job_id", job_row.id.as_str()),
                    )
                    .await?;
                    registry_db::delete::<job::Entity, _>(
                        tx,
                        &CompositeKey::new().eq("id", job_row.id.as_str()),
                    )
                    .await?;
                    orbital.metrics.jobs_confirmed.inc();
                }
                Ok(())
            })
        })
        .await
        .map_err(OrbitalError::from)
}
