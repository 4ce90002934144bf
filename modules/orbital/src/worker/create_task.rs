//! create-task pool: fan a `CREATED` job out into one task per target region.

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use registry_db::CompositeKey;
use sea_orm::ActiveValue::Set;
use tracing::warn;
use uuid::Uuid;

use super::finalize_job;
use crate::engine::Orbital;
use crate::entity::job::{self, JobState};
use crate::entity::task::{self, TaskState};
use crate::error::OrbitalError;
use crate::handler::JobOutcome;

pub(crate) async fn run(orbital: &Orbital) -> Result<(), OrbitalError> {
    let limit = orbital.cfg.task_limit_num;
    orbital
        .db
        .transaction::<_, OrbitalError, _>(|tx: &registry_db::RepoTx<'_>| {
            Box::pin(async move {
                let jobs = registry_db::list_for_update_skip_locked::<job::Entity, _>(
                    tx,
                    &CompositeKey::new()
                        .eq("state", sea_orm::ActiveEnum::to_value(&JobState::Created))
                        .into(),
                    "created_at",
                    limit,
                )
                .await?;

                for job_row in jobs {
                    let targets = match orbital.handler(&job_row.job_type) {
                        Some(handler) => match handler.targets(&job_row) {
                            Ok(targets) if !targets.is_empty() => targets,
                            Ok(_) => {
                                warn!(job_id = %job_row.id, "job has no target regions");
                                finalize_job(orbital, tx, &job_row, JobOutcome::Failed).await?;
                                continue;
                            }
                            Err(e) => {
                                warn!(job_id = %job_row.id, error = %e, "job snapshot rejected");
                                finalize_job(orbital, tx, &job_row, JobOutcome::Failed).await?;
                                continue;
                            }
                        },
                        None => {
                            warn!(job_id = %job_row.id, job_type = %job_row.job_type, "no handler for job type");
                            finalize_job(orbital, tx, &job_row, JobOutcome::Failed).await?;
                            continue;
                        }
                    };

                    let now = Utc::now();
                    for region in targets {
                        registry_db::create(
                            tx,
                            task::ActiveModel {
                                id: Set(Uuid::new_v4().to_string()),
                                job_id: Set(job_row.id.clone()),
                                target: Set(region),
                                state: Set(TaskState::Created),
                                attempt: Set(0),
                                last_sent_at: Set(None),
                                last_received_at: Set(None),
                                next_reconcile_after: Set(Some(now)),
                                created_at: Set(now),
                                updated_at: Set(now),
                            },
                        )
                        .await?;
                    }

                    registry_db::patch(
                        tx,
                        job::ActiveModel {
                            id: Set(job_row.id.clone()),
                            state: Set(JobState::TasksCreated),
                            updated_at: Set(now),
                            ..Default::default()
                        },
                    )
                    .await?;
                }
                Ok(())
            })
        })
        .await
        .map_err(OrbitalError::from)
}
