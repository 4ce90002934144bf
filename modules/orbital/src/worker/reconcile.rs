//! reconcile pool: drain operator responses, dispatch or re-dispatch due
//! tasks with exponential backoff, and project terminal outcomes.

use chrono::Utc;
use registry_db::{CompositeKey, FieldFilter};
use registry_grpc::operator::v1::{OperatorRequest, OperatorResponse, OperatorResult};
use sea_orm::ActiveValue::Set;
use tracing::warn;

use super::{maybe_finalize_job, task_state_filter};
use crate::backoff::backoff;
use crate::engine::Orbital;
use crate::entity::job;
use crate::entity::task::{self, TaskState};
use crate::error::OrbitalError;

pub(crate) async fn run(orbital: &Orbital) -> Result<(), OrbitalError> {
    drain_responses(orbital).await?;
    dispatch_due_tasks(orbital).await
}

/// Pull pending operator responses and apply each in its own transaction.
async fn drain_responses(orbital: &Orbital) -> Result<(), OrbitalError> {
    for (region, client) in &orbital.clients {
        for _ in 0..orbital.cfg.task_limit_num {
            let response = match client.try_receive().await {
                Ok(Some(response)) => response,
                Ok(None) => break,
                Err(e) => {
                    warn!(region = %region, error = %e, "operator receive failed");
                    break;
                }
            };
            apply_response(orbital, response).await?;
        }
    }
    Ok(())
}

async fn apply_response(orbital: &Orbital, response: OperatorResponse) -> Result<(), OrbitalError> {
    orbital
        .db
        .transaction::<_, OrbitalError, _>(|tx: &registry_db::RepoTx<'_>| {
            Box::pin(async move {
                let Some(task_row) = registry_db::find::<task::Entity, _>(
                    tx,
                    &CompositeKey::new().eq("id", response.task_id.as_str()),
                )
                .await?
                else {
                    // Response for a task already confirmed away; drop it.
                    return Ok(());
                };
                if task_row.state.is_terminal() {
                    return Ok(());
                }

                let now = Utc::now();
                let next_state = match response.result() {
                    OperatorResult::Done => TaskState::Done,
                    OperatorResult::Failed => TaskState::Failed,
                    OperatorResult::Processing | OperatorResult::Unspecified => {
                        TaskState::Processing
                    }
                };

                let retry_after = backoff(
                    orbital.cfg.backoff_base_interval,
                    orbital.cfg.backoff_max_interval,
                    u32::try_from(task_row.attempt).unwrap_or(u32::MAX),
                );
                registry_db::patch(
                    tx,
                    task::ActiveModel {
                        id: Set(task_row.id.clone()),
                        state: Set(next_state.clone()),
                        last_received_at: Set(Some(now)),
                        next_reconcile_after: Set(if next_state.is_terminal() {
                            None
                        } else {
                            Some(now + chrono_duration(retry_after))
                        }),
                        updated_at: Set(now),
                        ..Default::default()
                    },
                )
                .await?;

                if next_state == TaskState::Failed {
                    orbital.metrics.tasks_failed.inc();
                }
                if next_state.is_terminal() {
                    maybe_finalize_job(orbital, tx, &task_row.job_id).await?;
                }
                Ok(())
            })
        })
        .await
        .map_err(OrbitalError::from)
}

/// Pick up due tasks (`SKIP LOCKED`) and send or resend their request.
async fn dispatch_due_tasks(orbital: &Orbital) -> Result<(), OrbitalError> {
    let limit = orbital.cfg.task_limit_num;
    orbital
        .db
        .transaction::<_, OrbitalError, _>(|tx: &registry_db::RepoTx<'_>| {
            Box::pin(async move {
                let now = Utc::now();
                let due = task_state_filter(&[
                    TaskState::Created,
                    TaskState::Sent,
                    TaskState::Processing,
                ])
                .field("next_reconcile_after", FieldFilter::LtEq(now.into()));
                let tasks = registry_db::list_for_update_skip_locked::<task::Entity, _>(
                    tx,
                    &due.into(),
                    "next_reconcile_after",
                    limit,
                )
                .await?;

                for task_row in tasks {
                    let attempt = u32::try_from(task_row.attempt).unwrap_or(u32::MAX);
                    if attempt > orbital.cfg.max_reconcile_count {
                        fail_task(orbital, tx, &task_row).await?;
                        continue;
                    }
                    let Some(client) = orbital.clients.get(&task_row.target) else {
                        warn!(task_id = %task_row.id, region = %task_row.target, "no operator target for region");
                        fail_task(orbital, tx, &task_row).await?;
                        continue;
                    };
                    let Some(job_row) = registry_db::find::<job::Entity, _>(
                        tx,
                        &CompositeKey::new().eq("id", task_row.job_id.as_str()),
                    )
                    .await?
                    else {
                        fail_task(orbital, tx, &task_row).await?;
                        continue;
                    };

                    let request = OperatorRequest {
                        task_id: task_row.id.clone(),
                        job_id: job_row.id.clone(),
                        job_type: job_row.job_type.clone(),
                        region: task_row.target.clone(),
                        attempt,
                        payload: job_row.data.clone(),
                    };
                    let sent = match client.send(request).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(task_id = %task_row.id, region = %task_row.target, error = %e, "dispatch failed");
                            false
                        }
                    };

                    // Failed dispatch still consumes an attempt; the backoff
                    // schedule is keyed to the attempt being retried.
                    let retry_after =
                        backoff(orbital.cfg.backoff_base_interval, orbital.cfg.backoff_max_interval, attempt);
                    let now = Utc::now();
                    registry_db::patch(
                        tx,
                        task::ActiveModel {
                            id: Set(task_row.id.clone()),
                            state: Set(if sent { TaskState::Sent } else { task_row.state.clone() }),
                            attempt: Set(task_row.attempt.saturating_add(1)),
                            last_sent_at: Set(if sent { Some(now) } else { task_row.last_sent_at }),
                            next_reconcile_after: Set(Some(now + chrono_duration(retry_after))),
                            updated_at: Set(now),
                            ..Default::default()
                        },
                    )
                    .await?;

                    // The job mirrors its tasks' reconcile activity.
                    registry_db::patch(
                        tx,
                        job::ActiveModel {
                            id: Set(job_row.id.clone()),
                            reconcile_count: Set(job_row.reconcile_count.saturating_add(1)),
                            next_reconcile_after: Set(Some(now + chrono_duration(retry_after))),
                            updated_at: Set(now),
                            ..Default::default()
                        },
                    )
                    .await?;

                    if sent {
                        orbital.metrics.tasks_dispatched.inc();
                        if attempt > 0 {
                            orbital.metrics.task_retries.inc();
                        }
                    }
                }
                Ok(())
            })
        })
        .await
        .map_err(OrbitalError::from)
}

async fn fail_task(
    orbital: &Orbital,
    tx: &registry_db::RepoTx<'_>,
    task_row: &task::Model,
) -> Result<(), OrbitalError> {
    let now = Utc::now();
    registry_db::patch(
        tx,
        task::ActiveModel {
            id: Set(task_row.id.clone()),
            state: Set(TaskState::Failed),
            next_reconcile_after: Set(None),
            updated_at: Set(now),
            ..Default::default()
        },
    )
    .await?;
    orbital.metrics.tasks_failed.inc();
    maybe_finalize_job(orbital, tx, &task_row.job_id).await
}

fn chrono_duration(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365))
}
