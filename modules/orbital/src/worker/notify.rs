//! notify-event pool: publish terminal-transition events past the watermark.
//!
//! Emission is tracing + metrics; a failure there cannot stall the pipeline,
//! and an advance lost to a crash only re-emits events (at-least-once).

use chrono::Utc;
use registry_db::{CompositeKey, FieldFilter};
use sea_orm::ActiveValue::Set;
use tracing::info;

use crate::engine::Orbital;
use crate::entity::{job_cursor, job_event};
use crate::error::OrbitalError;

pub(crate) async fn run(orbital: &Orbital) -> Result<(), OrbitalError> {
    let limit = orbital.cfg.task_limit_num;
    orbital
        .db
        .transaction::<_, OrbitalError, _>(|tx: &registry_db::RepoTx<'_>| {
            Box::pin(async move {
                let now = Utc::now();
                let watermark = match registry_db::find::<job_cursor::Entity, _>(
                    tx,
                    &CompositeKey::new().eq("id", job_cursor::SINGLETON_ID),
                )
                .await?
                {
                    Some(cursor) => cursor.last_event_id,
                    None => {
                        registry_db::create(
                            tx,
                            job_cursor::ActiveModel {
                                id: Set(job_cursor::SINGLETON_ID),
                                last_event_id: Set(0),
                                created_at: Set(now),
                                updated_at: Set(now),
                            },
                        )
                        .await?;
                        0
                    }
                };

                let events = registry_db::list_for_update_skip_locked::<job_event::Entity, _>(
                    tx,
                    &CompositeKey::new()
                        .field("id", FieldFilter::Gt(watermark.into()))
                        .into(),
                    "id",
                    limit,
                )
                .await?;
                let Some(last) = events.last() else {
                    return Ok(());
                };
                let last_id = last.id;

                for event in &events {
                    info!(
                        job_id = %event.job_id,
                        job_type = %event.job_type,
                        external_id = %event.external_id,
                        outcome = %event.outcome,
                        "job lifecycle event"
                    );
                    orbital.metrics.events_notified.inc();
                }

                registry_db::patch(
                    tx,
                    job_cursor::ActiveModel {
                        id: Set(job_cursor::SINGLETON_ID),
                        last_event_id: Set(last_id),
                        updated_at: Set(now),
                        ..Default::default()
                    },
                )
                .await?;
                Ok(())
            })
        })
        .await
        .map_err(OrbitalError::from)
}
