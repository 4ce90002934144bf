use chrono::{DateTime, Utc};
use registry_db::Resource;
use sea_orm::entity::prelude::*;

/// Append-only record of a job reaching a terminal state, consumed by the
/// notify-event pool.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "job_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub job_id: String,
    pub job_type: String,
    pub external_id: String,
    /// "DONE" or "FAILED".
    pub outcome: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Resource for Entity {
    fn column_for(field: &str) -> Option<Column> {
        match field {
            "id" => Some(Column::Id),
            "job_id" => Some(Column::JobId),
            "created_at" => Some(Column::CreatedAt),
            _ => None,
        }
    }

    fn sort_fields() -> &'static [&'static str] {
        &["id"]
    }

    fn created_at(model: &Model) -> DateTime<Utc> {
        model.created_at
    }

    fn sort_key(model: &Model, field: &str) -> Option<String> {
        match field {
            "id" => Some(model.id.to_string()),
            _ => None,
        }
    }
}
