use chrono::{DateTime, Utc};
use registry_db::Resource;
use sea_orm::entity::prelude::*;

/// Single-row watermark: the last job event the notify-event pool published.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "job_cursor")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub last_event_id: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

/// The watermark row's fixed primary key.
pub const SINGLETON_ID: i32 = 1;

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Resource for Entity {
    fn column_for(field: &str) -> Option<Column> {
        match field {
            "id" => Some(Column::Id),
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
