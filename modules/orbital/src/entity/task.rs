use chrono::{DateTime, Utc};
use registry_db::Resource;
use sea_orm::entity::prelude::*;

/// One task per operator target of a job; one-to-one with a request envelope
/// on the message bus.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub job_id: String,
    /// Operator region the task is dispatched to.
    pub target: String,
    pub state: TaskState,
    pub attempt: i32,
    #[sea_orm(nullable)]
    pub last_sent_at: Option<DateTimeUtc>,
    #[sea_orm(nullable)]
    pub last_received_at: Option<DateTimeUtc>,
    #[sea_orm(nullable)]
    pub next_reconcile_after: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum TaskState {
    #[sea_orm(string_value = "CREATED")]
    Created,
    #[sea_orm(string_value = "SENT")]
    Sent,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "DONE")]
    Done,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Resource for Entity {
    fn column_for(field: &str) -> Option<Column> {
        match field {
            "id" => Some(Column::Id),
            "job_id" => Some(Column::JobId),
            "target" => Some(Column::Target),
            "state" => Some(Column::State),
            "next_reconcile_after" => Some(Column::NextReconcileAfter),
            "created_at" => Some(Column::CreatedAt),
            "updated_at" => Some(Column::UpdatedAt),
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
            "id" => Some(model.id.clone()),
            _ => None,
        }
    }
}
