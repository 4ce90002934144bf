use chrono::{DateTime, Utc};
use registry_db::Resource;
use sea_orm::entity::prelude::*;

/// One job per RPC-triggered action. `data` is the protobuf-encoded entity
/// snapshot taken when the action was accepted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub job_type: String,
    /// Scope of the job: tenant id or auth external id.
    pub external_id: String,
    #[sea_orm(column_type = "VarBinary(StringLen::None)")]
    pub data: Vec<u8>,
    pub state: JobState,
    pub reconcile_count: i32,
    #[sea_orm(nullable)]
    pub next_reconcile_after: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum JobState {
    #[sea_orm(string_value = "CREATED")]
    Created,
    #[sea_orm(string_value = "TASKS_CREATED")]
    TasksCreated,
    #[sea_orm(string_value = "DONE")]
    Done,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl JobState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Resource for Entity {
    fn column_for(field: &str) -> Option<Column> {
        match field {
            "id" => Some(Column::Id),
            "job_type" => Some(Column::JobType),
            "external_id" => Some(Column::ExternalId),
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
