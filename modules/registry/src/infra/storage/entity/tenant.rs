use chrono::{DateTime, Utc};
use registry_db::Resource;
use sea_orm::entity::prelude::*;

/// Top-level multi-user scope. Never hard-deleted in normal operation; the
/// terminal state is `TERMINATED`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    /// Externally supplied identifier.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub region: String,
    pub owner_id: String,
    pub owner_type: String,
    pub role: TenantRole,
    pub status: TenantStatus,
    #[sea_orm(nullable)]
    pub labels: Option<Json>,
    /// Ordered list, stored as a JSON array.
    #[sea_orm(nullable)]
    pub user_groups: Option<Json>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum TenantRole {
    #[sea_orm(string_value = "LIVE")]
    Live,
    #[sea_orm(string_value = "TEST")]
    Test,
}

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum TenantStatus {
    #[sea_orm(string_value = "PROVISIONING")]
    Provisioning,
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "BLOCKING")]
    Blocking,
    #[sea_orm(string_value = "BLOCKED")]
    Blocked,
    #[sea_orm(string_value = "UNBLOCKING")]
    Unblocking,
    #[sea_orm(string_value = "TERMINATING")]
    Terminating,
    #[sea_orm(string_value = "TERMINATED")]
    Terminated,
    #[sea_orm(string_value = "PROVISIONING_ERROR")]
    ProvisioningError,
    #[sea_orm(string_value = "BLOCKING_ERROR")]
    BlockingError,
    #[sea_orm(string_value = "UNBLOCKING_ERROR")]
    UnblockingError,
    #[sea_orm(string_value = "TERMINATION_ERROR")]
    TerminationError,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Resource for Entity {
    fn column_for(field: &str) -> Option<Column> {
        match field {
            "id" => Some(Column::Id),
            "name" => Some(Column::Name),
            "region" => Some(Column::Region),
            "owner_id" => Some(Column::OwnerId),
            "owner_type" => Some(Column::OwnerType),
            "status" => Some(Column::Status),
            "labels" => Some(Column::Labels),
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
