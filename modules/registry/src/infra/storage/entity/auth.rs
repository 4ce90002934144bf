use chrono::{DateTime, Utc};
use registry_db::Resource;
use sea_orm::entity::prelude::*;

/// Authentication binding owned by a tenant. Its lifecycle is subordinate to
/// the tenant's: transient tenant transitions project onto it synchronously.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "auths")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub external_id: String,
    pub tenant_id: String,
    #[sea_orm(column_name = "type")]
    pub auth_type: String,
    #[sea_orm(nullable)]
    pub properties: Option<Json>,
    pub status: AuthStatus,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum AuthStatus {
    #[sea_orm(string_value = "APPLYING")]
    Applying,
    #[sea_orm(string_value = "APPLIED")]
    Applied,
    #[sea_orm(string_value = "APPLYING_ERROR")]
    ApplyingError,
    #[sea_orm(string_value = "REMOVING")]
    Removing,
    #[sea_orm(string_value = "REMOVED")]
    Removed,
    #[sea_orm(string_value = "REMOVING_ERROR")]
    RemovingError,
    #[sea_orm(string_value = "BLOCKING")]
    Blocking,
    #[sea_orm(string_value = "BLOCKED")]
    Blocked,
    #[sea_orm(string_value = "BLOCKING_ERROR")]
    BlockingError,
    #[sea_orm(string_value = "UNBLOCKING")]
    Unblocking,
    #[sea_orm(string_value = "UNBLOCKING_ERROR")]
    UnblockingError,
}

impl AuthStatus {
    /// States an in-flight job owns; tenant transitions must wait for them.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthStatus::Applying
                | AuthStatus::Removing
                | AuthStatus::Blocking
                | AuthStatus::Unblocking
        )
    }
}

/// Every non-transient status a tenant transition projects onto. `REMOVED`
/// is the one exception: a removed binding has nothing left to block,
/// unblock or remove.
pub const PROJECTABLE: &[AuthStatus] = &[
    AuthStatus::Applied,
    AuthStatus::ApplyingError,
    AuthStatus::RemovingError,
    AuthStatus::Blocked,
    AuthStatus::BlockingError,
    AuthStatus::UnblockingError,
];

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Resource for Entity {
    fn column_for(field: &str) -> Option<Column> {
        match field {
            "external_id" => Some(Column::ExternalId),
            "tenant_id" => Some(Column::TenantId),
            "type" => Some(Column::AuthType),
            "status" => Some(Column::Status),
            "created_at" => Some(Column::CreatedAt),
            "updated_at" => Some(Column::UpdatedAt),
            _ => None,
        }
    }

    fn sort_fields() -> &'static [&'static str] {
        &["external_id"]
    }

    fn created_at(model: &Model) -> DateTime<Utc> {
        model.created_at
    }

    fn sort_key(model: &Model, field: &str) -> Option<String> {
        match field {
            "external_id" => Some(model.external_id.clone()),
            _ => None,
        }
    }
}
