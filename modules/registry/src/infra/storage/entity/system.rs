use chrono::{DateTime, Utc};
use registry_db::Resource;
use sea_orm::entity::prelude::*;

/// A managed entity identified by `(external_id, type)`, kept alive while at
/// least one regional projection references it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "systems")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub external_id: String,
    #[sea_orm(primary_key, auto_increment = false, column_name = "type")]
    pub system_type: String,
    #[sea_orm(nullable)]
    pub tenant_id: Option<String>,
    #[sea_orm(nullable)]
    pub labels: Option<Json>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Resource for Entity {
    fn column_for(field: &str) -> Option<Column> {
        match field {
            "external_id" => Some(Column::ExternalId),
            "type" => Some(Column::SystemType),
            "tenant_id" => Some(Column::TenantId),
            "labels" => Some(Column::Labels),
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
