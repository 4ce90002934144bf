use chrono::{DateTime, Utc};
use registry_db::Resource;
use sea_orm::entity::prelude::*;

/// Per-region projection of a system, carrying the regional key material
/// references.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "regional_systems")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub external_id: String,
    #[sea_orm(primary_key, auto_increment = false, column_name = "type")]
    pub system_type: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub region: String,
    pub l2_key_id: String,
    pub has_l1_key_claim: bool,
    pub status: RegionalSystemStatus,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum RegionalSystemStatus {
    #[sea_orm(string_value = "AVAILABLE")]
    Available,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "ERROR")]
    Error,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Resource for Entity {
    fn column_for(field: &str) -> Option<Column> {
        match field {
            "external_id" => Some(Column::ExternalId),
            "type" => Some(Column::SystemType),
            "region" => Some(Column::Region),
            "status" => Some(Column::Status),
            "has_l1_key_claim" => Some(Column::HasL1KeyClaim),
            "created_at" => Some(Column::CreatedAt),
            "updated_at" => Some(Column::UpdatedAt),
            _ => None,
        }
    }

    fn sort_fields() -> &'static [&'static str] {
        &["external_id", "region"]
    }

    fn created_at(model: &Model) -> DateTime<Utc> {
        model.created_at
    }

    fn sort_key(model: &Model, field: &str) -> Option<String> {
        match field {
            "external_id" => Some(model.external_id.clone()),
            "region" => Some(model.region.clone()),
            _ => None,
        }
    }
}
