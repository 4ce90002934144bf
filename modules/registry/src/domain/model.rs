//! Domain input and filter types, plus JSON column helpers.
//!
//! The api layer converts wire messages into these; services never see
//! protobuf types.

use std::collections::HashMap;

use sea_orm::JsonValue;

use crate::infra::storage::entity::{AuthStatus, TenantRole, TenantStatus};

#[derive(Clone, Debug)]
pub struct NewTenant {
    pub id: String,
    pub name: String,
    pub region: String,
    pub owner_id: String,
    pub owner_type: String,
    /// `None` when the caller left the role unspecified.
    pub role: Option<TenantRole>,
    pub labels: HashMap<String, String>,
    pub user_groups: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct TenantFilter {
    pub ids: Vec<String>,
    pub region: Option<String>,
    pub status: Option<TenantStatus>,
    pub labels: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct RegionSeed {
    pub region: String,
    pub l2_key_id: String,
}

#[derive(Clone, Debug)]
pub struct NewSystem {
    pub external_id: String,
    pub system_type: String,
    pub tenant_id: Option<String>,
    pub labels: HashMap<String, String>,
    pub regions: Vec<RegionSeed>,
}

/// Reference to a system on mutating calls; `system_type: None` engages the
/// backward-compatible unique-type resolution.
#[derive(Clone, Debug)]
pub struct SystemRef {
    pub external_id: String,
    pub system_type: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct SystemFilter {
    pub external_ids: Vec<String>,
    pub tenant_id: Option<String>,
    pub region: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewAuth {
    pub external_id: String,
    pub tenant_id: String,
    pub auth_type: String,
    pub properties: HashMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub struct AuthFilter {
    pub tenant_id: Option<String>,
    pub status: Option<AuthStatus>,
}

/// Page request shared by every list operation.
#[derive(Clone, Debug, Default)]
pub struct PageRequest {
    pub limit: Option<u64>,
    pub page_token: Option<String>,
}

// --- JSON column helpers -------------------------------------------------

pub(crate) fn labels_to_json(labels: &HashMap<String, String>) -> Option<JsonValue> {
    if labels.is_empty() {
        None
    } else {
        Some(JsonValue::Object(
            labels
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                .collect(),
        ))
    }
}

pub(crate) fn labels_from_json(json: Option<&JsonValue>) -> HashMap<String, String> {
    let Some(JsonValue::Object(map)) = json else {
        return HashMap::new();
    };
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_owned())))
        .collect()
}

pub(crate) fn groups_to_json(groups: &[String]) -> Option<JsonValue> {
    if groups.is_empty() {
        None
    } else {
        Some(JsonValue::Array(
            groups.iter().cloned().map(JsonValue::String).collect(),
        ))
    }
}

pub(crate) fn groups_from_json(json: Option<&JsonValue>) -> Vec<String> {
    let Some(JsonValue::Array(items)) = json else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| v.as_str().map(ToOwned::to_owned))
        .collect()
}
