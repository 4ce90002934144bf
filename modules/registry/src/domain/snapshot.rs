//! Entity ⇄ wire-snapshot conversions shared by job submission and the api
//! layer.

use registry_grpc::v1;

use crate::domain::model::{groups_from_json, labels_from_json};
use crate::infra::storage::entity::{
    auth, regional_system, system, tenant, AuthStatus, RegionalSystemStatus, TenantRole,
    TenantStatus,
};

pub fn tenant_to_proto(model: &tenant::Model) -> v1::Tenant {
    v1::Tenant {
        id: model.id.clone(),
        name: model.name.clone(),
        region: model.region.clone(),
        owner_id: model.owner_id.clone(),
        owner_type: model.owner_type.clone(),
        role: role_to_proto(&model.role).into(),
        status: tenant_status_to_proto(&model.status).into(),
        labels: labels_from_json(model.labels.as_ref()),
        user_groups: groups_from_json(model.user_groups.as_ref()),
        created_at: model.created_at.timestamp_millis(),
    }
}

pub fn auth_to_proto(model: &auth::Model) -> v1::Auth {
    v1::Auth {
        external_id: model.external_id.clone(),
        tenant_id: model.tenant_id.clone(),
        r#type: model.auth_type.clone(),
        properties: labels_from_json(model.properties.as_ref()),
        status: auth_status_to_proto(&model.status).into(),
        created_at: model.created_at.timestamp_millis(),
    }
}

pub fn system_to_proto(model: &system::Model, regional: &[regional_system::Model]) -> v1::System {
    v1::System {
        external_id: model.external_id.clone(),
        r#type: model.system_type.clone(),
        tenant_id: model.tenant_id.clone().unwrap_or_default(),
        labels: labels_from_json(model.labels.as_ref()),
        created_at: model.created_at.timestamp_millis(),
        regional_systems: regional.iter().map(regional_to_proto).collect(),
    }
}

pub fn regional_to_proto(model: &regional_system::Model) -> v1::RegionalSystem {
    v1::RegionalSystem {
        external_id: model.external_id.clone(),
        r#type: model.system_type.clone(),
        region: model.region.clone(),
        l2_key_id: model.l2_key_id.clone(),
        has_l1_key_claim: model.has_l1_key_claim,
        status: regional_status_to_proto(&model.status).into(),
    }
}

pub fn role_to_proto(role: &TenantRole) -> v1::TenantRole {
    match role {
        TenantRole::Live => v1::TenantRole::Live,
        TenantRole::Test => v1::TenantRole::Test,
    }
}

pub fn role_from_proto(role: v1::TenantRole) -> Option<TenantRole> {
    match role {
        v1::TenantRole::Live => Some(TenantRole::Live),
        v1::TenantRole::Test => Some(TenantRole::Test),
        v1::TenantRole::Unspecified => None,
    }
}

pub fn tenant_status_to_proto(status: &TenantStatus) -> v1::TenantStatus {
    match status {
        TenantStatus::Provisioning => v1::TenantStatus::Provisioning,
        TenantStatus::Active => v1::TenantStatus::Active,
        TenantStatus::Blocking => v1::TenantStatus::Blocking,
        TenantStatus::Blocked => v1::TenantStatus::Blocked,
        TenantStatus::Unblocking => v1::TenantStatus::Unblocking,
        TenantStatus::Terminating => v1::TenantStatus::Terminating,
        TenantStatus::Terminated => v1::TenantStatus::Terminated,
        TenantStatus::ProvisioningError => v1::TenantStatus::ProvisioningError,
        TenantStatus::BlockingError => v1::TenantStatus::BlockingError,
        TenantStatus::UnblockingError => v1::TenantStatus::UnblockingError,
        TenantStatus::TerminationError => v1::TenantStatus::TerminationError,
    }
}

pub fn tenant_status_from_proto(status: v1::TenantStatus) -> Option<TenantStatus> {
    match status {
        v1::TenantStatus::Unspecified => None,
        v1::TenantStatus::Provisioning => Some(TenantStatus::Provisioning),
        v1::TenantStatus::Active => Some(TenantStatus::Active),
        v1::TenantStatus::Blocking => Some(TenantStatus::Blocking),
        v1::TenantStatus::Blocked => Some(TenantStatus::Blocked),
        v1::TenantStatus::Unblocking => Some(TenantStatus::Unblocking),
        v1::TenantStatus::Terminating => Some(TenantStatus::Terminating),
        v1::TenantStatus::Terminated => Some(TenantStatus::Terminated),
        v1::TenantStatus::ProvisioningError => Some(TenantStatus::ProvisioningError),
        v1::TenantStatus::BlockingError => Some(TenantStatus::BlockingError),
        v1::TenantStatus::UnblockingError => Some(TenantStatus::UnblockingError),
        v1::TenantStatus::TerminationError => Some(TenantStatus::TerminationError),
    }
}

pub fn auth_status_to_proto(status: &AuthStatus) -> v1::AuthStatus {
    match status {
        AuthStatus::Applying => v1::AuthStatus::Applying,
        AuthStatus::Applied => v1::AuthStatus::Applied,
        AuthStatus::ApplyingError => v1::AuthStatus::ApplyingError,
        AuthStatus::Removing => v1::AuthStatus::Removing,
        AuthStatus::Removed => v1::AuthStatus::Removed,
        AuthStatus::RemovingError => v1::AuthStatus::RemovingError,
        AuthStatus::Blocking => v1::AuthStatus::Blocking,
        AuthStatus::Blocked => v1::AuthStatus::Blocked,
        AuthStatus::BlockingError => v1::AuthStatus::BlockingError,
        AuthStatus::Unblocking => v1::AuthStatus::Unblocking,
        AuthStatus::UnblockingError => v1::AuthStatus::UnblockingError,
    }
}

pub fn auth_status_from_proto(status: v1::AuthStatus) -> Option<AuthStatus> {
    match status {
        v1::AuthStatus::Unspecified => None,
        v1::AuthStatus::Applying => Some(AuthStatus::Applying),
        v1::AuthStatus::Applied => Some(AuthStatus::Applied),
        v1::AuthStatus::ApplyingError => Some(AuthStatus::ApplyingError),
        v1::AuthStatus::Removing => Some(AuthStatus::Removing),
        v1::AuthStatus::Removed => Some(AuthStatus::Removed),
        v1::AuthStatus::RemovingError => Some(AuthStatus::RemovingError),
        v1::AuthStatus::Blocking => Some(AuthStatus::Blocking),
        v1::AuthStatus::Blocked => Some(AuthStatus::Blocked),
        v1::AuthStatus::BlockingError => Some(AuthStatus::BlockingError),
        v1::AuthStatus::Unblocking => Some(AuthStatus::Unblocking),
        v1::AuthStatus::UnblockingError => Some(AuthStatus::UnblockingError),
    }
}

pub fn regional_status_to_proto(status: &RegionalSystemStatus) -> v1::RegionalSystemStatus {
    match status {
        RegionalSystemStatus::Available => v1::RegionalSystemStatus::Available,
        RegionalSystemStatus::Processing => v1::RegionalSystemStatus::Processing,
        RegionalSystemStatus::Error => v1::RegionalSystemStatus::Error,
    }
}

pub fn regional_status_from_proto(
    status: v1::RegionalSystemStatus,
) -> Option<RegionalSystemStatus> {
    match status {
        v1::RegionalSystemStatus::Unspecified => None,
        v1::RegionalSystemStatus::Available => Some(RegionalSystemStatus::Available),
        v1::RegionalSystemStatus::Processing => Some(RegionalSystemStatus::Processing),
        v1::RegionalSystemStatus::Error => Some(RegionalSystemStatus::Error),
    }
}
