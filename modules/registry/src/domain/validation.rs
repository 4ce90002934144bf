//! Built-in validation rule sets and subject reflection.
//!
//! Rules are registered at startup from the server's allow-lists and may be
//! overridden by the `validators[]` config section afterwards.

use registry_validation::{FieldRules, FieldValue, Rule, Validatable, ValidatorRegistry};

use crate::domain::model::{NewAuth, NewSystem, NewTenant};

/// Default pattern for user group entries.
pub const USER_GROUP_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*$";

/// Pattern for externally supplied tenant ids.
const TENANT_ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*$";

/// Register the built-in rule sets.
///
/// # Errors
/// Never fails for the built-in patterns; the signature matches the
/// config-extension path so the caller composes both the same way.
pub fn register_builtin(
    registry: &mut ValidatorRegistry,
    regions: &[String],
    owner_types: &[String],
) -> Result<(), regex::Error> {
    let tenant_id = regex::Regex::new(TENANT_ID_PATTERN)?;
    registry.register_custom("tenant-id", move |value| match value {
        FieldValue::Str(s) => tenant_id.is_match(s),
        _ => false,
    });

    let user_groups = regex::Regex::new(USER_GROUP_PATTERN)?;
    registry.register(
        "Tenant",
        vec![
            FieldRules::new("Tenant", "id", vec![Rule::NonEmpty, Rule::Custom("tenant-id".to_owned())]),
            FieldRules::new("Tenant", "name", vec![Rule::NonEmpty]),
            FieldRules::new("Tenant", "region", vec![Rule::Enum(regions.to_vec())]),
            FieldRules::new("Tenant", "owner_id", vec![Rule::NonEmpty]),
            FieldRules::new("Tenant", "owner_type", vec![Rule::Enum(owner_types.to_vec())]),
            FieldRules::new("Tenant", "role", vec![Rule::NonEmpty]),
            FieldRules::new("Tenant", "labels", vec![Rule::Map]),
            FieldRules::new(
                "Tenant",
                "user_groups",
                vec![Rule::Array {
                    pattern: Some(user_groups),
                }],
            ),
        ],
    );

    let group_pattern = regex::Regex::new(USER_GROUP_PATTERN)?;
    registry.register(
        "TenantUserGroups",
        vec![FieldRules::new(
            "Tenant",
            "user_groups",
            vec![Rule::Array {
                pattern: Some(group_pattern),
            }],
        )],
    );

    registry.register(
        "System",
        vec![
            FieldRules::new("System", "external_id", vec![Rule::NonEmpty]),
            FieldRules::new("System", "type", vec![Rule::NonEmpty]),
            FieldRules::new("System", "labels", vec![Rule::Map]),
        ],
    );

    registry.register(
        "Auth",
        vec![
            FieldRules::new("Auth", "external_id", vec![Rule::NonEmpty]),
            FieldRules::new("Auth", "tenant_id", vec![Rule::NonEmpty]),
            FieldRules::new("Auth", "type", vec![Rule::NonEmpty]),
            FieldRules::new("Auth", "properties", vec![Rule::Map]),
        ],
    );

    Ok(())
}

impl Validatable for NewTenant {
    fn type_name() -> &'static str {
        "Tenant"
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "id" => FieldValue::Str(&self.id),
            "name" => FieldValue::Str(&self.name),
            "region" => FieldValue::Str(&self.region),
            "owner_id" => FieldValue::Str(&self.owner_id),
            "owner_type" => FieldValue::Str(&self.owner_type),
            // An unspecified role reads as absent, failing the non-empty rule.
            "role" => match self.role {
                Some(crate::infra::storage::entity::TenantRole::Live) => FieldValue::Str("LIVE"),
                Some(crate::infra::storage::entity::TenantRole::Test) => FieldValue::Str("TEST"),
                None => FieldValue::Absent,
            },
            "labels" => FieldValue::Map(&self.labels),
            "user_groups" => FieldValue::List(&self.user_groups),
            _ => FieldValue::Absent,
        }
    }
}

/// Partial-update subject for `SetTenantUserGroups`; carries the tenant's
/// `user_groups` rules under its own type key so the other tenant rules do
/// not fire on absent fields.
pub struct UserGroupsPatch<'a>(pub &'a [String]);

impl Validatable for UserGroupsPatch<'_> {
    fn type_name() -> &'static str {
        "TenantUserGroups"
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "user_groups" => FieldValue::List(self.0),
            _ => FieldValue::Absent,
        }
    }
}

impl Validatable for NewSystem {
    fn type_name() -> &'static str {
        "System"
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "external_id" => FieldValue::Str(&self.external_id),
            "type" => FieldValue::Str(&self.system_type),
            "labels" => FieldValue::Map(&self.labels),
            _ => FieldValue::Absent,
        }
    }
}

impl Validatable for NewAuth {
    fn type_name() -> &'static str {
        "Auth"
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "external_id" => FieldValue::Str(&self.external_id),
            "tenant_id" => FieldValue::Str(&self.tenant_id),
            "type" => FieldValue::Str(&self.auth_type),
            "properties" => FieldValue::Map(&self.properties),
            _ => FieldValue::Absent,
        }
    }
}
