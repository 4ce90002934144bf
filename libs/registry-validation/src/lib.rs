//! Declarative field-level validation.
//!
//! Rules are keyed by `(type name, field name)` and evaluated against any
//! subject implementing [`Validatable`]. Built-in rule sets are registered at
//! startup; `validators[]` config entries extend or override them. Failures
//! carry a stable id (`Tenant.Region`) plus a `key=value` parameter map so
//! clients can localize without parsing prose.

mod config;
mod registry;
mod rule;

pub use config::{FieldConfig, RuleConfig, RuleKind, ValidatorConfig};
pub use registry::{RegistryConfigError, ValidationError, ValidatorRegistry, Violation};
pub use rule::{FieldRules, FieldValue, Rule, Validatable};
