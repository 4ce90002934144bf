//! Rule kinds and the subject reflection trait.

use std::collections::HashMap;

use regex::Regex;

/// A named field's value as seen by the rule engine.
#[derive(Clone, Copy, Debug)]
pub enum FieldValue<'a> {
    Str(&'a str),
    Map(&'a HashMap<String, String>),
    List(&'a [String]),
    Absent,
}

/// A subject exposing named fields for validation.
pub trait Validatable {
    /// Type name rules are keyed by (`Tenant`, `System`, `Auth`).
    fn type_name() -> &'static str;

    fn field(&self, name: &str) -> FieldValue<'_>;
}

#[derive(Clone, Debug)]
pub enum Rule {
    /// Present, non-empty and not blank.
    NonEmpty,
    /// Value must be one of the allowed strings.
    Enum(Vec<String>),
    /// Every key and value non-empty.
    Map,
    /// Every entry non-empty, non-blank and (when given) matching the
    /// pattern.
    Array { pattern: Option<Regex> },
    /// Named predicate resolved against the registry at evaluation time.
    Custom(String),
}

/// Rules attached to one field of one type.
#[derive(Clone, Debug)]
pub struct FieldRules {
    pub field: String,
    /// Stable violation id, e.g. `Tenant.Region`.
    pub id: String,
    pub rules: Vec<Rule>,
}

impl FieldRules {
    pub fn new(type_name: &str, field: impl Into<String>, rules: Vec<Rule>) -> Self {
        let field = field.into();
        let id = format!("{type_name}.{}", display_name(&field));
        Self { field, id, rules }
    }
}

/// Render a snake_case field name the way violation ids spell it
/// (`owner_type` -> `OwnerType`, `id` -> `ID`).
pub(crate) fn display_name(field: &str) -> String {
    if field.eq_ignore_ascii_case("id") {
        return "ID".to_owned();
    }
    field
        .split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::display_name;

    #[test]
    fn display_names_match_violation_id_style() {
        assert_eq!(display_name("id"), "ID");
        assert_eq!(display_name("owner_type"), "OwnerType");
        assert_eq!(display_name("user_groups"), "UserGroups");
        assert_eq!(display_name("region"), "Region");
    }
}
