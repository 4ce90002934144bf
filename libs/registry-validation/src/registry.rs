//! Rule registry and evaluation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use regex::Regex;

use crate::config::{RuleKind, ValidatorConfig};
use crate::rule::{FieldRules, FieldValue, Rule, Validatable};

type CustomFn = Arc<dyn Fn(&FieldValue<'_>) -> bool + Send + Sync>;

/// One validation failure with its stable id and the offending parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub id: String,
    pub params: BTreeMap<String, String>,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)?;
        for (k, v) in &self.params {
            write!(f, " {k}={v}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("validation failed: {}", .violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

/// Startup errors when extending the registry from config.
#[derive(Debug, thiserror::Error)]
pub enum RegistryConfigError {
    #[error("validator {type_name}.{field}: enum rule needs allowed values")]
    EmptyEnum { type_name: String, field: String },
    #[error("validator {type_name}.{field}: invalid pattern: {source}")]
    BadPattern {
        type_name: String,
        field: String,
        source: regex::Error,
    },
    #[error("validator {type_name}.{field}: custom rule needs a predicate name")]
    MissingCustomName { type_name: String, field: String },
    #[error("validator {type_name}.{field}: unknown custom predicate {name}")]
    UnknownCustom {
        type_name: String,
        field: String,
        name: String,
    },
}

#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    rules: HashMap<String, Vec<FieldRules>>,
    customs: HashMap<String, CustomFn>,
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("types", &self.rules.keys().collect::<Vec<_>>())
            .field("customs", &self.customs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ValidatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or extend) the rule set of a type. A field registered twice
    /// keeps the later rules, which is how config overrides built-ins.
    pub fn register(&mut self, type_name: &str, fields: Vec<FieldRules>) {
        let entry = self.rules.entry(type_name.to_owned()).or_default();
        for field in fields {
            entry.retain(|existing| existing.field != field.field);
            entry.push(field);
        }
    }

    pub fn register_custom(
        &mut self,
        name: impl Into<String>,
        predicate: impl Fn(&FieldValue<'_>) -> bool + Send + Sync + 'static,
    ) {
        self.customs.insert(name.into(), Arc::new(predicate));
    }

    /// Extend the registry from the `validators[]` config section.
    ///
    /// # Errors
    /// Fails fast on empty enums, bad patterns and unknown custom predicates.
    pub fn apply_config(&mut self, configs: &[ValidatorConfig]) -> Result<(), RegistryConfigError> {
        for validator in configs {
            let mut fields = Vec::new();
            for field in &validator.fields {
                let mut rules = Vec::new();
                for rule in &field.rules {
                    rules.push(match rule.kind {
                        RuleKind::NonEmpty => Rule::NonEmpty,
                        RuleKind::Map => Rule::Map,
                        RuleKind::Enum => {
                            if rule.allowed_values.is_empty() {
                                return Err(RegistryConfigError::EmptyEnum {
                                    type_name: validator.type_name.clone(),
                                    field: field.field_name.clone(),
                                });
                            }
                            Rule::Enum(rule.allowed_values.clone())
                        }
                        RuleKind::Array => {
                            let pattern = rule
                                .pattern
                                .as_deref()
                                .map(Regex::new)
                                .transpose()
                                .map_err(|source| RegistryConfigError::BadPattern {
                                    type_name: validator.type_name.clone(),
                                    field: field.field_name.clone(),
                                    source,
                                })?;
                            Rule::Array { pattern }
                        }
                        RuleKind::Custom => {
                            let name = rule.name.clone().ok_or_else(|| {
                                RegistryConfigError::MissingCustomName {
                                    type_name: validator.type_name.clone(),
                                    field: field.field_name.clone(),
                                }
                            })?;
                            if !self.customs.contains_key(&name) {
                                return Err(RegistryConfigError::UnknownCustom {
                                    type_name: validator.type_name.clone(),
                                    field: field.field_name.clone(),
                                    name,
                                });
                            }
                            Rule::Custom(name)
                        }
                    });
                }
                fields.push(FieldRules::new(&validator.type_name, &field.field_name, rules));
            }
            self.register(&validator.type_name, fields);
        }
        Ok(())
    }

    /// Evaluate every rule registered for `T`, collecting all failures.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] listing one [`Violation`] per failed
    /// field rule.
    pub fn validate<T: Validatable>(&self, subject: &T) -> Result<(), ValidationError> {
        let Some(fields) = self.rules.get(T::type_name()) else {
            return Ok(());
        };
        let mut violations = Vec::new();
        for field_rules in fields {
            let value = subject.field(&field_rules.field);
            for rule in &field_rules.rules {
                if let Some(params) = self.check(rule, &value) {
                    violations.push(Violation {
                        id: field_rules.id.clone(),
                        params,
                    });
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }

    /// `Some(params)` when the rule fails.
    fn check(
        &self,
        rule: &Rule,
        value: &FieldValue<'_>,
    ) -> Option<BTreeMap<String, String>> {
        match (rule, value) {
            (Rule::NonEmpty, FieldValue::Str(s)) => {
                (s.trim().is_empty()).then(BTreeMap::new)
            }
            (Rule::NonEmpty, FieldValue::Absent) => Some(BTreeMap::new()),
            (Rule::Enum(allowed), FieldValue::Str(s)) => {
                if allowed.iter().any(|a| a == s) {
                    None
                } else {
                    Some(BTreeMap::from([
                        ("value".to_owned(), (*s).to_owned()),
                        ("allowed".to_owned(), allowed.join(",")),
                    ]))
                }
            }
            (Rule::Enum(allowed), FieldValue::Absent) => Some(BTreeMap::from([(
                "allowed".to_owned(),
                allowed.join(","),
            )])),
            (Rule::Map, FieldValue::Map(map)) => {
                for (k, v) in map.iter() {
                    if k.trim().is_empty() || v.trim().is_empty() {
                        return Some(BTreeMap::from([("key".to_owned(), k.clone())]));
                    }
                }
                None
            }
            (Rule::Array { pattern }, FieldValue::List(items)) => {
                for item in items.iter() {
                    if item.trim().is_empty() {
                        return Some(BTreeMap::from([("entry".to_owned(), item.clone())]));
                    }
                    if let Some(re) = pattern {
                        if !re.is_match(item) {
                            return Some(BTreeMap::from([
                                ("entry".to_owned(), item.clone()),
                                ("pattern".to_owned(), re.as_str().to_owned()),
                            ]));
                        }
                    }
                }
                None
            }
            (Rule::Custom(name), v) => {
                let predicate = self.customs.get(name)?;
                (!predicate(v)).then(|| {
                    BTreeMap::from([("rule".to_owned(), name.clone())])
                })
            }
            // Rule does not apply to this value shape; absent collections are
            // treated as empty and pass.
            _ => None,
        }
    }
}
