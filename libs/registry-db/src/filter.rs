//! Composite-key filters.
//!
//! A [`CompositeKey`] is a conjunction of per-field predicates; a [`Filter`]
//! is a disjunction of composite keys. Field names are resolved through the
//! resource's column whitelist, so a filter can never reference a column the
//! resource did not register.

use std::collections::BTreeMap;

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, Value};

use crate::error::DbError;
use crate::resource::Resource;

/// Predicate on a single field.
#[derive(Clone, Debug)]
pub enum FieldFilter {
    /// `field = value`
    Eq(Value),
    /// `field IN (values)`
    In(Vec<Value>),
    /// `field <= value` (used by the orchestrator's due-time scans)
    LtEq(Value),
    /// `field > value` (used by the orchestrator's event watermark)
    Gt(Value),
    /// `field IS NOT NULL AND field <> ''`
    NotEmpty,
    /// `field IS NULL OR field = ''`
    Empty,
    /// JSONB containment: one `field ->> 'k' = 'v'` conjunct per entry.
    Json(BTreeMap<String, String>),
}

/// Conjunction of field predicates (`AND`).
#[derive(Clone, Debug, Default)]
pub struct CompositeKey(BTreeMap<String, FieldFilter>);

impl CompositeKey {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, filter: FieldFilter) -> Self {
        self.0.insert(name.into(), filter);
        self
    }

    #[must_use]
    pub fn eq(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(name, FieldFilter::Eq(value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compile to a `sea_orm` condition against resource `E`.
    ///
    /// # Errors
    /// `DbError::UnknownField` when a field is not on the resource whitelist.
    pub fn to_condition<E: Resource>(&self) -> Result<Condition, DbError> {
        let mut cond = Condition::all();
        for (name, filter) in &self.0 {
            let col =
                E::column_for(name).ok_or_else(|| DbError::UnknownField(name.clone()))?;
            cond = cond.add(match filter {
                FieldFilter::Eq(v) => Condition::all().add(col.eq(v.clone())),
                FieldFilter::In(vs) => Condition::all().add(col.is_in(vs.iter().cloned())),
                FieldFilter::LtEq(v) => Condition::all().add(col.lte(v.clone())),
                FieldFilter::Gt(v) => Condition::all().add(col.gt(v.clone())),
                FieldFilter::NotEmpty => Condition::all()
                    .add(col.is_not_null())
                    .add(col.ne("")),
                FieldFilter::Empty => Condition::any().add(col.is_null()).add(col.eq("")),
                FieldFilter::Json(entries) => {
                    // `->>` is native on Postgres and SQLite 3.38+. Keys and
                    // values are inlined as escaped literals because bind
                    // placeholder syntax differs per backend.
                    let mut json = Condition::all();
                    for (k, v) in entries {
                        json = json.add(Expr::cust(format!(
                            "\"{name}\" ->> '{}' = '{}'",
                            escape_literal(k),
                            escape_literal(v)
                        )));
                    }
                    json
                }
            });
        }
        Ok(cond)
    }
}

fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// Disjunction of composite keys (`OR`). An empty filter matches everything.
#[derive(Clone, Debug, Default)]
pub struct Filter(Vec<CompositeKey>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn any_of(keys: Vec<CompositeKey>) -> Self {
        Self(keys)
    }

    #[must_use]
    pub fn or(mut self, key: CompositeKey) -> Self {
        self.0.push(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(CompositeKey::is_empty)
    }

    /// Compile to a `sea_orm` condition against resource `E`.
    ///
    /// # Errors
    /// `DbError::UnknownField` when any key references an unknown field.
    pub fn to_condition<E: Resource>(&self) -> Result<Condition, DbError> {
        if self.is_empty() {
            return Ok(Condition::all());
        }
        let mut cond = Condition::any();
        for key in &self.0 {
            cond = cond.add(key.to_condition::<E>()?);
        }
        Ok(cond)
    }
}

impl From<CompositeKey> for Filter {
    fn from(key: CompositeKey) -> Self {
        Self(vec![key])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use chrono::{DateTime, Utc};
    use sea_orm::{DbBackend, EntityTrait, QueryFilter, QueryTrait};

    mod ent {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "items")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub region: String,
            #[sea_orm(nullable)]
            pub labels: Option<Json>,
            pub created_at: DateTimeUtc,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    impl Resource for ent::Entity {
        fn column_for(field: &str) -> Option<ent::Column> {
            match field {
                "id" => Some(ent::Column::Id),
                "region" => Some(ent::Column::Region),
                "labels" => Some(ent::Column::Labels),
                "created_at" => Some(ent::Column::CreatedAt),
                _ => None,
            }
        }

        fn sort_fields() -> &'static [&'static str] {
            &["id"]
        }

        fn created_at(model: &ent::Model) -> DateTime<Utc> {
            model.created_at
        }

        fn sort_key(model: &ent::Model, field: &str) -> Option<String> {
            match field {
                "id" => Some(model.id.clone()),
                _ => None,
            }
        }
    }

    fn sql(filter: &Filter) -> String {
        ent::Entity::find()
            .filter(filter.to_condition::<ent::Entity>().unwrap())
            .build(DbBackend::Postgres)
            .to_string()
    }

    #[test]
    fn scalar_and_slice_render_as_eq_and_in() {
        let filter: Filter = CompositeKey::new()
            .eq("region", "eu-1")
            .field("id", FieldFilter::In(vec!["a".into(), "b".into()]))
            .into();
        let sql = sql(&filter);
        assert!(sql.contains(r#""region" = 'eu-1'"#), "{sql}");
        assert!(sql.contains(r#""id" IN ('a', 'b')"#), "{sql}");
    }

    #[test]
    fn json_submap_renders_arrow_conjuncts() {
        let filter: Filter = CompositeKey::new()
            .field(
                "labels",
                FieldFilter::Json(
                    [
                        ("env".to_owned(), "prod".to_owned()),
                        ("team".to_owned(), "kms".to_owned()),
                    ]
                    .into(),
                ),
            )
            .into();
        let sql = sql(&filter);
        assert!(sql.contains(r#""labels" ->> 'env' = 'prod'"#), "{sql}");
        assert!(sql.contains(r#""labels" ->> 'team' = 'kms'"#), "{sql}");
    }

    #[test]
    fn json_values_are_escaped() {
        let filter: Filter = CompositeKey::new()
            .field(
                "labels",
                FieldFilter::Json([("k".to_owned(), "it's".to_owned())].into()),
            )
            .into();
        let sql = sql(&filter);
        assert!(sql.contains("'it''s'"), "{sql}");
    }

    #[test]
    fn composite_keys_or_at_the_outer_level() {
        let filter = Filter::any_of(vec![
            CompositeKey::new().eq("region", "eu-1").eq("id", "a"),
            CompositeKey::new().eq("region", "us-1"),
        ]);
        let sql = sql(&filter);
        assert!(sql.contains(" OR "), "{sql}");
        assert!(sql.contains(" AND "), "{sql}");
    }

    #[test]
    fn empty_and_not_empty_render_null_or_blank_checks() {
        let filter: Filter = CompositeKey::new()
            .field("region", FieldFilter::NotEmpty)
            .into();
        let not_empty = sql(&filter);
        assert!(not_empty.contains(r#""region" IS NOT NULL"#), "{not_empty}");
        assert!(not_empty.contains(r#""region" <> ''"#), "{not_empty}");

        let filter: Filter = CompositeKey::new().field("region", FieldFilter::Empty).into();
        let empty = sql(&filter);
        assert!(empty.contains(r#""region" IS NULL"#), "{empty}");
        assert!(empty.contains(r#""region" = ''"#), "{empty}");
    }

    #[test]
    fn unknown_field_is_a_typed_error() {
        let filter: Filter = CompositeKey::new().eq("secret", "x").into();
        assert!(matches!(
            filter.to_condition::<ent::Entity>(),
            Err(crate::error::DbError::UnknownField(f)) if f == "secret"
        ));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = Filter::new();
        assert!(filter.is_empty());
        assert!(filter.to_condition::<ent::Entity>().is_ok());
    }
}
