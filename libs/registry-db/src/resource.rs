//! Resource capability set.
//!
//! The repository never introspects entity semantics. An entity opts in by
//! naming its filterable columns, its tie-breaker sort fields and how to read
//! the ordering tuple off a row; everything else (SQL shape, locking,
//! pagination) is generic.

use chrono::{DateTime, Utc};
use sea_orm::EntityTrait;

pub trait Resource: EntityTrait {
    /// Resolve an exposed field name to a column. This doubles as the hard
    /// whitelist for filters, patches and cursor predicates.
    fn column_for(field: &str) -> Option<Self::Column>;

    /// Tie-breaker sort fields applied after `created_at`, all descending.
    /// Every entry must resolve through [`Resource::column_for`] and appear in
    /// [`crate::cursor::CURSOR_FIELDS`].
    fn sort_fields() -> &'static [&'static str];

    /// Row creation instant, the primary sort key.
    fn created_at(model: &Self::Model) -> DateTime<Utc>;

    /// String rendering of a tie-breaker value for the page cursor.
    fn sort_key(model: &Self::Model, field: &str) -> Option<String>;
}
