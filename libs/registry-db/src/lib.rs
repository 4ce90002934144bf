//! Transactional repository for the registry control-plane.
//!
//! The repository is polymorphic over a [`Resource`] capability set (column
//! whitelist + sort fields) and never introspects entity semantics; services
//! supply the model. It provides:
//!
//! - composite-key filters (`=`, `IN`, null-or-blank checks, JSONB `->>`
//!   conjuncts) OR-combined at the outer level,
//! - keyset pagination with base64url cursors validated against a hard field
//!   whitelist,
//! - closure transactions that commit iff the closure returns `Ok`, with
//!   `FOR UPDATE` point reads inside and `FOR UPDATE SKIP LOCKED` pickup for
//!   background workers,
//! - typed failure kinds so services can turn a duplicate key into
//!   `AlreadyExists` without string matching.

mod cursor;
mod error;
mod filter;
mod ops;
mod page;
mod resource;
mod runner;

pub use cursor::{PageCursor, CURSOR_FIELDS};
pub use error::{DbError, Result, TxError};
pub use filter::{CompositeKey, FieldFilter, Filter};
pub use ops::{create, delete, find, list, list_for_update_skip_locked, patch, patch_all};
pub use page::{ListQuery, Page, DEFAULT_LIMIT, MAX_LIMIT};
pub use resource::Resource;
pub use runner::{Db, RepoConn, RepoTx, Runner};

// Re-export for entity definitions and migrations in dependent crates.
pub use sea_orm;
