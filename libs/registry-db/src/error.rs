//! Typed repository errors.
//!
//! Services match on [`DbError`] kinds to translate persistence failures into
//! their own domain errors (`UniqueConstraint` becomes `AlreadyExists`,
//! `DeadlineExceeded` propagates as-is, everything else stays opaque).

use sea_orm::{DbErr, SqlErr};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Insert hit a unique constraint. The payload is the driver's detail
    /// string (constraint name and offending key where the backend provides
    /// them).
    #[error("unique constraint violated: {0}")]
    UniqueConstraint(String),

    /// The ambient deadline fired before the operation completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A filter or patch referenced a field outside the resource whitelist.
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid cursor: invalid base64url encoding")]
    CursorInvalidBase64,

    #[error("invalid cursor: malformed JSON")]
    CursorInvalidJson,

    #[error("invalid cursor: unsupported version")]
    CursorInvalidVersion,

    /// Cursor carries a field that is not on the sort-field whitelist.
    #[error("invalid cursor: field not allowed: {0}")]
    CursorFieldNotAllowed(String),

    /// Cursor is missing a tie-breaker the resource orders by.
    #[error("invalid cursor: missing field: {0}")]
    CursorMissingField(String),

    #[error(transparent)]
    Db(DbErr),
}

impl From<DbErr> for DbError {
    fn from(e: DbErr) -> Self {
        match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => Self::UniqueConstraint(detail),
            _ => Self::Db(e),
        }
    }
}

/// Transaction error separating domain failures from infrastructure ones.
///
/// The closure passed to [`crate::Db::transaction`] returns domain errors;
/// begin/commit failures surface as [`TxError::Db`]. Callers collapse the two
/// with [`TxError::into_domain`].
#[derive(Debug)]
pub enum TxError<E> {
    Domain(E),
    Db(DbError),
}

impl<E> TxError<E> {
    pub fn into_domain<F>(self, map_db: F) -> E
    where
        F: FnOnce(DbError) -> E,
    {
        match self {
            TxError::Domain(e) => e,
            TxError::Db(db) => map_db(db),
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for TxError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxError::Domain(e) => write!(f, "{e}"),
            TxError::Db(e) => write!(f, "{e}"),
        }
    }
}

pub type Result<T, E = DbError> = std::result::Result<T, E>;
