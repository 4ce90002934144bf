//! Domain errors.
//!
//! Every kind maps 1:1 onto an RPC status in the api layer. Errors carrying
//! parameters render them as a canonical `key=value` trailer so clients and
//! tests can match substrings.

use std::collections::BTreeMap;

use registry_db::{DbError, TxError};
use registry_validation::ValidationError;

/// `key=value` parameter map carried by lookup and precondition errors.
pub type Params = BTreeMap<String, String>;

fn render(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid argument: {reason} {}", render(.params))]
    InvalidArgument { reason: String, params: Params },

    #[error("{entity} not found {}", render(.params))]
    NotFound { entity: &'static str, params: Params },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("precondition failed: {reason} {}", render(.params))]
    FailedPrecondition { reason: String, params: Params },

    /// A type-less lookup matched more than one system type.
    #[error("too many types for system external_id={0}")]
    TooManyTypes(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, params: Params) -> Self {
        Self::NotFound { entity, params }
    }

    pub fn invalid_argument(reason: impl Into<String>, params: Params) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
            params,
        }
    }

    pub fn precondition(reason: impl Into<String>, params: Params) -> Self {
        Self::FailedPrecondition {
            reason: reason.into(),
            params,
        }
    }
}

/// Build a [`Params`] map from `(key, value)` pairs.
pub fn params<const N: usize>(pairs: [(&str, &str); N]) -> Params {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

impl From<DbError> for DomainError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::UniqueConstraint(detail) => Self::AlreadyExists(detail),
            DbError::DeadlineExceeded => Self::DeadlineExceeded,
            DbError::CursorInvalidBase64
            | DbError::CursorInvalidJson
            | DbError::CursorInvalidVersion
            | DbError::CursorFieldNotAllowed(_)
            | DbError::CursorMissingField(_) => Self::InvalidArgument {
                reason: format!("invalid page token: {e}"),
                params: Params::new(),
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<TxError<DomainError>> for DomainError {
    fn from(e: TxError<DomainError>) -> Self {
        e.into_domain(DomainError::from)
    }
}

impl From<orbital::OrbitalError> for DomainError {
    fn from(e: orbital::OrbitalError) -> Self {
        match e {
            orbital::OrbitalError::Db(db) => db.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

pub type Result<T, E = DomainError> = std::result::Result<T, E>;
