//! Orchestrator errors.

use registry_db::{DbError, TxError};

use crate::client::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum OrbitalError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("malformed job data: {0}")]
    BadJobData(String),

    #[error("no handler registered for job type {0}")]
    UnknownJobType(String),

    #[error("no operator target configured for region {0}")]
    UnknownRegion(String),
}

impl From<TxError<OrbitalError>> for OrbitalError {
    fn from(e: TxError<OrbitalError>) -> Self {
        e.into_domain(OrbitalError::Db)
    }
}

impl From<prost::DecodeError> for OrbitalError {
    fn from(e: prost::DecodeError) -> Self {
        OrbitalError::BadJobData(e.to_string())
    }
}

pub type Result<T, E = OrbitalError> = std::result::Result<T, E>;
