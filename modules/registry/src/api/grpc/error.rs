//! Domain → RPC status mapping.

use tonic::Status;
use tracing::error;

use crate::domain::error::DomainError;

pub fn to_status(err: DomainError) -> Status {
    match &err {
        DomainError::Validation(_) | DomainError::InvalidArgument { .. } => {
            Status::invalid_argument(err.to_string())
        }
        DomainError::NotFound { .. } => Status::not_found(err.to_string()),
        DomainError::AlreadyExists(_) => Status::already_exists(err.to_string()),
        DomainError::FailedPrecondition { .. } | DomainError::TooManyTypes(_) => {
            Status::failed_precondition(err.to_string())
        }
        DomainError::DeadlineExceeded => Status::deadline_exceeded(err.to_string()),
        DomainError::Internal(detail) => {
            // Detail stays in the log; the wire gets a generic message.
            error!(detail = %detail, "internal error");
            Status::internal("internal error")
        }
    }
}
