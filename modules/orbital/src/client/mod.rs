//! Operator clients.
//!
//! The registry is the initiator: it publishes request envelopes to a
//! per-region target address and drains response envelopes from the matching
//! source address. The transport is hidden behind [`OperatorClient`] so tests
//! swap in the in-memory implementation.

mod amqp;
mod memory;

pub use amqp::AmqpClient;
pub use memory::MemoryClient;

use async_trait::async_trait;
use registry_grpc::operator::v1::{OperatorRequest, OperatorResponse};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Amqp(#[from] lapin::Error),

    #[error("response decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("operator client closed")]
    Closed,
}

/// A regional operator connection. Implementations are safe for concurrent
/// use by all worker pools; reconnection is their own concern.
#[async_trait]
pub trait OperatorClient: Send + Sync {
    /// Publish one task request envelope. Returning `Ok` means the broker
    /// acknowledged the publish, not that the operator processed it.
    async fn send(&self, request: OperatorRequest) -> Result<(), ClientError>;

    /// Drain one pending response, if any. Non-blocking: `None` means the
    /// source queue is currently empty.
    async fn try_receive(&self) -> Result<Option<OperatorResponse>, ClientError>;
}
