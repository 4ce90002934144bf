//! In-memory operator client for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use registry_grpc::operator::v1::{OperatorRequest, OperatorResponse};

use super::{ClientError, OperatorClient};

/// Channel-free double: captures sent requests, hands back queued responses.
#[derive(Debug, Default)]
pub struct MemoryClient {
    sent: Mutex<Vec<OperatorRequest>>,
    responses: Mutex<VecDeque<OperatorResponse>>,
    fail_sends: Mutex<bool>,
}

impl MemoryClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests published so far.
    pub fn sent(&self) -> Vec<OperatorRequest> {
        self.sent.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Queue a response for the next `try_receive`.
    pub fn push_response(&self, response: OperatorResponse) {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(response);
    }

    /// Make subsequent sends fail, simulating a broker outage.
    pub fn set_fail_sends(&self, fail: bool) {
        *self
            .fail_sends
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = fail;
    }
}

#[async_trait]
impl OperatorClient for MemoryClient {
    async fn send(&self, request: OperatorRequest) -> Result<(), ClientError> {
        if *self
            .fail_sends
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
        {
            return Err(ClientError::Closed);
        }
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request);
        Ok(())
    }

    async fn try_receive(&self) -> Result<Option<OperatorResponse>, ClientError> {
        Ok(self
            .responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front())
    }
}
