//! Outcome projection seam.
//!
//! The orchestrator knows nothing about tenants or auths. Per job type, the
//! composition root registers a handler that derives the operator targets
//! from the job snapshot and projects the terminal outcome back onto the
//! originating entity inside the same transaction that finalises the job,
//! so a duplicate reconciliation can never double-apply.

use async_trait::async_trait;
use registry_db::RepoTx;

use crate::entity::job;
use crate::error::OrbitalError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every task reported DONE.
    Done,
    /// At least one task failed terminally.
    Failed,
}

impl JobOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Done => "DONE",
            JobOutcome::Failed => "FAILED",
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Operator regions this job fans out to, derived from the snapshot.
    ///
    /// # Errors
    /// `OrbitalError::BadJobData` when the snapshot cannot be decoded.
    fn targets(&self, job: &job::Model) -> Result<Vec<String>, OrbitalError>;

    /// Project the terminal outcome onto the originating entity.
    ///
    /// # Errors
    /// Propagates repository failures; the enclosing transaction rolls back.
    async fn apply(
        &self,
        tx: &RepoTx<'_>,
        job: &job::Model,
        outcome: JobOutcome,
    ) -> Result<(), OrbitalError>;
}
