//! Registry domain module.
//!
//! Owns the tenant / system / auth entities, their lifecycle services and
//! the gRPC transport around them. Asynchronous lifecycle work is delegated
//! to the orbital orchestrator: every state-altering call persists its entity
//! write and its job submission in one repository transaction, and the job
//! handlers here close the loop by projecting terminal outcomes back onto
//! the entities.

pub mod api;
pub mod domain;
pub mod infra;
pub mod metrics;

pub use domain::error::DomainError;
pub use domain::service::{
    AuthProjector, AuthService, MappingService, StatusProjector, SystemService, TenantService,
};
