//! Tenant→auth status projection.
//!
//! The sharpest coupling in the system: a tenant moving into a transient
//! state must first prove that none of its auths is mid-flight, then project
//! the transition onto every remaining auth, all inside the tenant write's
//! transaction. The seam is a trait so the two state machines stay in
//! separate modules without a cycle.

use async_trait::async_trait;
use chrono::Utc;
use registry_db::{CompositeKey, FieldFilter, ListQuery, RepoTx};
use sea_orm::ActiveValue::Set;

use crate::domain::error::{params, DomainError};
use crate::domain::jobs::active_enum_value;
use crate::infra::storage::entity::{auth, AuthStatus};

/// Tenant transitions that fan out onto auths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TenantTransition {
    Block,
    Unblock,
    Terminate,
}

#[async_trait]
pub trait StatusProjector: Send + Sync {
    /// Reject when any auth of the tenant is transient, then project the
    /// transition onto the non-transient ones.
    async fn project(
        &self,
        tx: &RepoTx<'_>,
        tenant_id: &str,
        transition: TenantTransition,
    ) -> Result<(), DomainError>;
}

/// The production projector over the `auths` table.
pub struct AuthProjector;

const TRANSIENT: &[AuthStatus] = &[
    AuthStatus::Applying,
    AuthStatus::Removing,
    AuthStatus::Blocking,
    AuthStatus::Unblocking,
];

#[async_trait]
impl StatusProjector for AuthProjector {
    async fn project(
        &self,
        tx: &RepoTx<'_>,
        tenant_id: &str,
        transition: TenantTransition,
    ) -> Result<(), DomainError> {
        let transient = registry_db::list::<auth::Entity, _>(
            tx,
            &ListQuery::new()
                .with_filter(
                    CompositeKey::new().eq("tenant_id", tenant_id).field(
                        "status",
                        FieldFilter::In(
                            TRANSIENT.iter().map(|s| active_enum_value(s).into()).collect(),
                        ),
                    ),
                )
                .with_limit(1),
        )
        .await
        .map_err(DomainError::from)?
        .items;
        if let Some(blocking) = transient.first() {
            return Err(DomainError::precondition(
                "auth in transient state",
                params([
                    ("tenantID", tenant_id),
                    ("authExternalID", &blocking.external_id),
                    ("authStatus", &active_enum_value(&blocking.status)),
                ]),
            ));
        }

        // Every non-transient auth follows the tenant into the transition's
        // transient state; only REMOVED stays put.
        let to = match transition {
            TenantTransition::Block => AuthStatus::Blocking,
            TenantTransition::Unblock => AuthStatus::Unblocking,
            TenantTransition::Terminate => AuthStatus::Removing,
        };

        registry_db::patch_all(
            tx,
            auth::ActiveModel {
                status: Set(to),
                updated_at: Set(Utc::now()),
                ..Default::default()
            },
            &CompositeKey::new().eq("tenant_id", tenant_id).field(
                "status",
                FieldFilter::In(
                    auth::PROJECTABLE
                        .iter()
                        .map(|s| active_enum_value(s).into())
                        .collect(),
                ),
            )
            .into(),
        )
        .await
        .map_err(DomainError::from)?;
        Ok(())
    }
}
