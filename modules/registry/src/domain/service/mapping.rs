//! Mapping service: the legacy single-system link surface.
//!
//! `Map` may create the system row implicitly; its regional projections
//! arrive later through `RegisterSystem`.

use chrono::Utc;
use registry_db::{CompositeKey, Db};
use sea_orm::ActiveValue::Set;
use tracing::{info, instrument};

use super::system::{link_one, require_active_tenant, resolve_type};
use crate::domain::error::{params, DomainError, Result};
use crate::domain::model::SystemRef;
use crate::infra::storage::entity::system;

pub struct MappingService {
    db: Db,
}

/// The current tenant assignment of a system.
#[derive(Clone, Debug)]
pub struct Mapping {
    pub external_id: String,
    pub system_type: String,
    pub tenant_id: Option<String>,
}

impl MappingService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn map(&self, reference: &SystemRef, tenant_id: &str) -> Result<()> {
        let reference = reference.clone();
        let tenant_id = tenant_id.to_owned();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    require_active_tenant(tx, &tenant_id).await?;

                    let resolved =
                        resolve_type(tx, &reference.external_id, reference.system_type.clone())
                            .await?;
                    match resolved {
                        Some(system_type) => {
                            link_one(
                                tx,
                                &SystemRef {
                                    external_id: reference.external_id.clone(),
                                    system_type: Some(system_type),
                                },
                                &tenant_id,
                                true,
                            )
                            .await?;
                        }
                        None => {
                            // Implicit creation: the mapping may precede the
                            // system's registration.
                            let Some(system_type) = reference.system_type.clone() else {
                                return Err(DomainError::invalid_argument(
                                    "System.Type",
                                    params([("externalID", &reference.external_id)]),
                                ));
                            };
                            let now = Utc::now();
                            registry_db::create(
                                tx,
                                system::ActiveModel {
                                    external_id: Set(reference.external_id.clone()),
                                    system_type: Set(system_type),
                                    tenant_id: Set(Some(tenant_id.clone())),
                                    labels: Set(None),
                                    created_at: Set(now),
                                    updated_at: Set(now),
                                },
                            )
                            .await
                            .map_err(DomainError::from)?;
                            info!(external_id = %reference.external_id, "system created implicitly by mapping");
                        }
                    }
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }

    #[instrument(skip(self))]
    pub async fn unmap(&self, reference: &SystemRef, tenant_id: &str) -> Result<()> {
        let reference = reference.clone();
        let tenant_id = tenant_id.to_owned();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    require_active_tenant(tx, &tenant_id).await?;
                    link_one(tx, &reference, &tenant_id, false).await
                })
            })
            .await
            .map_err(DomainError::from)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, reference: &SystemRef) -> Result<Mapping> {
        let conn = self.db.conn();
        let Some(system_type) =
            resolve_type(&conn, &reference.external_id, reference.system_type.clone()).await?
        else {
            return Err(DomainError::not_found(
                "system",
                params([("externalID", &reference.external_id)]),
            ));
        };
        let Some(system_row) = registry_db::find::<system::Entity, _>(
            &conn,
            &CompositeKey::new()
                .eq("external_id", reference.external_id.as_str())
                .eq("type", system_type.as_str()),
        )
        .await
        .map_err(DomainError::from)?
        else {
            return Err(DomainError::not_found(
                "system",
                params([
                    ("externalID", &reference.external_id),
                    ("type", &system_type),
                ]),
            ));
        };
        Ok(Mapping {
            external_id: system_row.external_id,
            system_type: system_row.system_type,
            tenant_id: system_row.tenant_id,
        })
    }
}
