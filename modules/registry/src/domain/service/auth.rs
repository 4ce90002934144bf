//! Auth lifecycle service.

use std::sync::Arc;

use chrono::Utc;
use registry_db::{CompositeKey, Db, ListQuery, Page};
use registry_validation::ValidatorRegistry;
use sea_orm::ActiveValue::Set;
use tracing::{info, instrument};

use super::system::require_active_tenant;
use super::decode_cursor;
use crate::domain::error::{params, DomainError, Result};
use crate::domain::jobs::{self, active_enum_value};
use crate::domain::model::{labels_to_json, AuthFilter, NewAuth, PageRequest};
use crate::infra::storage::entity::auth::{self, AuthStatus};

pub struct AuthService {
    db: Db,
    validators: Arc<ValidatorRegistry>,
}

impl AuthService {
    pub fn new(db: Db, validators: Arc<ValidatorRegistry>) -> Self {
        Self { db, validators }
    }

    /// Apply an auth to a tenant. Idempotent: re-applying an existing auth
    /// updates its properties and submits no new job.
    #[instrument(skip(self, new), fields(external_id = %new.external_id, tenant_id = %new.tenant_id))]
    pub async fn apply(&self, new: NewAuth) -> Result<()> {
        self.validators.validate(&new)?;
        let now = Utc::now();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let tenant_row = require_active_tenant(tx, &new.tenant_id).await?;

                    let key = CompositeKey::new().eq("external_id", new.external_id.as_str());
                    match registry_db::find::<auth::Entity, _>(tx, &key)
                        .await
                        .map_err(DomainError::from)?
                    {
                        Some(existing) => {
                            if existing.tenant_id != new.tenant_id {
                                return Err(DomainError::invalid_argument(
                                    "auth belongs to a different tenant",
                                    params([
                                        ("externalID", &new.external_id),
                                        ("tenantID", &existing.tenant_id),
                                    ]),
                                ));
                            }
                            registry_db::patch(
                                tx,
                                auth::ActiveModel {
                                    external_id: Set(existing.external_id.clone()),
                                    properties: Set(labels_to_json(&new.properties)),
                                    updated_at: Set(now),
                                    ..Default::default()
                                },
                            )
                            .await
                            .map_err(DomainError::from)?;
                            info!(external_id = %existing.external_id, "auth properties updated");
                        }
                        None => {
                            let model = auth::Model {
                                external_id: new.external_id.clone(),
                                tenant_id: new.tenant_id.clone(),
                                auth_type: new.auth_type.clone(),
                                properties: labels_to_json(&new.properties),
                                status: AuthStatus::Applying,
                                created_at: now,
                                updated_at: now,
                            };
                            registry_db::create(
                                tx,
                                auth::ActiveModel {
                                    external_id: Set(model.external_id.clone()),
                                    tenant_id: Set(model.tenant_id.clone()),
                                    auth_type: Set(model.auth_type.clone()),
                                    properties: Set(model.properties.clone()),
                                    status: Set(model.status.clone()),
                                    created_at: Set(now),
                                    updated_at: Set(now),
                                },
                            )
                            .await
                            .map_err(DomainError::from)?;

                            orbital::enqueue(
                                tx,
                                orbital::NewJob {
                                    job_type: jobs::APPLY_AUTH.to_owned(),
                                    external_id: model.external_id.clone(),
                                    data: jobs::auth_job_data(&model, &tenant_row.region),
                                },
                            )
                            .await
                            .map_err(DomainError::from)?;
                            info!(external_id = %model.external_id, "auth apply submitted");
                        }
                    }
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }

    /// Remove an applied auth. Requires the auth in `APPLIED` and its tenant
    /// `ACTIVE`.
    #[instrument(skip(self))]
    pub async fn remove(&self, external_id: &str) -> Result<()> {
        let external_id = external_id.to_owned();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let Some(auth_row) = registry_db::find::<auth::Entity, _>(
                        tx,
                        &CompositeKey::new().eq("external_id", external_id.as_str()),
                    )
                    .await
                    .map_err(DomainError::from)?
                    else {
                        return Err(DomainError::not_found(
                            "auth",
                            params([("externalID", &external_id)]),
                        ));
                    };
                    if auth_row.status != AuthStatus::Applied {
                        return Err(DomainError::precondition(
                            "auth is not applied",
                            params([
                                ("externalID", &external_id),
                                ("status", &active_enum_value(&auth_row.status)),
                            ]),
                        ));
                    }
                    let tenant_row = require_active_tenant(tx, &auth_row.tenant_id).await?;

                    let now = Utc::now();
                    registry_db::patch(
                        tx,
                        auth::ActiveModel {
                            external_id: Set(auth_row.external_id.clone()),
                            status: Set(AuthStatus::Removing),
                            updated_at: Set(now),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(DomainError::from)?;

                    let mut snapshot = auth_row;
                    snapshot.status = AuthStatus::Removing;
                    snapshot.updated_at = now;
                    orbital::enqueue(
                        tx,
                        orbital::NewJob {
                            job_type: jobs::REMOVE_AUTH.to_owned(),
                            external_id: snapshot.external_id.clone(),
                            data: jobs::auth_job_data(&snapshot, &tenant_row.region),
                        },
                    )
                    .await
                    .map_err(DomainError::from)?;
                    info!(external_id = %snapshot.external_id, "auth removal submitted");
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, external_id: &str) -> Result<auth::Model> {
        registry_db::find::<auth::Entity, _>(
            &self.db.conn(),
            &CompositeKey::new().eq("external_id", external_id),
        )
        .await
        .map_err(DomainError::from)?
        .ok_or_else(|| DomainError::not_found("auth", params([("externalID", external_id)])))
    }

    #[instrument(skip(self, filter, page))]
    pub async fn list(
        &self,
        filter: &AuthFilter,
        page: &PageRequest,
    ) -> Result<Page<auth::Model>> {
        let mut key = CompositeKey::new();
        if let Some(tenant_id) = &filter.tenant_id {
            key = key.eq("tenant_id", tenant_id.as_str());
        }
        if let Some(status) = &filter.status {
            key = key.eq("status", active_enum_value(status));
        }

        let mut query = ListQuery::new().with_filter(key);
        if let Some(cursor) = decode_cursor(page)? {
            query = query.with_cursor(cursor);
        }
        if let Some(limit) = page.limit {
            query = query.with_limit(limit);
        }
        registry_db::list::<auth::Entity, _>(&self.db.conn(), &query)
            .await
            .map_err(DomainError::from)
    }
}
