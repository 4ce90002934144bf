//! Tenant lifecycle service.

use std::sync::Arc;

use chrono::Utc;
use registry_db::{CompositeKey, Db, FieldFilter, ListQuery, Page};
use registry_validation::ValidatorRegistry;
use sea_orm::ActiveValue::Set;
use tracing::{info, instrument};

use super::{check_label_map, decode_cursor, merge_labels, remove_labels, StatusProjector, TenantTransition};
use crate::domain::error::{params, DomainError, Params, Result};
use crate::domain::jobs::{self, active_enum_value};
use crate::domain::model::{
    groups_to_json, labels_to_json, NewTenant, PageRequest, TenantFilter,
};
use crate::domain::validation::UserGroupsPatch;
use crate::infra::storage::entity::tenant::{self, TenantStatus};

pub struct TenantService {
    db: Db,
    validators: Arc<ValidatorRegistry>,
    projector: Arc<dyn StatusProjector>,
}

impl TenantService {
    pub fn new(
        db: Db,
        validators: Arc<ValidatorRegistry>,
        projector: Arc<dyn StatusProjector>,
    ) -> Self {
        Self {
            db,
            validators,
            projector,
        }
    }

    /// Register a tenant and submit its provisioning job.
    ///
    /// Allowed from absence or `PROVISIONING_ERROR`; any other existing state
    /// is `AlreadyExists`.
    #[instrument(skip(self, new), fields(tenant_id = %new.id))]
    pub async fn register(&self, new: NewTenant) -> Result<()> {
        self.validators.validate(&new)?;
        let Some(role) = new.role.clone() else {
            return Err(DomainError::invalid_argument("Tenant.Role", Params::new()));
        };

        let now = Utc::now();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let existing = registry_db::find::<tenant::Entity, _>(
                        tx,
                        &CompositeKey::new().eq("id", new.id.as_str()),
                    )
                    .await
                    .map_err(DomainError::from)?;

                    let model = match existing {
                        Some(t) if t.status != TenantStatus::ProvisioningError => {
                            return Err(DomainError::AlreadyExists(format!(
                                "tenant id={}",
                                t.id
                            )));
                        }
                        Some(t) => {
                            // Retry after a failed provisioning run: take the
                            // new attributes, restart the lifecycle.
                            let model = tenant::Model {
                                id: t.id,
                                name: new.name.clone(),
                                region: new.region.clone(),
                                owner_id: new.owner_id.clone(),
                                owner_type: new.owner_type.clone(),
                                role,
                                status: TenantStatus::Provisioning,
                                labels: labels_to_json(&new.labels),
                                user_groups: groups_to_json(&new.user_groups),
                                created_at: t.created_at,
                                updated_at: now,
                            };
                            registry_db::patch(
                                tx,
                                tenant::ActiveModel {
                                    id: Set(model.id.clone()),
                                    name: Set(model.name.clone()),
                                    region: Set(model.region.clone()),
                                    owner_id: Set(model.owner_id.clone()),
                                    owner_type: Set(model.owner_type.clone()),
                                    role: Set(model.role.clone()),
                                    status: Set(model.status.clone()),
                                    labels: Set(model.labels.clone()),
                                    user_groups: Set(model.user_groups.clone()),
                                    updated_at: Set(now),
                                    ..Default::default()
                                },
                            )
                            .await
                            .map_err(DomainError::from)?;
                            model
                        }
                        None => {
                            let model = tenant::Model {
                                id: new.id.clone(),
                                name: new.name.clone(),
                                region: new.region.clone(),
                                owner_id: new.owner_id.clone(),
                                owner_type: new.owner_type.clone(),
                                role,
                                status: TenantStatus::Provisioning,
                                labels: labels_to_json(&new.labels),
                                user_groups: groups_to_json(&new.user_groups),
                                created_at: now,
                                updated_at: now,
                            };
                            registry_db::create(
                                tx,
                                tenant::ActiveModel {
                                    id: Set(model.id.clone()),
                                    name: Set(model.name.clone()),
                                    region: Set(model.region.clone()),
                                    owner_id: Set(model.owner_id.clone()),
                                    owner_type: Set(model.owner_type.clone()),
                                    role: Set(model.role.clone()),
                                    status: Set(model.status.clone()),
                                    labels: Set(model.labels.clone()),
                                    user_groups: Set(model.user_groups.clone()),
                                    created_at: Set(now),
                                    updated_at: Set(now),
                                },
                            )
                            .await
                            .map_err(DomainError::from)?;
                            model
                        }
                    };

                    orbital::enqueue(
                        tx,
                        orbital::NewJob {
                            job_type: jobs::PROVISION_TENANT.to_owned(),
                            external_id: model.id.clone(),
                            data: jobs::tenant_job_data(&model),
                        },
                    )
                    .await
                    .map_err(DomainError::from)?;
                    info!(tenant_id = %model.id, "tenant provisioning submitted");
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<tenant::Model> {
        registry_db::find::<tenant::Entity, _>(
            &self.db.conn(),
            &CompositeKey::new().eq("id", id),
        )
        .await
        .map_err(DomainError::from)?
        .ok_or_else(|| DomainError::not_found("tenant", params([("id", id)])))
    }

    #[instrument(skip(self, filter, page))]
    pub async fn list(
        &self,
        filter: &TenantFilter,
        page: &PageRequest,
    ) -> Result<Page<tenant::Model>> {
        let mut key = CompositeKey::new();
        if !filter.ids.is_empty() {
            key = key.field(
                "id",
                FieldFilter::In(filter.ids.iter().map(|id| id.as_str().into()).collect()),
            );
        }
        if let Some(region) = &filter.region {
            key = key.eq("region", region.as_str());
        }
        if let Some(status) = &filter.status {
            key = key.eq("status", active_enum_value(status));
        }
        if !filter.labels.is_empty() {
            key = key.field(
                "labels",
                FieldFilter::Json(filter.labels.clone().into_iter().collect()),
            );
        }

        let mut query = ListQuery::new().with_filter(key);
        if let Some(cursor) = decode_cursor(page)? {
            query = query.with_cursor(cursor);
        }
        if let Some(limit) = page.limit {
            query = query.with_limit(limit);
        }
        registry_db::list::<tenant::Entity, _>(&self.db.conn(), &query)
            .await
            .map_err(DomainError::from)
    }

    /// ACTIVE → BLOCKING, auths → AUTH_BLOCKING, submits the block job.
    #[instrument(skip(self))]
    pub async fn block(&self, id: &str) -> Result<()> {
        self.transition(
            id,
            TenantStatus::Active,
            TenantStatus::Blocking,
            Some(TenantTransition::Block),
            jobs::BLOCK_TENANT,
        )
        .await
    }

    /// BLOCKED → UNBLOCKING, auths → AUTH_UNBLOCKING.
    #[instrument(skip(self))]
    pub async fn unblock(&self, id: &str) -> Result<()> {
        self.transition(
            id,
            TenantStatus::Blocked,
            TenantStatus::Unblocking,
            Some(TenantTransition::Unblock),
            jobs::UNBLOCK_TENANT,
        )
        .await
    }

    /// BLOCKED → TERMINATING, auths → AUTH_REMOVING.
    #[instrument(skip(self))]
    pub async fn terminate(&self, id: &str) -> Result<()> {
        self.transition(
            id,
            TenantStatus::Blocked,
            TenantStatus::Terminating,
            Some(TenantTransition::Terminate),
            jobs::TERMINATE_TENANT,
        )
        .await
    }

    async fn transition(
        &self,
        id: &str,
        expected: TenantStatus,
        to: TenantStatus,
        transition: Option<TenantTransition>,
        job_type: &'static str,
    ) -> Result<()> {
        let id = id.to_owned();
        let projector = Arc::clone(&self.projector);
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let Some(current) = registry_db::find::<tenant::Entity, _>(
                        tx,
                        &CompositeKey::new().eq("id", id.as_str()),
                    )
                    .await
                    .map_err(DomainError::from)?
                    else {
                        return Err(DomainError::not_found("tenant", params([("id", &id)])));
                    };
                    if current.status != expected {
                        return Err(DomainError::precondition(
                            "tenant status does not allow this transition",
                            params([
                                ("id", id.as_str()),
                                ("status", &active_enum_value(&current.status)),
                                ("operation", job_type),
                            ]),
                        ));
                    }

                    if let Some(transition) = transition {
                        projector.project(tx, &id, transition).await?;
                    }

                    let now = Utc::now();
                    registry_db::patch(
                        tx,
                        tenant::ActiveModel {
                            id: Set(id.clone()),
                            status: Set(to.clone()),
                            updated_at: Set(now),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(DomainError::from)?;

                    let mut snapshot = current;
                    snapshot.status = to;
                    snapshot.updated_at = now;
                    orbital::enqueue(
                        tx,
                        orbital::NewJob {
                            job_type: job_type.to_owned(),
                            external_id: id.clone(),
                            data: jobs::tenant_job_data(&snapshot),
                        },
                    )
                    .await
                    .map_err(DomainError::from)?;
                    info!(tenant_id = %id, job_type, "tenant transition submitted");
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }

    #[instrument(skip(self, labels))]
    pub async fn set_labels(
        &self,
        id: &str,
        labels: std::collections::HashMap<String, String>,
    ) -> Result<()> {
        check_label_map("Tenant.Labels", &labels)?;
        let id = id.to_owned();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let Some(current) = registry_db::find::<tenant::Entity, _>(
                        tx,
                        &CompositeKey::new().eq("id", id.as_str()),
                    )
                    .await
                    .map_err(DomainError::from)?
                    else {
                        return Err(DomainError::not_found("tenant", params([("id", &id)])));
                    };
                    registry_db::patch(
                        tx,
                        tenant::ActiveModel {
                            id: Set(id),
                            labels: Set(merge_labels(current.labels.as_ref(), &labels)),
                            updated_at: Set(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(DomainError::from)?;
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }

    #[instrument(skip(self, keys))]
    pub async fn remove_labels(&self, id: &str, keys: Vec<String>) -> Result<()> {
        let id = id.to_owned();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let Some(current) = registry_db::find::<tenant::Entity, _>(
                        tx,
                        &CompositeKey::new().eq("id", id.as_str()),
                    )
                    .await
                    .map_err(DomainError::from)?
                    else {
                        return Err(DomainError::not_found("tenant", params([("id", &id)])));
                    };
                    registry_db::patch(
                        tx,
                        tenant::ActiveModel {
                            id: Set(id),
                            labels: Set(remove_labels(current.labels.as_ref(), &keys)),
                            updated_at: Set(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(DomainError::from)?;
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }

    #[instrument(skip(self, user_groups))]
    pub async fn set_user_groups(&self, id: &str, user_groups: Vec<String>) -> Result<()> {
        self.validators.validate(&UserGroupsPatch(&user_groups))?;
        let id = id.to_owned();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let exists = registry_db::find::<tenant::Entity, _>(
                        tx,
                        &CompositeKey::new().eq("id", id.as_str()),
                    )
                    .await
                    .map_err(DomainError::from)?
                    .is_some();
                    if !exists {
                        return Err(DomainError::not_found("tenant", params([("id", &id)])));
                    }
                    registry_db::patch(
                        tx,
                        tenant::ActiveModel {
                            id: Set(id),
                            user_groups: Set(groups_to_json(&user_groups)),
                            updated_at: Set(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(DomainError::from)?;
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }
}
