//! System and regional-system service.

use std::sync::Arc;

use chrono::Utc;
use registry_db::{CompositeKey, Db, FieldFilter, ListQuery, Page, RepoTx};
use registry_validation::ValidatorRegistry;
use sea_orm::ActiveValue::Set;
use tracing::{info, instrument};

use super::{check_label_map, decode_cursor, merge_labels, remove_labels};
use crate::domain::error::{params, DomainError, Result};
use crate::domain::jobs::active_enum_value;
use crate::domain::model::{labels_to_json, NewSystem, PageRequest, SystemFilter, SystemRef};
use crate::infra::storage::entity::regional_system::{self, RegionalSystemStatus};
use crate::infra::storage::entity::system;
use crate::infra::storage::entity::tenant::{self, TenantStatus};

pub struct SystemService {
    db: Db,
    validators: Arc<ValidatorRegistry>,
}

/// A system row together with its regional projections.
#[derive(Clone, Debug)]
pub struct SystemWithRegions {
    pub system: system::Model,
    pub regions: Vec<regional_system::Model>,
}

impl SystemService {
    pub fn new(db: Db, validators: Arc<ValidatorRegistry>) -> Self {
        Self { db, validators }
    }

    /// Upsert the system row and create one regional row per requested
    /// region. Re-registration with a different tenant is rejected.
    #[instrument(skip(self, new), fields(external_id = %new.external_id, system_type = %new.system_type))]
    pub async fn register(&self, new: NewSystem) -> Result<()> {
        self.validators.validate(&new)?;
        if new.regions.is_empty() {
            return Err(DomainError::invalid_argument(
                "System.Regions",
                params([("externalID", &new.external_id)]),
            ));
        }

        let now = Utc::now();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let key = CompositeKey::new()
                        .eq("external_id", new.external_id.as_str())
                        .eq("type", new.system_type.as_str());
                    match registry_db::find::<system::Entity, _>(tx, &key)
                        .await
                        .map_err(DomainError::from)?
                    {
                        Some(existing) => {
                            if let Some(requested) = &new.tenant_id {
                                if existing.tenant_id.as_deref() != Some(requested.as_str()) {
                                    return Err(DomainError::invalid_argument(
                                        "system already registered with a different tenant",
                                        params([
                                            ("externalID", &new.external_id),
                                            ("type", &new.system_type),
                                        ]),
                                    ));
                                }
                            }
                        }
                        None => {
                            registry_db::create(
                                tx,
                                system::ActiveModel {
                                    external_id: Set(new.external_id.clone()),
                                    system_type: Set(new.system_type.clone()),
                                    tenant_id: Set(new.tenant_id.clone()),
                                    labels: Set(labels_to_json(&new.labels)),
                                    created_at: Set(now),
                                    updated_at: Set(now),
                                },
                            )
                            .await
                            .map_err(DomainError::from)?;
                        }
                    }

                    for seed in &new.regions {
                        let regional_key = CompositeKey::new()
                            .eq("external_id", new.external_id.as_str())
                            .eq("type", new.system_type.as_str())
                            .eq("region", seed.region.as_str());
                        let exists = registry_db::find::<regional_system::Entity, _>(
                            tx,
                            &regional_key,
                        )
                        .await
                        .map_err(DomainError::from)?
                        .is_some();
                        if exists {
                            continue;
                        }
                        registry_db::create(
                            tx,
                            regional_system::ActiveModel {
                                external_id: Set(new.external_id.clone()),
                                system_type: Set(new.system_type.clone()),
                                region: Set(seed.region.clone()),
                                l2_key_id: Set(seed.l2_key_id.clone()),
                                has_l1_key_claim: Set(false),
                                status: Set(RegionalSystemStatus::Available),
                                created_at: Set(now),
                                updated_at: Set(now),
                            },
                        )
                        .await
                        .map_err(DomainError::from)?;
                    }
                    info!(external_id = %new.external_id, "system registered");
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, reference: &SystemRef) -> Result<SystemWithRegions> {
        let conn = self.db.conn();
        let Some(system_type) =
            resolve_type(&conn, &reference.external_id, reference.system_type.clone()).await?
        else {
            return Err(DomainError::not_found(
                "system",
                params([("externalID", &reference.external_id)]),
            ));
        };
        let Some(system) = registry_db::find::<system::Entity, _>(
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
        let regions = regional_rows(&conn, &system.external_id, &system.system_type).await?;
        Ok(SystemWithRegions { system, regions })
    }

    /// Delete one regional system; the parent row goes with the last region.
    /// A missing target is silent success, a type-less ambiguous lookup is
    /// `TooManyTypes`.
    #[instrument(skip(self))]
    pub async fn delete(&self, reference: &SystemRef, region: &str) -> Result<()> {
        let reference = reference.clone();
        let region = region.to_owned();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let Some(system_type) =
                        resolve_type(tx, &reference.external_id, reference.system_type.clone())
                            .await?
                    else {
                        return Ok(());
                    };
                    let regional_key = CompositeKey::new()
                        .eq("external_id", reference.external_id.as_str())
                        .eq("type", system_type.as_str())
                        .eq("region", region.as_str());
                    let Some(regional) =
                        registry_db::find::<regional_system::Entity, _>(tx, &regional_key)
                            .await
                            .map_err(DomainError::from)?
                    else {
                        return Ok(());
                    };

                    if regional.status != RegionalSystemStatus::Available {
                        return Err(DomainError::precondition(
                            "regional system is not available",
                            params([
                                ("externalID", &reference.external_id),
                                ("type", &system_type),
                                ("region", &region),
                                ("status", &active_enum_value(&regional.status)),
                            ]),
                        ));
                    }
                    let system_key = CompositeKey::new()
                        .eq("external_id", reference.external_id.as_str())
                        .eq("type", system_type.as_str());
                    let Some(system_row) = registry_db::find::<system::Entity, _>(tx, &system_key)
                        .await
                        .map_err(DomainError::from)?
                    else {
                        return Ok(());
                    };
                    if system_row.tenant_id.is_some() {
                        return Err(DomainError::precondition(
                            "system is assigned to a tenant",
                            params([
                                ("externalID", &reference.external_id),
                                ("type", &system_type),
                            ]),
                        ));
                    }

                    registry_db::delete::<regional_system::Entity, _>(tx, &regional_key)
                        .await
                        .map_err(DomainError::from)?;

                    let remaining = regional_rows(tx, &reference.external_id, &system_type).await?;
                    if remaining.is_empty() {
                        registry_db::delete::<system::Entity, _>(tx, &system_key)
                            .await
                            .map_err(DomainError::from)?;
                    }
                    info!(external_id = %reference.external_id, region = %region, "regional system deleted");
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }

    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        reference: &SystemRef,
        region: &str,
        status: RegionalSystemStatus,
    ) -> Result<()> {
        let reference = reference.clone();
        let region = region.to_owned();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let (system_type, regional) =
                        require_regional(tx, &reference, &region).await?;
                    registry_db::patch(
                        tx,
                        regional_system::ActiveModel {
                            external_id: Set(regional.external_id),
                            system_type: Set(system_type),
                            region: Set(regional.region),
                            status: Set(status),
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

    /// Flip the regional L1 key claim. Requires the system linked to the
    /// given tenant, the regional row `AVAILABLE` and an actual change.
    #[instrument(skip(self))]
    pub async fn update_l1_key_claim(
        &self,
        reference: &SystemRef,
        region: &str,
        tenant_id: &str,
        claim: bool,
    ) -> Result<()> {
        let reference = reference.clone();
        let region = region.to_owned();
        let tenant_id = tenant_id.to_owned();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let (system_type, regional) =
                        require_regional(tx, &reference, &region).await?;
                    let system_row = registry_db::find::<system::Entity, _>(
                        tx,
                        &CompositeKey::new()
                            .eq("external_id", reference.external_id.as_str())
                            .eq("type", system_type.as_str()),
                    )
                    .await
                    .map_err(DomainError::from)?;
                    if system_row.and_then(|s| s.tenant_id).as_deref() != Some(tenant_id.as_str()) {
                        return Err(DomainError::precondition(
                            "system is not linked to the tenant",
                            params([
                                ("externalID", &reference.external_id),
                                ("type", &system_type),
                                ("tenantID", &tenant_id),
                            ]),
                        ));
                    }
                    if regional.status != RegionalSystemStatus::Available {
                        return Err(DomainError::precondition(
                            "regional system is not available",
                            params([
                                ("externalID", &reference.external_id),
                                ("region", &region),
                                ("status", &active_enum_value(&regional.status)),
                            ]),
                        ));
                    }
                    if regional.has_l1_key_claim == claim {
                        return Err(DomainError::precondition(
                            "l1 key claim already has the requested value",
                            params([
                                ("externalID", &reference.external_id),
                                ("region", &region),
                            ]),
                        ));
                    }

                    registry_db::patch(
                        tx,
                        regional_system::ActiveModel {
                            external_id: Set(regional.external_id),
                            system_type: Set(system_type),
                            region: Set(regional.region),
                            has_l1_key_claim: Set(claim),
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

    #[instrument(skip(self, filter, page))]
    pub async fn list(
        &self,
        filter: &SystemFilter,
        page: &PageRequest,
    ) -> Result<Page<SystemWithRegions>> {
        let conn = self.db.conn();
        // A region constraint lives on the regional rows; fold it into the
        // external-id set before filtering the parents.
        let mut id_filter = filter.external_ids.clone();
        if let Some(region) = &filter.region {
            let regional = registry_db::list::<regional_system::Entity, _>(
                &conn,
                &ListQuery::new()
                    .with_filter(CompositeKey::new().eq("region", region.as_str()))
                    .with_limit(registry_db::MAX_LIMIT),
            )
            .await
            .map_err(DomainError::from)?
            .items;
            let in_region: std::collections::HashSet<String> =
                regional.into_iter().map(|r| r.external_id).collect();
            if id_filter.is_empty() {
                id_filter = in_region.into_iter().collect();
            } else {
                id_filter.retain(|id| in_region.contains(id));
            }
            if id_filter.is_empty() {
                return Ok(Page {
                    items: Vec::new(),
                    next_cursor: None,
                });
            }
        }

        let mut key = CompositeKey::new();
        if !id_filter.is_empty() {
            key = key.field(
                "external_id",
                FieldFilter::In(id_filter.iter().map(|id| id.as_str().into()).collect()),
            );
        }
        if let Some(tenant_id) = &filter.tenant_id {
            key = key.eq("tenant_id", tenant_id.as_str());
        }

        let mut query = ListQuery::new().with_filter(key);
        if let Some(cursor) = decode_cursor(page)? {
            query = query.with_cursor(cursor);
        }
        if let Some(limit) = page.limit {
            query = query.with_limit(limit);
        }
        let page = registry_db::list::<system::Entity, _>(&conn, &query)
            .await
            .map_err(DomainError::from)?;

        let mut items = Vec::with_capacity(page.items.len());
        for system_row in page.items {
            let regions =
                regional_rows(&conn, &system_row.external_id, &system_row.system_type).await?;
            items.push(SystemWithRegions {
                system: system_row,
                regions,
            });
        }
        Ok(Page {
            items,
            next_cursor: page.next_cursor,
        })
    }

    /// Link all listed systems to the tenant, atomically: any precondition
    /// failure rolls the whole call back.
    #[instrument(skip(self, references))]
    pub async fn link_to_tenant(&self, references: Vec<SystemRef>, tenant_id: &str) -> Result<()> {
        let tenant_id = tenant_id.to_owned();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    require_active_tenant(tx, &tenant_id).await?;
                    for reference in &references {
                        link_one(tx, reference, &tenant_id, true).await?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }

    /// Unlink all listed systems from the tenant, atomically. Shares the
    /// link preconditions: the tenant must exist and be active.
    #[instrument(skip(self, references))]
    pub async fn unlink_from_tenant(
        &self,
        references: Vec<SystemRef>,
        tenant_id: &str,
    ) -> Result<()> {
        let tenant_id = tenant_id.to_owned();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    require_active_tenant(tx, &tenant_id).await?;
                    for reference in &references {
                        link_one(tx, reference, &tenant_id, false).await?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(DomainError::from)
    }

    #[instrument(skip(self, labels))]
    pub async fn set_labels(
        &self,
        reference: &SystemRef,
        labels: std::collections::HashMap<String, String>,
    ) -> Result<()> {
        check_label_map("System.Labels", &labels)?;
        let reference = reference.clone();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let (system_type, system_row) = require_system(tx, &reference).await?;
                    registry_db::patch(
                        tx,
                        system::ActiveModel {
                            external_id: Set(system_row.external_id),
                            system_type: Set(system_type),
                            labels: Set(merge_labels(system_row.labels.as_ref(), &labels)),
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
    pub async fn remove_labels(&self, reference: &SystemRef, keys: Vec<String>) -> Result<()> {
        let reference = reference.clone();
        self.db
            .transaction::<_, DomainError, _>(|tx| {
                Box::pin(async move {
                    let (system_type, system_row) = require_system(tx, &reference).await?;
                    registry_db::patch(
                        tx,
                        system::ActiveModel {
                            external_id: Set(system_row.external_id),
                            system_type: Set(system_type),
                            labels: Set(remove_labels(system_row.labels.as_ref(), &keys)),
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

/// Resolve the system type of a type-less reference. `Ok(None)` means no
/// system matches the external id at all.
pub(crate) async fn resolve_type<R: registry_db::Runner>(
    runner: &R,
    external_id: &str,
    explicit: Option<String>,
) -> Result<Option<String>> {
    if let Some(explicit) = explicit {
        if !explicit.is_empty() {
            return Ok(Some(explicit));
        }
    }
    let matches = registry_db::list::<system::Entity, _>(
        runner,
        &ListQuery::new()
            .with_filter(CompositeKey::new().eq("external_id", external_id))
            .with_limit(2),
    )
    .await
    .map_err(DomainError::from)?
    .items;
    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches[0].system_type.clone())),
        _ => Err(DomainError::TooManyTypes(external_id.to_owned())),
    }
}

pub(crate) async fn regional_rows<R: registry_db::Runner>(
    runner: &R,
    external_id: &str,
    system_type: &str,
) -> Result<Vec<regional_system::Model>> {
    Ok(registry_db::list::<regional_system::Entity, _>(
        runner,
        &ListQuery::new()
            .with_filter(
                CompositeKey::new()
                    .eq("external_id", external_id)
                    .eq("type", system_type),
            )
            .with_limit(registry_db::MAX_LIMIT),
    )
    .await
    .map_err(DomainError::from)?
    .items)
}

pub(crate) async fn require_active_tenant(tx: &RepoTx<'_>, tenant_id: &str) -> Result<tenant::Model> {
    let Some(tenant_row) = registry_db::find::<tenant::Entity, _>(
        tx,
        &CompositeKey::new().eq("id", tenant_id),
    )
    .await
    .map_err(DomainError::from)?
    else {
        return Err(DomainError::not_found("tenant", params([("id", tenant_id)])));
    };
    if tenant_row.status != TenantStatus::Active {
        return Err(DomainError::precondition(
            "tenant is not active",
            params([
                ("id", tenant_id),
                ("status", &active_enum_value(&tenant_row.status)),
            ]),
        ));
    }
    Ok(tenant_row)
}

async fn require_system(
    tx: &RepoTx<'_>,
    reference: &SystemRef,
) -> Result<(String, system::Model)> {
    let Some(system_type) =
        resolve_type(tx, &reference.external_id, reference.system_type.clone()).await?
    else {
        return Err(DomainError::not_found(
            "system",
            params([("externalID", &reference.external_id)]),
        ));
    };
    let Some(system_row) = registry_db::find::<system::Entity, _>(
        tx,
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
    // Label and lookup operations require a regional projection to exist.
    if regional_rows(tx, &reference.external_id, &system_type).await?.is_empty() {
        return Err(DomainError::not_found(
            "regional system",
            params([
                ("externalID", &reference.external_id),
                ("type", &system_type),
            ]),
        ));
    }
    Ok((system_type, system_row))
}

async fn require_regional(
    tx: &RepoTx<'_>,
    reference: &SystemRef,
    region: &str,
) -> Result<(String, regional_system::Model)> {
    let Some(system_type) =
        resolve_type(tx, &reference.external_id, reference.system_type.clone()).await?
    else {
        return Err(DomainError::not_found(
            "system",
            params([("externalID", &reference.external_id)]),
        ));
    };
    let Some(regional) = registry_db::find::<regional_system::Entity, _>(
        tx,
        &CompositeKey::new()
            .eq("external_id", reference.external_id.as_str())
            .eq("type", system_type.as_str())
            .eq("region", region),
    )
    .await
    .map_err(DomainError::from)?
    else {
        return Err(DomainError::not_found(
            "regional system",
            params([
                ("externalID", &reference.external_id),
                ("type", &system_type),
                ("region", region),
            ]),
        ));
    };
    Ok((system_type, regional))
}

/// Link or unlink one system, enforcing the shared preconditions. Runs
/// inside the caller's transaction so a failure rolls back every sibling.
pub(crate) async fn link_one(
    tx: &RepoTx<'_>,
    reference: &SystemRef,
    tenant_id: &str,
    link: bool,
) -> Result<()> {
    let Some(system_type) =
        resolve_type(tx, &reference.external_id, reference.system_type.clone()).await?
    else {
        return Err(DomainError::not_found(
            "system",
            params([("externalID", &reference.external_id)]),
        ));
    };
    let Some(system_row) = registry_db::find::<system::Entity, _>(
        tx,
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

    if link {
        if system_row.tenant_id.is_some() {
            return Err(DomainError::precondition(
                "system is already linked",
                params([
                    ("externalID", &reference.external_id),
                    ("type", &system_type),
                ]),
            ));
        }
    } else if system_row.tenant_id.as_deref() != Some(tenant_id) {
        return Err(DomainError::precondition(
            "system is not linked to the tenant",
            params([
                ("externalID", &reference.external_id),
                ("type", &system_type),
                ("tenantID", tenant_id),
            ]),
        ));
    }

    // An active L1 key claim pins the link in both directions.
    for regional in regional_rows(tx, &reference.external_id, &system_type).await? {
        if regional.has_l1_key_claim {
            return Err(DomainError::precondition(
                "regional system holds an l1 key claim",
                params([
                    ("externalID", &regional.external_id),
                    ("type", &regional.system_type),
                    ("region", &regional.region),
                ]),
            ));
        }
    }

    registry_db::patch(
        tx,
        system::ActiveModel {
            external_id: Set(system_row.external_id),
            system_type: Set(system_type),
            tenant_id: Set(if link { Some(tenant_id.to_owned()) } else { None }),
            updated_at: Set(Utc::now()),
            ..Default::default()
        },
    )
    .await
    .map_err(DomainError::from)?;
    Ok(())
}
