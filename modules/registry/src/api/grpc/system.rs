//! SystemService transport.

use std::sync::Arc;

use registry_grpc::v1;
use tonic::{Request, Response, Status};

use super::{error::to_status, opt};
use crate::domain::model::{NewSystem, PageRequest, RegionSeed, SystemFilter, SystemRef};
use crate::domain::service::SystemService;
use crate::domain::snapshot::{regional_status_from_proto, system_to_proto};
use crate::metrics::ApiMetrics;

pub struct SystemApi {
    service: Arc<SystemService>,
    metrics: ApiMetrics,
}

impl SystemApi {
    pub fn new(service: Arc<SystemService>, metrics: ApiMetrics) -> Self {
        Self { service, metrics }
    }

    fn done<T>(
        &self,
        operation: &str,
        result: Result<T, crate::domain::error::DomainError>,
    ) -> Result<T, Status> {
        self.metrics.observe(operation, result.is_ok());
        result.map_err(to_status)
    }
}

fn system_ref(external_id: String, system_type: String) -> SystemRef {
    SystemRef {
        external_id,
        system_type: opt(system_type),
    }
}

#[tonic::async_trait]
impl registry_grpc::SystemService for SystemApi {
    async fn register_system(
        &self,
        request: Request<v1::RegisterSystemRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        let new = NewSystem {
            external_id: req.external_id,
            system_type: req.r#type,
            tenant_id: opt(req.tenant_id),
            labels: req.labels,
            regions: req
                .regions
                .into_iter()
                .map(|seed| RegionSeed {
                    region: seed.region,
                    l2_key_id: seed.l2_key_id,
                })
                .collect(),
        };
        self.done("RegisterSystem", self.service.register(new).await)?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn get_system(
        &self,
        request: Request<v1::GetSystemRequest>,
    ) -> Result<Response<v1::GetSystemResponse>, Status> {
        let req = request.into_inner();
        let found = self.done(
            "GetSystem",
            self.service.get(&system_ref(req.external_id, req.r#type)).await,
        )?;
        Ok(Response::new(v1::GetSystemResponse {
            system: Some(system_to_proto(&found.system, &found.regions)),
        }))
    }

    async fn delete_system(
        &self,
        request: Request<v1::DeleteSystemRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        self.done(
            "DeleteSystem",
            self.service
                .delete(&system_ref(req.external_id, req.r#type), &req.region)
                .await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn update_system_status(
        &self,
        request: Request<v1::UpdateSystemStatusRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        let Some(status) = regional_status_from_proto(req.status()) else {
            return Err(Status::invalid_argument("System.Status value=unspecified"));
        };
        self.done(
            "UpdateSystemStatus",
            self.service
                .update_status(&system_ref(req.external_id, req.r#type), &req.region, status)
                .await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn update_system_l1_key_claim(
        &self,
        request: Request<v1::UpdateSystemL1KeyClaimRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        self.done(
            "UpdateSystemL1KeyClaim",
            self.service
                .update_l1_key_claim(
                    &system_ref(req.external_id, req.r#type),
                    &req.region,
                    &req.tenant_id,
                    req.has_l1_key_claim,
                )
                .await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn list_systems(
        &self,
        request: Request<v1::ListSystemsRequest>,
    ) -> Result<Response<v1::ListSystemsResponse>, Status> {
        let req = request.into_inner();
        let filter = SystemFilter {
            external_ids: req.external_ids,
            tenant_id: opt(req.tenant_id),
            region: opt(req.region),
        };
        let page = PageRequest {
            limit: (req.limit > 0).then(|| u64::from(req.limit)),
            page_token: opt(req.page_token),
        };
        let result = self.done("ListSystems", self.service.list(&filter, &page).await)?;
        Ok(Response::new(v1::ListSystemsResponse {
            systems: result
                .items
                .iter()
                .map(|s| system_to_proto(&s.system, &s.regions))
                .collect(),
            next_page_token: result.next_cursor.unwrap_or_default(),
        }))
    }

    async fn link_systems_to_tenant(
        &self,
        request: Request<v1::LinkSystemsToTenantRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        let refs = req
            .systems
            .into_iter()
            .map(|s| system_ref(s.external_id, s.r#type))
            .collect();
        self.done(
            "LinkSystemsToTenant",
            self.service.link_to_tenant(refs, &req.tenant_id).await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn unlink_systems_from_tenant(
        &self,
        request: Request<v1::UnlinkSystemsFromTenantRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        let refs = req
            .systems
            .into_iter()
            .map(|s| system_ref(s.external_id, s.r#type))
            .collect();
        self.done(
            "UnlinkSystemsFromTenant",
            self.service.unlink_from_tenant(refs, &req.tenant_id).await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn set_system_labels(
        &self,
        request: Request<v1::SetSystemLabelsRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        self.done(
            "SetSystemLabels",
            self.service
                .set_labels(&system_ref(req.external_id, req.r#type), req.labels)
                .await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn remove_system_labels(
        &self,
        request: Request<v1::RemoveSystemLabelsRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        self.done(
            "RemoveSystemLabels",
            self.service
                .remove_labels(&system_ref(req.external_id, req.r#type), req.keys)
                .await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }
}
