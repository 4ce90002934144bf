//! TenantService transport.

use std::sync::Arc;

use registry_grpc::v1;
use tonic::{Request, Response, Status};

use super::{error::to_status, opt};
use crate::domain::model::{NewTenant, PageRequest, TenantFilter};
use crate::domain::service::TenantService;
use crate::domain::snapshot::{role_from_proto, tenant_status_from_proto, tenant_to_proto};
use crate::metrics::ApiMetrics;

pub struct TenantApi {
    service: Arc<TenantService>,
    metrics: ApiMetrics,
}

impl TenantApi {
    pub fn new(service: Arc<TenantService>, metrics: ApiMetrics) -> Self {
        Self { service, metrics }
    }

    fn done<T>(&self, operation: &str, result: Result<T, crate::domain::error::DomainError>) -> Result<T, Status> {
        self.metrics.observe(operation, result.is_ok());
        result.map_err(to_status)
    }
}

#[tonic::async_trait]
impl registry_grpc::TenantService for TenantApi {
    async fn register_tenant(
        &self,
        request: Request<v1::RegisterTenantRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        let role = role_from_proto(req.role());
        let new = NewTenant {
            id: req.id,
            name: req.name,
            region: req.region,
            owner_id: req.owner_id,
            owner_type: req.owner_type,
            role,
            labels: req.labels,
            user_groups: req.user_groups,
        };
        self.done("RegisterTenant", self.service.register(new).await)?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn get_tenant(
        &self,
        request: Request<v1::GetTenantRequest>,
    ) -> Result<Response<v1::GetTenantResponse>, Status> {
        let req = request.into_inner();
        let tenant = self.done("GetTenant", self.service.get(&req.id).await)?;
        Ok(Response::new(v1::GetTenantResponse {
            tenant: Some(tenant_to_proto(&tenant)),
        }))
    }

    async fn list_tenants(
        &self,
        request: Request<v1::ListTenantsRequest>,
    ) -> Result<Response<v1::ListTenantsResponse>, Status> {
        let req = request.into_inner();
        let status = tenant_status_from_proto(req.status());
        let filter = TenantFilter {
            ids: req.ids,
            region: opt(req.region),
            status,
            labels: req.labels,
        };
        let page = PageRequest {
            limit: (req.limit > 0).then(|| u64::from(req.limit)),
            page_token: opt(req.page_token),
        };
        let result = self.done("ListTenants", self.service.list(&filter, &page).await)?;
        Ok(Response::new(v1::ListTenantsResponse {
            tenants: result.items.iter().map(tenant_to_proto).collect(),
            next_page_token: result.next_cursor.unwrap_or_default(),
        }))
    }

    async fn block_tenant(
        &self,
        request: Request<v1::BlockTenantRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        self.done("BlockTenant", self.service.block(&req.id).await)?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn unblock_tenant(
        &self,
        request: Request<v1::UnblockTenantRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        self.done("UnblockTenant", self.service.unblock(&req.id).await)?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn terminate_tenant(
        &self,
        request: Request<v1::TerminateTenantRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        self.done("TerminateTenant", self.service.terminate(&req.id).await)?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn set_tenant_labels(
        &self,
        request: Request<v1::SetTenantLabelsRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        self.done(
            "SetTenantLabels",
            self.service.set_labels(&req.id, req.labels).await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn remove_tenant_labels(
        &self,
        request: Request<v1::RemoveTenantLabelsRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        self.done(
            "RemoveTenantLabels",
            self.service.remove_labels(&req.id, req.keys).await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn set_tenant_user_groups(
        &self,
        request: Request<v1::SetTenantUserGroupsRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        self.done(
            "SetTenantUserGroups",
            self.service.set_user_groups(&req.id, req.user_groups).await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }
}
