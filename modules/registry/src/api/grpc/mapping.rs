//! MappingService transport.

use std::sync::Arc;

use registry_grpc::v1;
use tonic::{Request, Response, Status};

use super::{error::to_status, opt};
use crate::domain::model::SystemRef;
use crate::domain::service::MappingService;
use crate::metrics::ApiMetrics;

pub struct MappingApi {
    service: Arc<MappingService>,
    metrics: ApiMetrics,
}

impl MappingApi {
    pub fn new(service: Arc<MappingService>, metrics: ApiMetrics) -> Self {
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

#[tonic::async_trait]
impl registry_grpc::MappingService for MappingApi {
    async fn map_system_to_tenant(
        &self,
        request: Request<v1::MapSystemToTenantRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        let reference = SystemRef {
            external_id: req.external_id,
            system_type: opt(req.r#type),
        };
        self.done(
            "MapSystemToTenant",
            self.service.map(&reference, &req.tenant_id).await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn unmap_system_from_tenant(
        &self,
        request: Request<v1::UnmapSystemFromTenantRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        let reference = SystemRef {
            external_id: req.external_id,
            system_type: opt(req.r#type),
        };
        self.done(
            "UnmapSystemFromTenant",
            self.service.unmap(&reference, &req.tenant_id).await,
        )?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn get(
        &self,
        request: Request<v1::GetMappingRequest>,
    ) -> Result<Response<v1::GetMappingResponse>, Status> {
        let req = request.into_inner();
        let reference = SystemRef {
            external_id: req.external_id,
            system_type: opt(req.r#type),
        };
        let mapping = self.done("GetMapping", self.service.get(&reference).await)?;
        Ok(Response::new(v1::GetMappingResponse {
            external_id: mapping.external_id,
            r#type: mapping.system_type,
            tenant_id: mapping.tenant_id.unwrap_or_default(),
        }))
    }
}
