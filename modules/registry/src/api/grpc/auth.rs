//! AuthService transport.

use std::sync::Arc;

use registry_grpc::v1;
use tonic::{Request, Response, Status};

use super::{error::to_status, opt};
use crate::domain::model::{AuthFilter, NewAuth, PageRequest};
use crate::domain::service::AuthService;
use crate::domain::snapshot::{auth_status_from_proto, auth_to_proto};
use crate::metrics::ApiMetrics;

pub struct AuthApi {
    service: Arc<AuthService>,
    metrics: ApiMetrics,
}

impl AuthApi {
    pub fn new(service: Arc<AuthService>, metrics: ApiMetrics) -> Self {
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
impl registry_grpc::AuthService for AuthApi {
    async fn apply_auth(
        &self,
        request: Request<v1::ApplyAuthRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        let new = NewAuth {
            external_id: req.external_id,
            tenant_id: req.tenant_id,
            auth_type: req.r#type,
            properties: req.properties,
        };
        self.done("ApplyAuth", self.service.apply(new).await)?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn get_auth(
        &self,
        request: Request<v1::GetAuthRequest>,
    ) -> Result<Response<v1::GetAuthResponse>, Status> {
        let req = request.into_inner();
        let auth = self.done("GetAuth", self.service.get(&req.external_id).await)?;
        Ok(Response::new(v1::GetAuthResponse {
            auth: Some(auth_to_proto(&auth)),
        }))
    }

    async fn remove_auth(
        &self,
        request: Request<v1::RemoveAuthRequest>,
    ) -> Result<Response<v1::MutationResponse>, Status> {
        let req = request.into_inner();
        self.done("RemoveAuth", self.service.remove(&req.external_id).await)?;
        Ok(Response::new(v1::MutationResponse { success: true }))
    }

    async fn list_auths(
        &self,
        request: Request<v1::ListAuthsRequest>,
    ) -> Result<Response<v1::ListAuthsResponse>, Status> {
        let req = request.into_inner();
        let status = auth_status_from_proto(req.status());
        let filter = AuthFilter {
            tenant_id: opt(req.tenant_id),
            status,
        };
        let page = PageRequest {
            limit: (req.limit > 0).then(|| u64::from(req.limit)),
            page_token: opt(req.page_token),
        };
        let result = self.done("ListAuths", self.service.list(&filter, &page).await)?;
        Ok(Response::new(v1::ListAuthsResponse {
            auths: result.items.iter().map(auth_to_proto).collect(),
            next_page_token: result.next_cursor.unwrap_or_default(),
        }))
    }
}
