//! Panic-recovery layer for the RPC server.
//!
//! A panicking handler must surface as gRPC `Internal` instead of tearing
//! down the connection. The layer also records the recovered request in the
//! RPC outcome counter: normal outcomes are counted at the handler seam,
//! which a panic never returns to, so without this the counter would miss
//! exactly the requests the recovery exists for.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use http::header::HeaderValue;
use registry::metrics::ApiMetrics;
use tonic::body::Body;
use tower::{Layer, Service};
use tracing::error;

#[derive(Clone)]
pub struct RecoverLayer {
    metrics: ApiMetrics,
}

impl RecoverLayer {
    pub fn new(metrics: ApiMetrics) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for RecoverLayer {
    type Service = Recover<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Recover {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Recover<S> {
    inner: S,
    metrics: ApiMetrics,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for Recover<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<Body>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future {
        // "/kcmregistry.v1.TenantService/BlockTenant" -> "BlockTenant"
        let operation = request
            .uri()
            .path()
            .rsplit('/')
            .next()
            .unwrap_or("unknown")
            .to_owned();
        let metrics = self.metrics.clone();
        let future = self.inner.call(request);
        Box::pin(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(ToString::to_string)
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_owned());
                    error!(operation = %operation, panic = %message, "request handler panicked");
                    metrics.observe(&operation, false);
                    Ok(internal_response())
                }
            }
        })
    }
}

/// Trailers-only gRPC response carrying `Internal` (code 13).
fn internal_response() -> http::Response<Body> {
    let mut response = http::Response::new(Body::empty());
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/grpc"),
    );
    response
        .headers_mut()
        .insert("grpc-status", HeaderValue::from_static("13"));
    response
        .headers_mut()
        .insert("grpc-message", HeaderValue::from_static("internal error"));
    response
}
