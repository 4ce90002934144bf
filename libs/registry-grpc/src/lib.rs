//! Registry gRPC Contracts
//!
//! Generated protobuf types plus client/server stubs for the registry
//! control-plane and the operator wire envelope.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

// Generated registry API types
pub mod v1 {
    tonic::include_proto!("kcmregistry.v1");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("kcmregistry_descriptor");
}

// Generated operator wire envelope
pub mod operator {
    pub mod v1 {
        tonic::include_proto!("kcmregistry.operator.v1");
    }
}

pub use v1::auth_service_server::{AuthService, AuthServiceServer};
pub use v1::mapping_service_server::{MappingService, MappingServiceServer};
pub use v1::system_service_server::{SystemService, SystemServiceServer};
pub use v1::tenant_service_server::{TenantService, TenantServiceServer};

/// Service name constants for health reporting.
pub const TENANT_SERVICE_NAME: &str =
    <TenantServiceServer<()> as tonic::server::NamedService>::NAME;
pub const SYSTEM_SERVICE_NAME: &str =
    <SystemServiceServer<()> as tonic::server::NamedService>::NAME;
pub const MAPPING_SERVICE_NAME: &str =
    <MappingServiceServer<()> as tonic::server::NamedService>::NAME;
pub const AUTH_SERVICE_NAME: &str =
    <AuthServiceServer<()> as tonic::server::NamedService>::NAME;
