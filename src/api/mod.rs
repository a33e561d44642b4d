//! Transport layer for dirk-wallet
//!
//! Provides:
//! - The gRPC client for one signer node
//! - Client credentials for the TLS channels

pub mod auth;
pub mod grpc;

pub use auth::Credentials;
pub use grpc::GrpcEndpoint;
