//! Signing requests and remote signing
//!
//! This module provides:
//! - Validated signing requests for each supported operation
//! - The signature value returned by the signer nodes
//! - Account capabilities that sign through the endpoint pool

pub mod remote;
pub mod request;
pub mod signature;

pub use remote::RemoteAccount;
pub use request::{
    AccountAttestation, AttestationData, BeaconBlockHeader, Checkpoint, Domain, Root,
    SigningRequest, ROOT_LENGTH,
};
pub use signature::{Signature, SIGNATURE_LENGTH};
