//! dirk-wallet - wallet client for remotely custodied validator keys
//!
//! A wallet whose accounts live on a set of redundant remote signer nodes:
//! - Account lifecycle: create, lock/unlock, enumerate
//! - Signing requests fanned out to every node over mutually authenticated gRPC
//! - Any explicit denial from a node denies the request
//! - Batches are signed entirely or not at all
//!
//! # Security
//!
//! - No key material is held client-side
//! - Slashing protection is enforced by the nodes; the client never retries
//!   around a denial
//! - Passphrases are forwarded once and zeroed on drop

pub mod api;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod errors;
pub mod policy;
pub mod security;
pub mod signer;
pub mod wallet;

pub use api::{Credentials, GrpcEndpoint};
pub use context::RequestContext;
pub use endpoint::{Endpoint, SignerEndpoint};
pub use errors::{Result, WalletError};
pub use security::Passphrase;
pub use signer::Signature;
pub use wallet::{
    Account, LockState, Locker, ProtectingMultiSigner, ProtectingSigner, Wallet, WalletOptions,
};
