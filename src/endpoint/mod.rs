//! Signer endpoints
//!
//! This module provides:
//! - Endpoint addressing (`host:port`)
//! - The `SignerEndpoint` trait every transport implements
//! - The endpoint pool that fans requests out and collects outcomes

pub mod pool;

#[cfg(test)]
pub(crate) mod mock;

pub use pool::EndpointPool;

use crate::errors::{EndpointError, Result, WalletError};
use crate::security::Passphrase;
use crate::signer::{Signature, SigningRequest};
use crate::wallet::{AccountInfo, LockState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of one signer node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// URI used for the TLS channel
    pub fn uri(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(WalletError::InvalidEndpoint("empty host".to_string()));
        }
        if self.port == 0 {
            return Err(WalletError::InvalidEndpoint(format!(
                "{}: port must be non-zero",
                self.host
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Answer of a node that processed the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T> {
    Approved(T),
    Denied(String),
}

/// What the dispatcher recorded for one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointOutcome<T> {
    Approved(T),
    Denied(String),
    Unreachable(EndpointError),
}

/// Per-endpoint result of a signing request
pub type SigningOutcome = EndpointOutcome<Vec<Signature>>;

impl<T> EndpointOutcome<T> {
    pub fn is_approved(&self) -> bool {
        matches!(self, EndpointOutcome::Approved(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, EndpointOutcome::Denied(_))
    }
}

impl<T> From<std::result::Result<Verdict<T>, EndpointError>> for EndpointOutcome<T> {
    fn from(result: std::result::Result<Verdict<T>, EndpointError>) -> Self {
        match result {
            Ok(Verdict::Approved(value)) => EndpointOutcome::Approved(value),
            Ok(Verdict::Denied(reason)) => EndpointOutcome::Denied(reason),
            Err(e) => EndpointOutcome::Unreachable(e),
        }
    }
}

/// Operations a signer node exposes to the wallet.
///
/// Implementations must be safe to call concurrently; the pool shares one
/// instance per node across every in-flight request.
#[async_trait]
pub trait SignerEndpoint: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    /// Sign a request; an approved reply carries one signature per account
    /// in `request.accounts()` order.
    async fn sign(&self, request: &SigningRequest)
        -> std::result::Result<Verdict<Vec<Signature>>, EndpointError>;

    /// Create an account held by `participants` nodes, `threshold` of which
    /// must take part in signing.
    async fn generate(
        &self,
        account: &str,
        passphrase: &Passphrase,
        participants: u32,
        threshold: u32,
    ) -> std::result::Result<Verdict<AccountInfo>, EndpointError>;

    async fn lock(&self, account: &str) -> std::result::Result<Verdict<()>, EndpointError>;

    async fn unlock(
        &self,
        account: &str,
        passphrase: &Passphrase,
    ) -> std::result::Result<Verdict<()>, EndpointError>;

    /// Current lock state of the account on this node. Does not change it.
    async fn lock_state(&self, account: &str)
        -> std::result::Result<Verdict<LockState>, EndpointError>;

    /// Accounts matching any of `paths` (wallet names or account paths).
    async fn list_accounts(
        &self,
        paths: &[String],
    ) -> std::result::Result<Verdict<Vec<AccountInfo>>, EndpointError>;
}
