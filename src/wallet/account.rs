//! Accounts and their capabilities
//!
//! An [`Account`] holds no key material. What it can do is fixed when it is
//! built: a set of optional capability objects, each backed by the remote
//! signer nodes.

use super::WalletInner;
use crate::context::RequestContext;
use crate::errors::Result;
use crate::security::Passphrase;
use crate::signer::Signature;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Lock state of an account as reported by the signer nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockState {
    #[default]
    Locked,
    Unlocked,
}

impl LockState {
    pub fn is_unlocked(&self) -> bool {
        *self == LockState::Unlocked
    }
}

/// Account metadata as listed by a signer node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub wallet: String,
    pub name: String,
    /// Composite public key, as reported by the nodes
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    pub id: Uuid,
}

impl AccountInfo {
    /// Split a `<wallet>/<account>` path. `None` if either part is empty.
    pub fn from_path(path: &str, public_key: Vec<u8>, id: Uuid) -> Option<Self> {
        let (wallet, name) = path.split_once('/')?;
        if wallet.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            wallet: wallet.to_string(),
            name: name.to_string(),
            public_key,
            id,
        })
    }

    /// Path used on the wire
    pub fn path(&self) -> String {
        format!("{}/{}", self.wallet, self.name)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// Lock and unlock an account on the signer nodes.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Lock the account. Always succeeds unless the context is cancelled.
    async fn lock(&self, ctx: &RequestContext) -> Result<()>;

    /// Unlock the account. Fails with `UnlockFailed` if any node refuses.
    async fn unlock(&self, ctx: &RequestContext, passphrase: &Passphrase) -> Result<()>;

    /// Ask the nodes whether the account is unlocked.
    async fn is_unlocked(&self, ctx: &RequestContext) -> Result<bool>;

    /// State seen by the most recent lock, unlock or status call.
    fn last_known_lock_state(&self) -> LockState;
}

/// Single-account signing with remote slashing protection.
#[async_trait]
pub trait ProtectingSigner: Send + Sync {
    async fn sign_generic(&self, ctx: &RequestContext, data: &[u8], domain: &[u8])
        -> Result<Signature>;

    #[allow(clippy::too_many_arguments)]
    async fn sign_beacon_proposal(
        &self,
        ctx: &RequestContext,
        slot: u64,
        proposer_index: u64,
        parent_root: &[u8],
        state_root: &[u8],
        body_root: &[u8],
        domain: &[u8],
    ) -> Result<Signature>;

    #[allow(clippy::too_many_arguments)]
    async fn sign_beacon_attestation(
        &self,
        ctx: &RequestContext,
        slot: u64,
        committee_index: u64,
        block_root: &[u8],
        source_epoch: u64,
        source_root: &[u8],
        target_epoch: u64,
        target_root: &[u8],
        domain: &[u8],
    ) -> Result<Signature>;
}

/// Attestations for several accounts in one all-or-nothing request.
#[async_trait]
pub trait ProtectingMultiSigner: Send + Sync {
    /// Signatures are returned in `accounts` order.
    #[allow(clippy::too_many_arguments)]
    async fn sign_beacon_attestations(
        &self,
        ctx: &RequestContext,
        slot: u64,
        accounts: &[Account],
        committee_indices: &[u64],
        block_root: &[u8],
        source_epoch: u64,
        source_root: &[u8],
        target_epoch: u64,
        target_root: &[u8],
        domain: &[u8],
    ) -> Result<Vec<Signature>>;
}

/// The capabilities an account was built with
#[derive(Clone, Default)]
pub struct Capabilities {
    pub locker: Option<Arc<dyn Locker>>,
    pub signer: Option<Arc<dyn ProtectingSigner>>,
    pub multi_signer: Option<Arc<dyn ProtectingMultiSigner>>,
}

/// A validator account custodied by the signer nodes
#[derive(Clone)]
pub struct Account {
    info: AccountInfo,
    wallet: Weak<WalletInner>,
    capabilities: Capabilities,
}

impl Account {
    pub(crate) fn new(
        info: AccountInfo,
        wallet: Weak<WalletInner>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            info,
            wallet,
            capabilities,
        }
    }

    pub fn id(&self) -> Uuid {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn public_key(&self) -> &[u8] {
        &self.info.public_key
    }

    /// `<wallet>/<account>`
    pub fn path(&self) -> String {
        self.info.path()
    }

    pub fn info(&self) -> &AccountInfo {
        &self.info
    }

    /// The owning wallet, if it is still open.
    pub fn wallet(&self) -> Option<super::Wallet> {
        self.wallet.upgrade().map(super::Wallet::from_inner)
    }

    pub fn locker(&self) -> Option<&dyn Locker> {
        self.capabilities.locker.as_deref()
    }

    pub fn signer(&self) -> Option<&dyn ProtectingSigner> {
        self.capabilities.signer.as_deref()
    }

    pub fn multi_signer(&self) -> Option<&dyn ProtectingMultiSigner> {
        self.capabilities.multi_signer.as_deref()
    }

    /// Lock state seen by the last remote call, `Locked` if none yet.
    pub fn last_known_lock_state(&self) -> LockState {
        self.locker()
            .map(|l| l.last_known_lock_state())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("path", &self.info.path())
            .field("id", &self.info.id)
            .field("public_key", &hex::encode(&self.info.public_key))
            .field("locker", &self.capabilities.locker.is_some())
            .field("signer", &self.capabilities.signer.is_some())
            .field("multi_signer", &self.capabilities.multi_signer.is_some())
            .finish()
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info
    }
}
