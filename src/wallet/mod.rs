//! Distributed wallet
//!
//! A [`Wallet`] is a named view onto accounts held by a set of remote signer
//! nodes. It keeps no key material and no persisted state; every query goes
//! to the nodes.

pub mod account;

pub use account::{
    Account, AccountInfo, Capabilities, LockState, Locker, ProtectingMultiSigner,
    ProtectingSigner,
};

use crate::api::{Credentials, GrpcEndpoint};
use crate::context::RequestContext;
use crate::endpoint::pool::DEFAULT_TIMEOUT;
use crate::endpoint::{Endpoint, EndpointOutcome, EndpointPool, SignerEndpoint};
use crate::errors::{EndpointError, Result, WalletError};
use crate::policy::engine::shortfall_error;
use crate::policy::{Decision, QuorumPolicy};
use crate::security::Passphrase;
use crate::signer::RemoteAccount;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Reported by [`Wallet::wallet_type`]
pub const WALLET_TYPE: &str = "distributed";

/// Default bound on establishing a channel to one endpoint
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Tuning for [`Wallet::open_with_options`]
#[derive(Debug, Clone)]
pub struct WalletOptions {
    /// Approvals required per request; a strict majority when unset
    pub threshold: Option<usize>,
    /// Bound on one fan-out when the caller's context has no deadline
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for WalletOptions {
    fn default() -> Self {
        Self {
            threshold: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

pub(crate) struct WalletInner {
    id: Uuid,
    name: String,
    pool: Arc<EndpointPool>,
    unlocked: AtomicBool,
}

/// Handle to an open wallet; clones share the same endpoints
#[derive(Clone)]
pub struct Wallet {
    inner: Arc<WalletInner>,
}

impl Wallet {
    /// Open `name` on `endpoints` with default options.
    pub async fn open(
        ctx: &RequestContext,
        name: &str,
        credentials: &Credentials,
        endpoints: Vec<Endpoint>,
    ) -> Result<Self> {
        Self::open_with_options(ctx, name, credentials, endpoints, WalletOptions::default()).await
    }

    /// Open `name` on `endpoints`.
    ///
    /// Channels connect lazily, so an unreachable node does not fail the
    /// open; bad endpoints or options do.
    pub async fn open_with_options(
        ctx: &RequestContext,
        name: &str,
        credentials: &Credentials,
        endpoints: Vec<Endpoint>,
        options: WalletOptions,
    ) -> Result<Self> {
        ctx.check()?;
        if endpoints.is_empty() {
            return Err(WalletError::ConfigError(
                "at least one endpoint is required".to_string(),
            ));
        }

        let mut clients: Vec<Arc<dyn SignerEndpoint>> = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            endpoint.validate()?;
            let client =
                GrpcEndpoint::connect_lazy(endpoint, credentials, options.connect_timeout)?;
            clients.push(Arc::new(client));
        }

        Self::from_clients(name, clients, options)
    }

    /// Build a wallet over already constructed endpoint clients.
    pub fn from_clients(
        name: &str,
        clients: Vec<Arc<dyn SignerEndpoint>>,
        options: WalletOptions,
    ) -> Result<Self> {
        if name.is_empty() || name.contains('/') {
            return Err(WalletError::ConfigError(format!(
                "invalid wallet name \"{}\"",
                name
            )));
        }

        let pool = EndpointPool::new(clients, options.threshold, options.timeout)?;
        let inner = WalletInner {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
            name: name.to_string(),
            pool: Arc::new(pool),
            unlocked: AtomicBool::new(false),
        };

        info!(
            "Opened wallet \"{}\" on {} endpoint(s), threshold {}",
            name,
            inner.pool.len(),
            inner.pool.policy().threshold()
        );

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub(crate) fn from_inner(inner: Arc<WalletInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn wallet_type(&self) -> &'static str {
        WALLET_TYPE
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.inner
            .pool
            .clients()
            .iter()
            .map(|c| c.endpoint().clone())
            .collect()
    }

    pub fn threshold(&self) -> usize {
        self.inner.pool.policy().threshold()
    }

    /// Wallet-level lock. Local only; account gating happens on the nodes.
    pub fn lock(&self) {
        self.inner.unlocked.store(false, Ordering::SeqCst);
    }

    pub fn unlock(&self) {
        self.inner.unlocked.store(true, Ordering::SeqCst);
    }

    pub fn is_unlocked(&self) -> bool {
        self.inner.unlocked.load(Ordering::SeqCst)
    }

    fn account_path(&self, name: &str) -> String {
        format!("{}/{}", self.inner.name, name)
    }

    fn build_account(&self, info: AccountInfo) -> Account {
        let ops = Arc::new(RemoteAccount::new(info.path(), Arc::clone(&self.inner.pool)));
        Account::new(info, Arc::downgrade(&self.inner), ops.capabilities())
    }

    /// List `paths` on every endpoint and keep what a majority of the
    /// endpoints that answered agree on.
    async fn agreed_accounts(
        &self,
        ctx: &RequestContext,
        paths: Vec<String>,
    ) -> Result<Vec<AccountInfo>> {
        let outcomes = self
            .inner
            .pool
            .dispatch(ctx, "list_accounts", move |client| {
                let paths = paths.clone();
                async move { client.list_accounts(&paths).await }
            })
            .await?;

        let mut responded = 0;
        let mut errors: Vec<EndpointError> = Vec::new();
        let mut votes: BTreeMap<String, (usize, AccountInfo)> = BTreeMap::new();
        for outcome in outcomes {
            match outcome {
                EndpointOutcome::Approved(infos) => {
                    responded += 1;
                    for info in infos {
                        if info.wallet != self.inner.name {
                            continue;
                        }
                        votes.entry(info.name.clone()).or_insert((0, info)).0 += 1;
                    }
                }
                EndpointOutcome::Denied(_) => responded += 1,
                EndpointOutcome::Unreachable(e) => errors.push(e),
            }
        }

        if responded == 0 {
            return Err(shortfall_error(0, 1, &errors));
        }

        debug!(
            "{} endpoint(s) listed {} candidate account(s)",
            responded,
            votes.len()
        );

        Ok(votes
            .into_values()
            .filter(|(count, _)| QuorumPolicy::majority_agrees(*count, responded))
            .map(|(_, info)| info)
            .collect())
    }

    /// Every account in the wallet, sorted by name.
    pub async fn accounts(&self, ctx: &RequestContext) -> Result<Vec<Account>> {
        let infos = self
            .agreed_accounts(ctx, vec![self.inner.name.clone()])
            .await?;
        Ok(infos.into_iter().map(|i| self.build_account(i)).collect())
    }

    /// Look an account up by name.
    ///
    /// When the endpoints disagree the majority of those that answered
    /// decides, and a tie means not found.
    pub async fn account_by_name(&self, ctx: &RequestContext, name: &str) -> Result<Account> {
        let infos = self
            .agreed_accounts(ctx, vec![self.account_path(name)])
            .await?;
        infos
            .into_iter()
            .find(|info| info.name == name)
            .map(|info| self.build_account(info))
            .ok_or_else(|| WalletError::AccountNotFound(name.to_string()))
    }

    pub async fn account_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<Account> {
        self.accounts(ctx)
            .await?
            .into_iter()
            .find(|a| a.id() == id)
            .ok_or_else(|| WalletError::AccountNotFound(id.to_string()))
    }

    /// Create an account on every endpoint.
    ///
    /// The passphrase is forwarded to the nodes and not kept.
    pub async fn create_account(
        &self,
        ctx: &RequestContext,
        name: &str,
        passphrase: &Passphrase,
    ) -> Result<Account> {
        if name.is_empty() {
            return Err(WalletError::InvalidAccountName(
                "account name cannot be empty".to_string(),
            ));
        }
        if name.contains('/') {
            return Err(WalletError::InvalidAccountName(format!(
                "\"{}\" contains '/'",
                name
            )));
        }

        match self.account_by_name(ctx, name).await {
            Ok(_) => return Err(WalletError::DuplicateAccount(name.to_string())),
            Err(WalletError::AccountNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let path = self.account_path(name);
        let participants = self.inner.pool.len() as u32;
        let threshold = self.threshold() as u32;
        let passphrase = passphrase.clone();
        let decision = self
            .inner
            .pool
            .decide(ctx, "generate", {
                let path = path.clone();
                move |client| {
                    let path = path.clone();
                    let passphrase = passphrase.clone();
                    async move {
                        client
                            .generate(&path, &passphrase, participants, threshold)
                            .await
                    }
                }
            })
            .await?;

        let info = match decision {
            Decision::Denied { reasons } => {
                return Err(WalletError::AccountCreationFailed(reasons.join("; ")))
            }
            other => other.into_result(WalletError::AccountCreationFailed(path.clone()))?,
        };

        if info.path() != path {
            return Err(WalletError::AccountCreationFailed(format!(
                "endpoints created {} instead of {}",
                info.path(),
                path
            )));
        }

        info!("Created account {} ({})", path, info.id);
        Ok(self.build_account(info))
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("endpoints", &self.endpoints())
            .field("threshold", &self.threshold())
            .finish()
    }
}
