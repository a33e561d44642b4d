//! Account capabilities backed by the signer nodes
//!
//! [`RemoteAccount`] implements every account capability by building a
//! request, fanning it out through the wallet's endpoint pool and reducing
//! the outcomes under the quorum policy.

use super::{Signature, SigningRequest};
use crate::context::RequestContext;
use crate::endpoint::{EndpointOutcome, EndpointPool, Verdict};
use crate::errors::{EndpointError, Result, WalletError};
use crate::policy::engine::shortfall_error;
use crate::security::Passphrase;
use crate::wallet::{
    Account, Capabilities, LockState, Locker, ProtectingMultiSigner, ProtectingSigner,
};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// One account's view of the signer nodes
pub struct RemoteAccount {
    path: String,
    pool: Arc<EndpointPool>,
    lock_state: RwLock<LockState>,
}

impl RemoteAccount {
    pub fn new(path: impl Into<String>, pool: Arc<EndpointPool>) -> Self {
        Self {
            path: path.into(),
            pool,
            lock_state: RwLock::new(LockState::Locked),
        }
    }

    /// The full capability set, sharing this instance.
    pub fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities {
            locker: Some(self.clone()),
            signer: Some(self.clone()),
            multi_signer: Some(self),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn set_lock_state(&self, state: LockState) {
        let mut guard = self.lock_state.write().unwrap_or_else(|e| e.into_inner());
        *guard = state;
    }

    /// Dispatch a validated request and reduce the replies.
    async fn sign(&self, ctx: &RequestContext, request: SigningRequest) -> Result<Vec<Signature>> {
        let kind = request.kind();
        let expected = request.signature_count();
        let denial = request.denial();
        let request = Arc::new(request);

        debug!("Signing {} for {} account(s)", kind, expected);

        let decision = self
            .pool
            .decide(ctx, kind, move |client| {
                let request = Arc::clone(&request);
                async move {
                    match client.sign(&request).await? {
                        Verdict::Approved(signatures) if signatures.len() != expected => {
                            Err(EndpointError::MalformedResponse(format!(
                                "expected {} signatures, got {}",
                                expected,
                                signatures.len()
                            )))
                        }
                        verdict => Ok(verdict),
                    }
                }
            })
            .await?;

        decision.into_result(denial)
    }

    async fn sign_one(&self, ctx: &RequestContext, request: SigningRequest) -> Result<Signature> {
        self.sign(ctx, request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| WalletError::InternalError("no signature returned".to_string()))
    }
}

#[async_trait]
impl Locker for RemoteAccount {
    async fn lock(&self, ctx: &RequestContext) -> Result<()> {
        let path = self.path.clone();
        let result = self
            .pool
            .dispatch(ctx, "lock", move |client| {
                let path = path.clone();
                async move { client.lock(&path).await }
            })
            .await;

        match result {
            Ok(outcomes) => {
                let missed = outcomes.iter().filter(|o| !o.is_approved()).count();
                if missed > 0 {
                    warn!(
                        "Lock of {} not confirmed by {}/{} endpoints",
                        self.path,
                        missed,
                        outcomes.len()
                    );
                }
            }
            Err(WalletError::Cancelled) => return Err(WalletError::Cancelled),
            Err(e) => warn!("Lock of {} not broadcast: {}", self.path, e),
        }

        self.set_lock_state(LockState::Locked);
        info!("Locked account {}", self.path);
        Ok(())
    }

    async fn unlock(&self, ctx: &RequestContext, passphrase: &Passphrase) -> Result<()> {
        let path = self.path.clone();
        let passphrase = passphrase.clone();
        let decision = self
            .pool
            .decide(ctx, "unlock", move |client| {
                let path = path.clone();
                let passphrase = passphrase.clone();
                async move { client.unlock(&path, &passphrase).await }
            })
            .await?;

        decision.into_result(WalletError::UnlockFailed)?;
        self.set_lock_state(LockState::Unlocked);
        info!("Unlocked account {}", self.path);
        Ok(())
    }

    async fn is_unlocked(&self, ctx: &RequestContext) -> Result<bool> {
        let path = self.path.clone();
        let outcomes = self
            .pool
            .dispatch(ctx, "status", move |client| {
                let path = path.clone();
                async move { client.lock_state(&path).await }
            })
            .await?;

        let policy = self.pool.policy();
        let responded = policy.count_matching(&outcomes, |_| true);
        if responded == 0 && !outcomes.iter().any(|o| o.is_denied()) {
            let errors: Vec<EndpointError> = outcomes
                .into_iter()
                .filter_map(|o| match o {
                    EndpointOutcome::Unreachable(e) => Some(e),
                    _ => None,
                })
                .collect();
            return Err(shortfall_error(0, policy.threshold(), &errors));
        }

        let unlocked = policy.count_matching(&outcomes, |s| s.is_unlocked()) >= policy.threshold();
        let state = if unlocked {
            LockState::Unlocked
        } else {
            LockState::Locked
        };
        self.set_lock_state(state);
        Ok(unlocked)
    }

    fn last_known_lock_state(&self) -> LockState {
        *self.lock_state.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ProtectingSigner for RemoteAccount {
    async fn sign_generic(
        &self,
        ctx: &RequestContext,
        data: &[u8],
        domain: &[u8],
    ) -> Result<Signature> {
        let request = SigningRequest::generic(self.path.as_str(), data, domain)?;
        self.sign_one(ctx, request).await
    }

    async fn sign_beacon_proposal(
        &self,
        ctx: &RequestContext,
        slot: u64,
        proposer_index: u64,
        parent_root: &[u8],
        state_root: &[u8],
        body_root: &[u8],
        domain: &[u8],
    ) -> Result<Signature> {
        let request = SigningRequest::beacon_proposal(
            self.path.as_str(),
            slot,
            proposer_index,
            parent_root,
            state_root,
            body_root,
            domain,
        )?;
        self.sign_one(ctx, request).await
    }

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
    ) -> Result<Signature> {
        let request = SigningRequest::beacon_attestation(
            self.path.as_str(),
            slot,
            committee_index,
            block_root,
            source_epoch,
            source_root,
            target_epoch,
            target_root,
            domain,
        )?;
        self.sign_one(ctx, request).await
    }
}

#[async_trait]
impl ProtectingMultiSigner for RemoteAccount {
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
    ) -> Result<Vec<Signature>> {
        let paths = accounts.iter().map(|a| a.path()).collect();
        let request = SigningRequest::beacon_attestations(
            slot,
            paths,
            committee_indices,
            block_root,
            source_epoch,
            source_root,
            target_epoch,
            target_root,
            domain,
        )?;
        self.sign(ctx, request).await
    }
}
