//! Endpoint pool and dispatcher
//!
//! Fans one operation out to every configured signer endpoint and collects
//! one outcome per endpoint, in configuration order.

use super::{EndpointOutcome, SignerEndpoint, Verdict};
use crate::context::RequestContext;
use crate::errors::{EndpointError, Result, WalletError};
use crate::policy::{Decision, QuorumPolicy};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default bound on one fan-out when the caller sets no deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The fixed, ordered set of endpoints backing a wallet
pub struct EndpointPool {
    clients: Vec<Arc<dyn SignerEndpoint>>,
    policy: QuorumPolicy,
    timeout: Duration,
}

impl EndpointPool {
    /// Create a pool over `clients`; `threshold` defaults to a strict majority.
    pub fn new(
        clients: Vec<Arc<dyn SignerEndpoint>>,
        threshold: Option<usize>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for client in &clients {
            let endpoint = client.endpoint();
            endpoint.validate()?;
            if !seen.insert(endpoint.clone()) {
                return Err(WalletError::InvalidEndpoint(format!(
                    "duplicate endpoint {}",
                    endpoint
                )));
            }
        }

        let policy = QuorumPolicy::new(clients.len(), threshold)?;

        Ok(Self {
            clients,
            policy,
            timeout,
        })
    }

    pub fn policy(&self) -> &QuorumPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clients(&self) -> &[Arc<dyn SignerEndpoint>] {
        &self.clients
    }

    /// Run `call` against every endpoint concurrently.
    ///
    /// Each endpoint runs in its own task bound by the context deadline (or
    /// the pool timeout when none is set). A call that misses the deadline is
    /// recorded as unreachable. Cancelling the context abandons every
    /// in-flight call and the whole dispatch fails with `Cancelled`.
    pub async fn dispatch<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        call: F,
    ) -> Result<Vec<EndpointOutcome<T>>>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn SignerEndpoint>) -> Fut,
        Fut: Future<Output = std::result::Result<Verdict<T>, EndpointError>> + Send + 'static,
    {
        ctx.check()?;

        let deadline = ctx
            .deadline_at()
            .unwrap_or_else(|| Instant::now() + self.timeout);
        let token = ctx.token().child_token();
        let request_id: u64 = rand::random();

        debug!(
            "[{:016x}] Dispatching {} to {} endpoints",
            request_id,
            operation,
            self.clients.len()
        );

        let mut tasks = JoinSet::new();
        for (index, client) in self.clients.iter().enumerate() {
            let endpoint = client.endpoint().clone();
            let fut = call(Arc::clone(client));
            let token = token.clone();
            tasks.spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(EndpointError::Cancelled),
                    res = tokio::time::timeout_at(deadline, fut) => {
                        res.unwrap_or(Err(EndpointError::DeadlineExceeded))
                    }
                };
                (index, endpoint, result)
            });
        }

        let mut outcomes: Vec<EndpointOutcome<T>> = (0..self.clients.len())
            .map(|_| EndpointOutcome::Unreachable(EndpointError::Failed("no reply".to_string())))
            .collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, endpoint, result)) => {
                    match &result {
                        Ok(Verdict::Approved(_)) => {
                            debug!("[{:016x}] {} approved {}", request_id, endpoint, operation)
                        }
                        Ok(Verdict::Denied(reason)) => warn!(
                            "[{:016x}] {} denied {}: {}",
                            request_id, endpoint, operation, reason
                        ),
                        Err(e) => warn!(
                            "[{:016x}] {} unreachable for {}: {}",
                            request_id, endpoint, operation, e
                        ),
                    }
                    outcomes[index] = result.into();
                }
                Err(e) => warn!("[{:016x}] Endpoint task aborted: {}", request_id, e),
            }
        }

        if ctx.is_cancelled() {
            debug!("[{:016x}] {} cancelled by caller", request_id, operation);
            return Err(WalletError::Cancelled);
        }

        Ok(outcomes)
    }

    /// Dispatch and reduce the outcomes under the pool's quorum policy.
    pub async fn decide<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        call: F,
    ) -> Result<Decision<T>>
    where
        T: PartialEq + Send + 'static,
        F: Fn(Arc<dyn SignerEndpoint>) -> Fut,
        Fut: Future<Output = std::result::Result<Verdict<T>, EndpointError>> + Send + 'static,
    {
        let outcomes = self.dispatch(ctx, operation, call).await?;
        Ok(self.policy.evaluate(outcomes))
    }
}
