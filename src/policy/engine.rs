//! Quorum policy
//!
//! Reduces the outcomes collected from every endpoint into a single decision.
//! An explicit denial from any reachable endpoint denies the whole request.
//! Unreachable endpoints only count against the approval threshold.

use crate::endpoint::EndpointOutcome;
use crate::errors::{EndpointError, Result, WalletError};
use tracing::{debug, warn};

/// Reduced result of one multi-endpoint request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<T> {
    /// At least `threshold` endpoints approved with identical results
    Approved(T),
    /// At least one endpoint denied, or approvals disagreed
    Denied { reasons: Vec<String> },
    /// Too few endpoints answered
    Insufficient {
        approved: usize,
        required: usize,
        errors: Vec<EndpointError>,
    },
}

impl<T> Decision<T> {
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved(_))
    }

    /// Map the decision onto the caller-visible result, reporting a denial
    /// as `denial`.
    pub fn into_result(self, denial: WalletError) -> Result<T> {
        match self {
            Decision::Approved(value) => Ok(value),
            Decision::Denied { .. } => Err(denial),
            Decision::Insufficient {
                approved,
                required,
                errors,
            } => Err(shortfall_error(approved, required, &errors)),
        }
    }
}

/// Error for a request that missed the threshold without being denied.
pub(crate) fn shortfall_error(
    approved: usize,
    required: usize,
    errors: &[EndpointError],
) -> WalletError {
    if errors.iter().any(|e| *e == EndpointError::Cancelled) {
        return WalletError::Cancelled;
    }
    if errors.iter().any(|e| *e == EndpointError::DeadlineExceeded) {
        return WalletError::DeadlineExceeded;
    }
    let detail = if errors.is_empty() {
        "no endpoint errors reported".to_string()
    } else {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    };
    WalletError::Unavailable {
        approved,
        required,
        detail,
    }
}

/// Approval threshold over a fixed endpoint set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumPolicy {
    threshold: usize,
    endpoints: usize,
}

impl QuorumPolicy {
    /// Policy over `endpoints` nodes; `threshold` defaults to a strict majority.
    pub fn new(endpoints: usize, threshold: Option<usize>) -> Result<Self> {
        if endpoints == 0 {
            return Err(WalletError::ConfigError(
                "at least one endpoint is required".to_string(),
            ));
        }
        let threshold = threshold.unwrap_or_else(|| Self::majority(endpoints));
        if threshold == 0 || threshold > endpoints {
            return Err(WalletError::ConfigError(format!(
                "threshold {} out of range for {} endpoints",
                threshold, endpoints
            )));
        }
        Ok(Self {
            threshold,
            endpoints,
        })
    }

    pub fn majority(endpoints: usize) -> usize {
        endpoints / 2 + 1
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn endpoints(&self) -> usize {
        self.endpoints
    }

    /// Deny-wins reduction of the outcomes of one request.
    pub fn evaluate<T: PartialEq>(&self, outcomes: Vec<EndpointOutcome<T>>) -> Decision<T> {
        let mut approvals: Vec<T> = Vec::new();
        let mut reasons = Vec::new();
        let mut errors = Vec::new();

        for outcome in outcomes {
            match outcome {
                EndpointOutcome::Approved(value) => approvals.push(value),
                EndpointOutcome::Denied(reason) => reasons.push(reason),
                EndpointOutcome::Unreachable(e) => errors.push(e),
            }
        }

        if !reasons.is_empty() {
            warn!(
                "Request denied by {} endpoint(s): {:?}",
                reasons.len(),
                reasons
            );
            return Decision::Denied { reasons };
        }

        if let Some(first) = approvals.first() {
            if approvals.iter().any(|value| value != first) {
                warn!("Endpoints approved with conflicting results, treating as denial");
                return Decision::Denied {
                    reasons: vec!["endpoints returned conflicting results".to_string()],
                };
            }
        }

        let approved = approvals.len();
        if approved >= self.threshold {
            debug!(
                "Request approved by {}/{} endpoints (threshold {})",
                approved, self.endpoints, self.threshold
            );
            return match approvals.into_iter().next() {
                Some(value) => Decision::Approved(value),
                None => Decision::Insufficient {
                    approved,
                    required: self.threshold,
                    errors,
                },
            };
        }

        warn!(
            "Request reached {}/{} approvals, {} unreachable",
            approved,
            self.threshold,
            errors.len()
        );
        Decision::Insufficient {
            approved,
            required: self.threshold,
            errors,
        }
    }

    /// Count endpoints whose approved answer satisfies `predicate`.
    pub fn count_matching<T>(
        &self,
        outcomes: &[EndpointOutcome<T>],
        predicate: impl Fn(&T) -> bool,
    ) -> usize {
        outcomes
            .iter()
            .filter(|o| matches!(o, EndpointOutcome::Approved(v) if predicate(v)))
            .count()
    }

    /// Whether `yes` is a strict majority of `responded`; ties are "no".
    pub fn majority_agrees(yes: usize, responded: usize) -> bool {
        responded > 0 && yes * 2 > responded
    }
}
