//! Signing request builder
//!
//! Packages the inputs of each signing operation into a [`SigningRequest`],
//! checking every fixed-size field locally. A malformed request is rejected
//! here and never reaches an endpoint. Slot and epoch ordering is left to the
//! remote protection layer.

use crate::errors::{Result, WalletError};

/// Length of roots and domains
pub const ROOT_LENGTH: usize = 32;

pub type Root = [u8; ROOT_LENGTH];
pub type Domain = [u8; ROOT_LENGTH];

fn fixed(field: &'static str, bytes: &[u8]) -> Result<Root> {
    bytes
        .try_into()
        .map_err(|_| WalletError::MalformedRequest { field })
}

/// Finality checkpoint referenced by an attestation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub epoch: u64,
    pub root: Root,
}

/// Header of a proposed beacon block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconBlockHeader {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: Root,
    pub state_root: Root,
    pub body_root: Root,
}

/// Attestation vote data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationData {
    pub slot: u64,
    pub committee_index: u64,
    pub beacon_block_root: Root,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

/// One account's entry in a batched attestation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountAttestation {
    /// Account path, `<wallet>/<account>`
    pub account: String,
    pub data: AttestationData,
}

/// A validated request ready for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningRequest {
    Generic {
        account: String,
        data: Root,
        domain: Domain,
    },
    BeaconProposal {
        account: String,
        header: BeaconBlockHeader,
        domain: Domain,
    },
    BeaconAttestation {
        account: String,
        data: AttestationData,
        domain: Domain,
    },
    BeaconAttestations {
        attestations: Vec<AccountAttestation>,
        domain: Domain,
    },
}

impl SigningRequest {
    /// Arbitrary 32-byte data under a 32-byte domain.
    pub fn generic(account: impl Into<String>, data: &[u8], domain: &[u8]) -> Result<Self> {
        Ok(SigningRequest::Generic {
            account: account.into(),
            data: fixed("data", data)?,
            domain: fixed("domain", domain)?,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn beacon_proposal(
        account: impl Into<String>,
        slot: u64,
        proposer_index: u64,
        parent_root: &[u8],
        state_root: &[u8],
        body_root: &[u8],
        domain: &[u8],
    ) -> Result<Self> {
        Ok(SigningRequest::BeaconProposal {
            account: account.into(),
            header: BeaconBlockHeader {
                slot,
                proposer_index,
                parent_root: fixed("parent root", parent_root)?,
                state_root: fixed("state root", state_root)?,
                body_root: fixed("body root", body_root)?,
            },
            domain: fixed("domain", domain)?,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn beacon_attestation(
        account: impl Into<String>,
        slot: u64,
        committee_index: u64,
        block_root: &[u8],
        source_epoch: u64,
        source_root: &[u8],
        target_epoch: u64,
        target_root: &[u8],
        domain: &[u8],
    ) -> Result<Self> {
        Ok(SigningRequest::BeaconAttestation {
            account: account.into(),
            data: attestation_data(
                slot,
                committee_index,
                block_root,
                source_epoch,
                source_root,
                target_epoch,
                target_root,
            )?,
            domain: fixed("domain", domain)?,
        })
    }

    /// Attestations for several accounts sharing slot, votes and domain.
    ///
    /// `accounts[i]` attests in committee `committee_indices[i]`.
    #[allow(clippy::too_many_arguments)]
    pub fn beacon_attestations(
        slot: u64,
        accounts: Vec<String>,
        committee_indices: &[u64],
        block_root: &[u8],
        source_epoch: u64,
        source_root: &[u8],
        target_epoch: u64,
        target_root: &[u8],
        domain: &[u8],
    ) -> Result<Self> {
        if accounts.is_empty() {
            return Err(WalletError::ParameterMismatch(
                "at least one account is required".to_string(),
            ));
        }
        if accounts.len() != committee_indices.len() {
            return Err(WalletError::ParameterMismatch(format!(
                "{} accounts but {} committee indices",
                accounts.len(),
                committee_indices.len()
            )));
        }

        let domain = fixed("domain", domain)?;
        let template = attestation_data(
            slot,
            0,
            block_root,
            source_epoch,
            source_root,
            target_epoch,
            target_root,
        )?;

        let attestations = accounts
            .into_iter()
            .zip(committee_indices)
            .map(|(account, &committee_index)| AccountAttestation {
                account,
                data: AttestationData {
                    committee_index,
                    ..template.clone()
                },
            })
            .collect();

        Ok(SigningRequest::BeaconAttestations {
            attestations,
            domain,
        })
    }

    /// Accounts whose keys sign this request, in signature order.
    pub fn accounts(&self) -> Vec<&str> {
        match self {
            SigningRequest::Generic { account, .. }
            | SigningRequest::BeaconProposal { account, .. }
            | SigningRequest::BeaconAttestation { account, .. } => vec![account.as_str()],
            SigningRequest::BeaconAttestations { attestations, .. } => {
                attestations.iter().map(|a| a.account.as_str()).collect()
            }
        }
    }

    /// Number of signatures a successful reply carries.
    pub fn signature_count(&self) -> usize {
        match self {
            SigningRequest::BeaconAttestations { attestations, .. } => attestations.len(),
            _ => 1,
        }
    }

    pub fn domain(&self) -> &Domain {
        match self {
            SigningRequest::Generic { domain, .. }
            | SigningRequest::BeaconProposal { domain, .. }
            | SigningRequest::BeaconAttestation { domain, .. }
            | SigningRequest::BeaconAttestations { domain, .. } => domain,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, SigningRequest::BeaconAttestations { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SigningRequest::Generic { .. } => "generic",
            SigningRequest::BeaconProposal { .. } => "beacon_proposal",
            SigningRequest::BeaconAttestation { .. } => "beacon_attestation",
            SigningRequest::BeaconAttestations { .. } => "beacon_attestations",
        }
    }

    /// The error reported when the request is denied.
    pub fn denial(&self) -> WalletError {
        if self.is_batch() {
            WalletError::BatchSigningDenied
        } else {
            WalletError::SigningDenied
        }
    }
}

fn attestation_data(
    slot: u64,
    committee_index: u64,
    block_root: &[u8],
    source_epoch: u64,
    source_root: &[u8],
    target_epoch: u64,
    target_root: &[u8],
) -> Result<AttestationData> {
    Ok(AttestationData {
        slot,
        committee_index,
        beacon_block_root: fixed("beacon block root", block_root)?,
        source: Checkpoint {
            epoch: source_epoch,
            root: fixed("source root", source_root)?,
        },
        target: Checkpoint {
            epoch: target_epoch,
            root: fixed("target root", target_root)?,
        },
    })
}
