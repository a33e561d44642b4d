//! gRPC transport to one signer node
//!
//! Implements [`SignerEndpoint`] over the services defined in the proto
//! files: `Signer`, `AccountManager` and `Lister`.

use crate::api::auth::Credentials;
use crate::endpoint::{Endpoint, SignerEndpoint, Verdict};
use crate::errors::{error_chain, EndpointError, Result, WalletError};
use crate::security::Passphrase;
use crate::signer::{AttestationData, BeaconBlockHeader, Signature, SigningRequest};
use crate::wallet::{AccountInfo, LockState};
use async_trait::async_trait;
use std::time::Duration;
use tonic::transport::Channel;
use tracing::debug;
use uuid::Uuid;

// Include generated protobuf code
pub mod proto {
    pub mod common {
        tonic::include_proto!("dirk.common");
    }

    pub mod signer {
        tonic::include_proto!("dirk.signer");
    }

    pub mod accounts {
        tonic::include_proto!("dirk.accounts");
    }

    pub mod lister {
        tonic::include_proto!("dirk.lister");
    }
}

use proto::accounts::account_manager_client::AccountManagerClient;
use proto::accounts::{
    AccountStatusRequest, GenerateRequest, LockAccountRequest, UnlockAccountRequest,
};
use proto::common::ResponseState;
use proto::lister::lister_client::ListerClient;
use proto::lister::ListAccountsRequest;
use proto::signer::signer_client::SignerClient;
use proto::signer::{
    SignBeaconAttestationRequest, SignBeaconAttestationsRequest, SignBeaconProposalRequest,
    SignRequest, SignResponse,
};

impl From<&BeaconBlockHeader> for proto::signer::BeaconBlockHeader {
    fn from(header: &BeaconBlockHeader) -> Self {
        Self {
            slot: header.slot,
            proposer_index: header.proposer_index,
            parent_root: header.parent_root.to_vec(),
            state_root: header.state_root.to_vec(),
            body_root: header.body_root.to_vec(),
        }
    }
}

impl From<&AttestationData> for proto::signer::AttestationData {
    fn from(data: &AttestationData) -> Self {
        Self {
            slot: data.slot,
            committee_index: data.committee_index,
            beacon_block_root: data.beacon_block_root.to_vec(),
            source: Some(proto::signer::Checkpoint {
                epoch: data.source.epoch,
                root: data.source.root.to_vec(),
            }),
            target: Some(proto::signer::Checkpoint {
                epoch: data.target.epoch,
                root: data.target.root.to_vec(),
            }),
        }
    }
}

/// Map a node's response state. `FAILED` counts as an unreachable node.
fn verdict<T>(
    state: ResponseState,
    message: &str,
    approved: impl FnOnce() -> std::result::Result<T, EndpointError>,
) -> std::result::Result<Verdict<T>, EndpointError> {
    match state {
        ResponseState::Succeeded => approved().map(Verdict::Approved),
        ResponseState::Denied => Ok(Verdict::Denied(if message.is_empty() {
            "denied".to_string()
        } else {
            message.to_string()
        })),
        ResponseState::Failed => Err(EndpointError::Failed(message.to_string())),
        ResponseState::Unknown => Err(EndpointError::MalformedResponse(
            "response state not set".to_string(),
        )),
    }
}

fn account_info(
    path: &str,
    public_key: Vec<u8>,
    uuid: &[u8],
) -> std::result::Result<AccountInfo, EndpointError> {
    let id = Uuid::from_slice(uuid)
        .map_err(|e| EndpointError::MalformedResponse(format!("account {}: {}", path, e)))?;
    AccountInfo::from_path(path, public_key, id).ok_or_else(|| {
        EndpointError::MalformedResponse(format!("invalid account path \"{}\"", path))
    })
}

fn single_signature(
    response: SignResponse,
) -> std::result::Result<Verdict<Vec<Signature>>, EndpointError> {
    verdict(response.state(), &response.message, || {
        Ok(vec![Signature::from_bytes(&response.signature)?])
    })
}

/// Client for one signer node over a tonic channel
///
/// The generated clients are cloned per call; clones share the underlying
/// channel.
#[derive(Clone)]
pub struct GrpcEndpoint {
    endpoint: Endpoint,
    signer: SignerClient<Channel>,
    accounts: AccountManagerClient<Channel>,
    lister: ListerClient<Channel>,
}

impl GrpcEndpoint {
    /// Configure a TLS channel to `endpoint`. Nothing is dialled until the
    /// first call.
    pub fn connect_lazy(
        endpoint: Endpoint,
        credentials: &Credentials,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let channel = tonic::transport::Endpoint::from_shared(endpoint.uri())?
            .tls_config(credentials.tls_config(&endpoint.host))
            .map_err(|e| WalletError::InvalidCredentials(error_chain(&e)))?
            .connect_timeout(connect_timeout)
            .connect_lazy();
        debug!("Configured channel to {}", endpoint);
        Ok(Self::from_channel(endpoint, channel))
    }

    /// Use an existing channel, e.g. a plaintext one in tests.
    pub fn from_channel(endpoint: Endpoint, channel: Channel) -> Self {
        Self {
            endpoint,
            signer: SignerClient::new(channel.clone()),
            accounts: AccountManagerClient::new(channel.clone()),
            lister: ListerClient::new(channel),
        }
    }
}

#[async_trait]
impl SignerEndpoint for GrpcEndpoint {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn sign(
        &self,
        request: &SigningRequest,
    ) -> std::result::Result<Verdict<Vec<Signature>>, EndpointError> {
        let mut client = self.signer.clone();
        match request {
            SigningRequest::Generic {
                account,
                data,
                domain,
            } => {
                let response = client
                    .sign(SignRequest {
                        account: account.clone(),
                        data: data.to_vec(),
                        domain: domain.to_vec(),
                    })
                    .await?
                    .into_inner();
                single_signature(response)
            }
            SigningRequest::BeaconProposal {
                account,
                header,
                domain,
            } => {
                let response = client
                    .sign_beacon_proposal(SignBeaconProposalRequest {
                        account: account.clone(),
                        data: Some(header.into()),
                        domain: domain.to_vec(),
                    })
                    .await?
                    .into_inner();
                single_signature(response)
            }
            SigningRequest::BeaconAttestation {
                account,
                data,
                domain,
            } => {
                let response = client
                    .sign_beacon_attestation(SignBeaconAttestationRequest {
                        account: account.clone(),
                        data: Some(data.into()),
                        domain: domain.to_vec(),
                    })
                    .await?
                    .into_inner();
                single_signature(response)
            }
            SigningRequest::BeaconAttestations {
                attestations,
                domain,
            } => {
                let requests = attestations
                    .iter()
                    .map(|a| SignBeaconAttestationRequest {
                        account: a.account.clone(),
                        data: Some((&a.data).into()),
                        domain: domain.to_vec(),
                    })
                    .collect();
                let responses = client
                    .sign_beacon_attestations(SignBeaconAttestationsRequest { requests })
                    .await?
                    .into_inner()
                    .responses;

                if responses.len() != attestations.len() {
                    return Err(EndpointError::MalformedResponse(format!(
                        "expected {} responses, got {}",
                        attestations.len(),
                        responses.len()
                    )));
                }
                // One refused entry refuses the batch.
                if let Some(denied) = responses
                    .iter()
                    .find(|r| r.state() == ResponseState::Denied)
                {
                    return verdict(ResponseState::Denied, &denied.message, || Ok(Vec::new()));
                }
                let mut signatures = Vec::with_capacity(responses.len());
                for response in responses {
                    match single_signature(response)? {
                        Verdict::Approved(mut sig) => signatures.append(&mut sig),
                        Verdict::Denied(reason) => return Ok(Verdict::Denied(reason)),
                    }
                }
                Ok(Verdict::Approved(signatures))
            }
        }
    }

    async fn generate(
        &self,
        account: &str,
        passphrase: &Passphrase,
        participants: u32,
        threshold: u32,
    ) -> std::result::Result<Verdict<AccountInfo>, EndpointError> {
        let response = self
            .accounts
            .clone()
            .generate(GenerateRequest {
                account: account.to_string(),
                passphrase: passphrase.expose().to_vec(),
                participants,
                signing_threshold: threshold,
            })
            .await?
            .into_inner();
        verdict(response.state(), &response.message, || {
            account_info(account, response.public_key.clone(), &response.uuid)
        })
    }

    async fn lock(&self, account: &str) -> std::result::Result<Verdict<()>, EndpointError> {
        let response = self
            .accounts
            .clone()
            .lock(LockAccountRequest {
                account: account.to_string(),
            })
            .await?
            .into_inner();
        verdict(response.state(), "lock refused", || Ok(()))
    }

    async fn unlock(
        &self,
        account: &str,
        passphrase: &Passphrase,
    ) -> std::result::Result<Verdict<()>, EndpointError> {
        let response = self
            .accounts
            .clone()
            .unlock(UnlockAccountRequest {
                account: account.to_string(),
                passphrase: passphrase.expose().to_vec(),
            })
            .await?
            .into_inner();
        verdict(response.state(), "unlock refused", || Ok(()))
    }

    async fn lock_state(
        &self,
        account: &str,
    ) -> std::result::Result<Verdict<LockState>, EndpointError> {
        let response = self
            .accounts
            .clone()
            .status(AccountStatusRequest {
                account: account.to_string(),
            })
            .await?
            .into_inner();
        verdict(response.state(), "status refused", || {
            Ok(if response.unlocked {
                LockState::Unlocked
            } else {
                LockState::Locked
            })
        })
    }

    async fn list_accounts(
        &self,
        paths: &[String],
    ) -> std::result::Result<Verdict<Vec<AccountInfo>>, EndpointError> {
        let response = self
            .lister
            .clone()
            .list_accounts(ListAccountsRequest {
                paths: paths.to_vec(),
            })
            .await?
            .into_inner();
        let state = response.state();
        verdict(state, "listing refused", || {
            response
                .accounts
                .into_iter()
                // `name` carries the full `<wallet>/<account>` path
                .map(|a| account_info(&a.name, a.public_key, &a.uuid))
                .collect()
        })
    }
}
