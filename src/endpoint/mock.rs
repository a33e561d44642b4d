//! In-process signer used by the tests
//!
//! Behaves like one node of the remote signing service: passphrase-gated
//! accounts, a slashing-protection record per account and deterministic
//! signatures. Failure modes simulate unreachable, hanging, denying and
//! misbehaving nodes.

use super::{Endpoint, SignerEndpoint, Verdict};
use crate::errors::EndpointError;
use crate::security::Passphrase;
use crate::signer::{
    AttestationData, BeaconBlockHeader, Signature, SigningRequest, SIGNATURE_LENGTH,
};
use crate::wallet::{AccountInfo, LockState};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

const PROPOSER_DOMAIN_TYPE: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
const ATTESTER_DOMAIN_TYPE: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockMode {
    Normal,
    /// Every call fails at the transport
    Unreachable,
    /// Every call waits forever
    Hang,
    /// Every call is refused
    AlwaysDeny,
    /// Signs with a key nobody else has
    DivergentSignature,
}

struct MockAccount {
    passphrase: Vec<u8>,
    unlocked: bool,
    public_key: Vec<u8>,
    id: Uuid,
}

/// Slashing-protection record
#[derive(Clone, Default)]
struct Protection {
    generic: HashSet<(String, [u8; 32], [u8; 32])>,
    proposals: HashMap<String, u64>,
    attestations: HashMap<String, (u64, u64)>,
}

impl Protection {
    /// Record one signing entry, or refuse it.
    fn admit(&mut self, account: &str, entry: &Entry<'_>, domain: &[u8; 32]) -> Result<(), String> {
        match entry {
            Entry::Generic(data) => {
                if domain[..4] == PROPOSER_DOMAIN_TYPE || domain[..4] == ATTESTER_DOMAIN_TYPE {
                    return Err("generic signing refused for beacon domain".to_string());
                }
                if !self.generic.insert((account.to_string(), **data, *domain)) {
                    return Err("generic request already signed".to_string());
                }
            }
            Entry::Proposal(header) => {
                if let Some(&last) = self.proposals.get(account) {
                    if header.slot <= last {
                        return Err(format!("proposal slot {} not above {}", header.slot, last));
                    }
                }
                self.proposals.insert(account.to_string(), header.slot);
            }
            Entry::Attestation(data) => {
                if let Some(&(source, target)) = self.attestations.get(account) {
                    if data.target.epoch <= target {
                        return Err(format!(
                            "attestation target {} not above {}",
                            data.target.epoch, target
                        ));
                    }
                    if data.source.epoch < source {
                        return Err(format!(
                            "attestation source {} below {}",
                            data.source.epoch, source
                        ));
                    }
                }
                self.attestations
                    .insert(account.to_string(), (data.source.epoch, data.target.epoch));
            }
        }
        Ok(())
    }
}

enum Entry<'a> {
    Generic(&'a [u8; 32]),
    Proposal(&'a BeaconBlockHeader),
    Attestation(&'a AttestationData),
}

fn entries(request: &SigningRequest) -> Vec<(&str, Entry<'_>)> {
    match request {
        SigningRequest::Generic { account, data, .. } => {
            vec![(account.as_str(), Entry::Generic(data))]
        }
        SigningRequest::BeaconProposal { account, header, .. } => {
            vec![(account.as_str(), Entry::Proposal(header))]
        }
        SigningRequest::BeaconAttestation { account, data, .. } => {
            vec![(account.as_str(), Entry::Attestation(data))]
        }
        SigningRequest::BeaconAttestations { attestations, .. } => attestations
            .iter()
            .map(|a| (a.account.as_str(), Entry::Attestation(&a.data)))
            .collect(),
    }
}

/// Digest identifying what one account signs
fn signing_root(account: &str, entry: &Entry<'_>, domain: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(account.as_bytes());
    match entry {
        Entry::Generic(data) => {
            hasher.update(b"generic");
            hasher.update(data);
        }
        Entry::Proposal(h) => {
            hasher.update(b"proposal");
            hasher.update(h.slot.to_le_bytes());
            hasher.update(h.proposer_index.to_le_bytes());
            hasher.update(h.parent_root);
            hasher.update(h.state_root);
            hasher.update(h.body_root);
        }
        Entry::Attestation(d) => {
            hasher.update(b"attestation");
            hasher.update(d.slot.to_le_bytes());
            hasher.update(d.committee_index.to_le_bytes());
            hasher.update(d.beacon_block_root);
            hasher.update(d.source.epoch.to_le_bytes());
            hasher.update(d.source.root);
            hasher.update(d.target.epoch.to_le_bytes());
            hasher.update(d.target.root);
        }
    }
    hasher.update(domain);
    hasher.finalize().into()
}

fn expand(seed: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut counter = 0u8;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update([counter]);
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

/// Composite public key every node reports for an account
pub(crate) fn mock_public_key(path: &str) -> Vec<u8> {
    expand(path.as_bytes(), 48)
}

pub(crate) fn mock_account_id(path: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, path.as_bytes())
}

pub(crate) struct MockSigner {
    endpoint: Endpoint,
    mode: Mutex<MockMode>,
    delay: Option<Duration>,
    accounts: Mutex<HashMap<String, MockAccount>>,
    protection: Mutex<Protection>,
    vectors: Mutex<HashMap<[u8; 32], Signature>>,
    sign_calls: AtomicUsize,
    unlock_calls: AtomicUsize,
    lock_calls: AtomicUsize,
    status_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MockSigner {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: Endpoint::new(host, port),
            mode: Mutex::new(MockMode::Normal),
            delay: None,
            accounts: Mutex::new(HashMap::new()),
            protection: Mutex::new(Protection::default()),
            vectors: Mutex::new(HashMap::new()),
            sign_calls: AtomicUsize::new(0),
            unlock_calls: AtomicUsize::new(0),
            lock_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Add a locked account at `path` (`<wallet>/<account>`).
    pub fn with_account(self, path: &str, passphrase: &str) -> Self {
        self.insert_account(path, passphrase.as_bytes(), false);
        self
    }

    pub fn with_unlocked_account(self, path: &str, passphrase: &str) -> Self {
        self.insert_account(path, passphrase.as_bytes(), true);
        self
    }

    pub fn with_mode(self, mode: MockMode) -> Self {
        self.set_mode(mode);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer single-account `request` with `signature` instead of the
    /// derived one.
    pub fn with_vector(self, request: &SigningRequest, signature: Signature) -> Self {
        {
            let mut vectors = self.vectors.lock().unwrap();
            for (account, entry) in entries(request) {
                vectors.insert(signing_root(account, &entry, request.domain()), signature);
            }
        }
        self
    }

    pub fn set_mode(&self, mode: MockMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn is_unlocked(&self, path: &str) -> bool {
        self.accounts
            .lock()
            .unwrap()
            .get(path)
            .map(|a| a.unlocked)
            .unwrap_or(false)
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    pub fn unlock_calls(&self) -> usize {
        self.unlock_calls.load(Ordering::SeqCst)
    }

    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn insert_account(&self, path: &str, passphrase: &[u8], unlocked: bool) {
        self.accounts.lock().unwrap().insert(
            path.to_string(),
            MockAccount {
                passphrase: passphrase.to_vec(),
                unlocked,
                public_key: mock_public_key(path),
                id: mock_account_id(path),
            },
        );
    }

    fn info(path: &str, account: &MockAccount) -> AccountInfo {
        AccountInfo::from_path(path, account.public_key.clone(), account.id)
            .unwrap_or_else(|| panic!("mock account path {} has no wallet", path))
    }

    /// Apply the configured delay and failure mode. `Some(reason)` denies.
    async fn enter(&self) -> Result<Option<String>, EndpointError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mode = *self.mode.lock().unwrap();
        match mode {
            MockMode::Unreachable => {
                Err(EndpointError::Transport("connection refused".to_string()))
            }
            MockMode::Hang => {
                std::future::pending::<()>().await;
                Err(EndpointError::Cancelled)
            }
            MockMode::AlwaysDeny => Ok(Some("denied by endpoint policy".to_string())),
            MockMode::Normal | MockMode::DivergentSignature => Ok(None),
        }
    }

    fn sign_now(&self, request: &SigningRequest) -> Verdict<Vec<Signature>> {
        let entries = entries(request);
        let domain = request.domain();

        {
            let accounts = self.accounts.lock().unwrap();
            for (path, _) in &entries {
                match accounts.get(*path) {
                    None => return Verdict::Denied(format!("unknown account {}", path)),
                    Some(account) if !account.unlocked => {
                        return Verdict::Denied(format!("account {} is locked", path))
                    }
                    Some(_) => {}
                }
            }
        }

        // Check the whole request against a scratch copy so a batch is
        // recorded entirely or not at all.
        {
            let mut protection = self.protection.lock().unwrap();
            let mut staged = protection.clone();
            for (path, entry) in &entries {
                if let Err(reason) = staged.admit(path, entry, domain) {
                    return Verdict::Denied(reason);
                }
            }
            *protection = staged;
        }

        let divergent = *self.mode.lock().unwrap() == MockMode::DivergentSignature;
        let vectors = self.vectors.lock().unwrap();
        let signatures = entries
            .iter()
            .map(|(path, entry)| {
                let root = signing_root(path, entry, domain);
                if let Some(signature) = vectors.get(&root) {
                    return *signature;
                }
                let mut seed = root.to_vec();
                if divergent {
                    seed.extend_from_slice(&self.endpoint.port.to_be_bytes());
                }
                let bytes: [u8; SIGNATURE_LENGTH] = expand(&seed, SIGNATURE_LENGTH)
                    .try_into()
                    .unwrap();
                Signature::from(bytes)
            })
            .collect();
        Verdict::Approved(signatures)
    }
}

#[async_trait]
impl SignerEndpoint for MockSigner {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn sign(
        &self,
        request: &SigningRequest,
    ) -> Result<Verdict<Vec<Signature>>, EndpointError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.enter().await? {
            return Ok(Verdict::Denied(reason));
        }
        Ok(self.sign_now(request))
    }

    async fn generate(
        &self,
        account: &str,
        passphrase: &Passphrase,
        _participants: u32,
        _threshold: u32,
    ) -> Result<Verdict<AccountInfo>, EndpointError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.enter().await? {
            return Ok(Verdict::Denied(reason));
        }
        if self.accounts.lock().unwrap().contains_key(account) {
            return Ok(Verdict::Denied("account already exists".to_string()));
        }
        self.insert_account(account, passphrase.expose(), false);
        let accounts = self.accounts.lock().unwrap();
        Ok(Verdict::Approved(Self::info(account, &accounts[account])))
    }

    async fn lock(&self, account: &str) -> Result<Verdict<()>, EndpointError> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.enter().await? {
            return Ok(Verdict::Denied(reason));
        }
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.get_mut(account) {
            Some(a) => {
                a.unlocked = false;
                Ok(Verdict::Approved(()))
            }
            None => Ok(Verdict::Denied(format!("unknown account {}", account))),
        }
    }

    async fn unlock(
        &self,
        account: &str,
        passphrase: &Passphrase,
    ) -> Result<Verdict<()>, EndpointError> {
        self.unlock_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.enter().await? {
            return Ok(Verdict::Denied(reason));
        }
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.get_mut(account) {
            Some(a) if a.passphrase.as_slice() == passphrase.expose() => {
                a.unlocked = true;
                Ok(Verdict::Approved(()))
            }
            Some(_) => Ok(Verdict::Denied("incorrect passphrase".to_string())),
            None => Ok(Verdict::Denied(format!("unknown account {}", account))),
        }
    }

    async fn lock_state(&self, account: &str) -> Result<Verdict<LockState>, EndpointError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.enter().await? {
            return Ok(Verdict::Denied(reason));
        }
        let accounts = self.accounts.lock().unwrap();
        Ok(match accounts.get(account) {
            Some(a) if a.unlocked => Verdict::Approved(LockState::Unlocked),
            Some(_) => Verdict::Approved(LockState::Locked),
            None => Verdict::Denied(format!("unknown account {}", account)),
        })
    }

    async fn list_accounts(
        &self,
        paths: &[String],
    ) -> Result<Verdict<Vec<AccountInfo>>, EndpointError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.enter().await? {
            return Ok(Verdict::Denied(reason));
        }
        let accounts = self.accounts.lock().unwrap();
        let mut infos: Vec<AccountInfo> = accounts
            .iter()
            .filter(|(path, _)| {
                paths
                    .iter()
                    .any(|p| *path == p || path.starts_with(&format!("{}/", p)))
            })
            .map(|(path, account)| Self::info(path, account))
            .collect();
        infos.sort_by(|a, b| a.path().cmp(&b.path()));
        Ok(Verdict::Approved(infos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "Wallet 1/Account 1";
    const ZERO: [u8; 32] = [0u8; 32];

    fn attestation(source: u64, target: u64) -> SigningRequest {
        SigningRequest::beacon_attestation(
            ACCOUNT, 1, 1, &ZERO, source, &ZERO, target, &ZERO, &ZERO,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_locked_account_denied() {
        let signer = MockSigner::new("signer-test01", 12001).with_account(ACCOUNT, "secret");
        let request = attestation(0, 1);
        let verdict = signer.sign(&request).await.unwrap();
        assert!(matches!(verdict, Verdict::Denied(_)));
    }

    #[tokio::test]
    async fn test_surround_and_repeat_denied() {
        let signer =
            MockSigner::new("signer-test01", 12001).with_unlocked_account(ACCOUNT, "secret");
        assert!(matches!(signer.sign(&attestation(1, 2)).await.unwrap(), Verdict::Approved(_)));
        assert!(matches!(signer.sign(&attestation(1, 2)).await.unwrap(), Verdict::Denied(_)));
        assert!(matches!(signer.sign(&attestation(0, 3)).await.unwrap(), Verdict::Denied(_)));
        assert!(matches!(signer.sign(&attestation(2, 3)).await.unwrap(), Verdict::Approved(_)));
    }

    #[tokio::test]
    async fn test_signatures_are_deterministic() {
        let a = MockSigner::new("signer-test01", 12001).with_unlocked_account(ACCOUNT, "secret");
        let b = MockSigner::new("signer-test02", 12002).with_unlocked_account(ACCOUNT, "secret");
        let request = SigningRequest::generic(ACCOUNT, &ZERO, &[0xff; 32]).unwrap();
        assert_eq!(a.sign(&request).await.unwrap(), b.sign(&request).await.unwrap());
    }

    #[tokio::test]
    async fn test_generate_then_list() {
        let signer = MockSigner::new("signer-test01", 12001);
        let passphrase = Passphrase::from("secret");
        let created = signer.generate("Wallet 1/New", &passphrase, 1, 1).await.unwrap();
        assert!(matches!(created, Verdict::Approved(_)));

        let listed = signer.list_accounts(&["Wallet 1".to_string()]).await.unwrap();
        match listed {
            Verdict::Approved(infos) => {
                assert_eq!(infos.len(), 1);
                assert_eq!(infos[0].name, "New");
            }
            other => panic!("Expected approval, got {:?}", other),
        }
    }
}
