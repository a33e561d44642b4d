//! Error types for dirk-wallet

use thiserror::Error;

/// Main error type for wallet operations
#[derive(Error, Debug)]
pub enum WalletError {
    // Local validation errors, raised before any endpoint is contacted
    #[error("{field} must be 32 bytes in length")]
    MalformedRequest { field: &'static str },

    #[error("parameter mismatch: {0}")]
    ParameterMismatch(String),

    // Remote protection outcomes
    #[error("request to obtain signature denied")]
    SigningDenied,

    #[error("request to obtain signatures denied")]
    BatchSigningDenied,

    #[error("unlock attempt failed")]
    UnlockFailed,

    // Account management errors
    #[error("no account with name \"{0}\"")]
    AccountNotFound(String),

    #[error("account \"{0}\" already exists")]
    DuplicateAccount(String),

    #[error("invalid account name: {0}")]
    InvalidAccountName(String),

    #[error("account creation failed: {0}")]
    AccountCreationFailed(String),

    // Endpoint errors
    #[error("not enough signer endpoints responded: {approved} of {required} required ({detail})")]
    Unavailable {
        approved: usize,
        required: usize,
        detail: String,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    // Setup errors
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    // Internal errors
    #[error("internal error: {0}")]
    InternalError(String),
}

impl WalletError {
    /// Whether the remote protection layer refused the request.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            WalletError::SigningDenied | WalletError::BatchSigningDenied | WalletError::UnlockFailed
        )
    }

    /// Whether the caller's context ended the request.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WalletError::Cancelled | WalletError::DeadlineExceeded)
    }

    /// Whether the request was rejected locally without a network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WalletError::MalformedRequest { .. }
                | WalletError::ParameterMismatch(_)
                | WalletError::InvalidAccountName(_)
        )
    }
}

impl From<tonic::transport::Error> for WalletError {
    fn from(err: tonic::transport::Error) -> Self {
        WalletError::InvalidEndpoint(error_chain(&err))
    }
}

/// Render an error with its sources, outermost first.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Failure of a single endpoint call.
///
/// These never reach the caller directly; the dispatcher turns them into
/// `Unreachable` outcomes that only count against the approval threshold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint failed to process request: {0}")]
    Failed(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("cancelled")]
    Cancelled,
}

/// Convert tonic::Status from a signer node into an endpoint error
impl From<tonic::Status> for EndpointError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::DeadlineExceeded => EndpointError::DeadlineExceeded,
            tonic::Code::Cancelled => EndpointError::Cancelled,
            tonic::Code::Unavailable | tonic::Code::Unknown => {
                EndpointError::Transport(status.message().to_string())
            }
            _ => EndpointError::Failed(format!("{:?}: {}", status.code(), status.message())),
        }
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;
