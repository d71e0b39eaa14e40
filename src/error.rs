// src/error.rs
use std::fmt;

use ethers::types::H256;
use thiserror::Error;

/// JSON-RPC error code wallets return when the user declines a prompt (EIP-1193).
pub const USER_REJECTED_REQUEST_CODE: i64 = 4001;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response for {method}: {source}")]
    InvalidResponse {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl TransportError {
    pub fn is_user_rejected(&self) -> bool {
        matches!(self, TransportError::Rpc { code, .. } if *code == USER_REJECTED_REQUEST_CODE)
    }
}

impl From<jsonrpsee::core::Error> for TransportError {
    fn from(err: jsonrpsee::core::Error) -> Self {
        match err {
            jsonrpsee::core::Error::Call(obj) => TransportError::Rpc {
                code: obj.code() as i64,
                message: obj.message().to_string(),
                data: obj.data().map(|d| d.get().to_string()),
            },
            other => TransportError::Transport(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("User rejected the request")]
    UserRejected,

    #[error("Signer error: {0}")]
    Signer(String),
}

impl From<TransportError> for SignerError {
    fn from(err: TransportError) -> Self {
        if err.is_user_rejected() {
            SignerError::UserRejected
        } else {
            SignerError::Signer(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Account not found")]
    AccountNotFound,

    #[error("Account error: {0}")]
    Account(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("Malformed paymaster data: {0}")]
    MalformedPaymasterData(String),

    #[error("User operation {hash:?} was not mined after {attempts} attempts")]
    ConfirmationTimeout { hash: H256, attempts: u32 },
}

/// Stage of the send flow at which a failure surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStage {
    Building,
    Estimating,
    CheckingSponsorship,
    Sponsoring,
    Signing,
    Submitting,
    Confirming,
}

impl fmt::Display for SendStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendStage::Building => "building",
            SendStage::Estimating => "estimating",
            SendStage::CheckingSponsorship => "checking sponsorship",
            SendStage::Sponsoring => "sponsoring",
            SendStage::Signing => "signing",
            SendStage::Submitting => "submitting",
            SendStage::Confirming => "confirming",
        };
        f.write_str(name)
    }
}

/// Coarse classification callers use to decide between retrying, re-prompting and aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Configuration,
    Account,
    UserRejected,
    Signer,
    Rpc,
    Timeout,
}

#[derive(Error, Debug)]
#[error("User operation failed while {stage}: {source}")]
pub struct SendError {
    pub stage: SendStage,
    #[source]
    pub source: ClientError,
}

impl SendError {
    pub fn new(stage: SendStage, source: ClientError) -> Self {
        Self { stage, source }
    }

    pub fn kind(&self) -> FailureKind {
        match &self.source {
            ClientError::Configuration(_) => FailureKind::Configuration,
            ClientError::AccountNotFound | ClientError::Account(_) => FailureKind::Account,
            ClientError::Signer(SignerError::UserRejected) => FailureKind::UserRejected,
            ClientError::Transport(e) if e.is_user_rejected() => FailureKind::UserRejected,
            ClientError::Signer(_) => FailureKind::Signer,
            ClientError::Transport(_) | ClientError::MalformedPaymasterData(_) => FailureKind::Rpc,
            ClientError::ConfirmationTimeout { .. } => FailureKind::Timeout,
        }
    }

    pub fn is_user_rejected(&self) -> bool {
        self.kind() == FailureKind::UserRejected
    }
}
