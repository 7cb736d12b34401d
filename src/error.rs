use thiserror::Error;

use crate::db::StoreError;
use crate::session::TransitionError;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("session not found")]
    SessionNotFound,

    #[error("contract {0} not found")]
    ContractNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("failed to find more valid sp, please try again later")]
    HostsExhausted,

    #[error("failed to find a valid storage provider in time, please consider raising the price")]
    HostSearchTimeout,

    #[error("host {0} did not acknowledge the contract in time")]
    HostTimeout(String),

    #[error("host {host} rejected the contract: {reason}")]
    Negotiation { host: String, reason: String },

    #[error("remote call {route} to {peer} failed: {reason}")]
    Remote {
        peer: String,
        route: String,
        reason: String,
    },

    #[error("insufficient balance: {required} required, {available} available")]
    InsufficientBalance { required: u128, available: u128 },

    #[error("settlement failed: {0}")]
    Settlement(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("encoding error: {0}")]
    Codec(String),

    #[error("shard negotiation failed: {0}")]
    ShardFailed(String),

    #[error("timeout: failed to setup contract: {0}")]
    ContractSetupTimeout(String),

    #[error("timeout: failed to confirm storage: {0}")]
    StorageConfirmTimeout(String),

    #[error("no offline signature is pending for session {0}")]
    NoPendingSignature(String),

    #[error("context canceled")]
    Cancelled,
}

impl From<serde_json::Error> for UploadError {
    fn from(err: serde_json::Error) -> Self {
        UploadError::Codec(err.to_string())
    }
}

impl From<bincode::Error> for UploadError {
    fn from(err: bincode::Error) -> Self {
        UploadError::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
