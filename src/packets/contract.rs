use serde::{Deserialize, Serialize};

use crate::error::{Result, UploadError};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// `start` moved forward by `days`, or `None` if that leaves the i64 range.
pub fn window_end(start: i64, days: u64) -> Option<i64> {
    i64::try_from(days)
        .ok()?
        .checked_mul(SECONDS_PER_DAY)?
        .checked_add(start)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractStatus {
    #[default]
    Init,
    Completed,
    Invalid,
    Canceled,
    Closed,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Init => "INIT",
            ContractStatus::Completed => "COMPLETED",
            ContractStatus::Invalid => "INVALID",
            ContractStatus::Canceled => "CANCELED",
            ContractStatus::Closed => "CLOSED",
        }
    }
}

/// Terms of one shard's storage agreement between a renter and a host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractMetadata {
    pub contract_id: String,
    pub renter_peer_id: String,
    pub host_peer_id: String,
    pub shard_hash: String,
    pub shard_index: u32,
    pub shard_size: u64,
    pub token: String,
    pub price: u64,
    pub amount: u64,
    pub storage_start: i64, // unix seconds
    pub storage_end: i64,
    pub status: ContractStatus,
}

impl ContractMetadata {
    pub fn storage_days(&self) -> u64 {
        ((self.storage_end - self.storage_start).max(0) / SECONDS_PER_DAY) as u64
    }

    /// Pushes `storage_end` forward; nothing else changes. Zero days or a
    /// window past the i64 range is rejected and leaves the terms untouched.
    pub fn extend(&mut self, days: u64) -> Result<()> {
        if days == 0 {
            return Err(UploadError::Validation(
                "renewal needs at least one day".to_string(),
            ));
        }
        self.storage_end = window_end(self.storage_end, days).ok_or_else(|| {
            UploadError::Validation(format!("renewal of {} days is out of range", days))
        })?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SignedContract {
    pub meta: ContractMetadata,
    pub renter_signature: Vec<u8>,
    pub host_signature: Vec<u8>,
}

impl SignedContract {
    /// A default value stands in for "no contract yet".
    pub fn is_empty(&self) -> bool {
        self.meta.contract_id.is_empty()
    }

    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

/// Aggregate record registered with the settlement service once a session
/// reaches quorum.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct FileMeta {
    pub file_hash: String,
    pub owner_peer_id: String,
    pub token: String,
    pub shard_size: u64,
    pub contracts: Vec<SignedContract>,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignedFileMeta {
    pub meta: FileMeta,
    pub signature: Vec<u8>,
}

/// Per-contract status as reported by the settlement service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShardContractStatus {
    pub contract_id: String,
    pub shard_index: u32,
    pub status: ContractStatus,
}

/// Signed request the renter presents when polling storage confirmations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusQuery {
    pub file_hash: String,
    pub renter_peer_id: String,
    pub timestamp: i64,
    pub signature: Vec<u8>,
}
