use serde::{Deserialize, Serialize};

use super::contract::SignedContract;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeRole {
    Host,
    Renter,
}

/// Body of the renter's "upload init" call to a host.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UploadInitRequest {
    pub session_id: String,
    pub file_hash: String,
    pub shard_hash: String,
    pub shard_index: u32,
    pub contract: SignedContract,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum AckResult {
    Accepted(SignedContract),
    Rejected(String),
}

/// The host's asynchronous answer to an upload init, sent back over the
/// "receive contract" route.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ContractAck {
    pub contract_id: String,
    pub session_id: String,
    pub shard_hash: String,
    pub shard_index: u32,
    pub result: AckResult,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StorageInfo {
    pub peer_id: String,
    pub role: NodeRole,
    pub supported_tokens: Vec<String>,
    pub price: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PayChequeNotice {
    pub contract_id: String,
    pub amount: u128,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RenewRequest {
    pub contract_id: String,
    pub days: u64,
}

/// Empty response body for routes that only acknowledge.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Ack {
    pub ok: bool,
}
