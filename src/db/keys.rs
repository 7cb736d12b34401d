//! Persisted key layout. Everything a node writes lives under `/<owner>/`.

const RENTER_SESSIONS: &str = "renter/sessions";
const RENTER_SHARDS: &str = "renter/shards";
const HOST_SHARDS: &str = "host/shards";
const FILE_BY_CONTRACT: &str = "renter/file-by-contract";

pub const STATUS: &str = "status";
pub const ADDITIONAL_INFO: &str = "additional-info";
pub const CONTRACT: &str = "contract";
pub const OFFLINE_META: &str = "offline-meta";
pub const OFFLINE_SIGNING: &str = "offline-signing";

pub fn session_prefix(owner: &str, session_id: &str) -> String {
    format!("/{}/{}/{}/", owner, RENTER_SESSIONS, session_id)
}

pub fn session_key(owner: &str, session_id: &str, record: &str) -> String {
    format!("{}{}", session_prefix(owner, session_id), record)
}

pub fn sessions_prefix(owner: &str) -> String {
    format!("/{}/{}/", owner, RENTER_SESSIONS)
}

pub fn renter_shard_key(owner: &str, shard_id: &str, record: &str) -> String {
    format!("/{}/{}/{}/{}", owner, RENTER_SHARDS, shard_id, record)
}

pub fn host_shard_key(owner: &str, contract_id: &str, record: &str) -> String {
    format!("/{}/{}/{}/{}", owner, HOST_SHARDS, contract_id, record)
}

pub fn host_shards_prefix(owner: &str) -> String {
    format!("/{}/{}/", owner, HOST_SHARDS)
}

pub fn file_by_contract_key(owner: &str, contract_id: &str) -> String {
    format!("/{}/{}/{}", owner, FILE_BY_CONTRACT, contract_id)
}

/// Renter-side shard identity: `<session>:<shard hash>:<index>`.
pub fn shard_id(session_id: &str, shard_hash: &str, index: usize) -> String {
    format!("{}:{}:{}", session_id, shard_hash, index)
}

/// Session id embedded in a `/<owner>/renter/sessions/<id>/...` key.
pub fn session_id_from_key(owner: &str, key: &str) -> Option<String> {
    key.strip_prefix(&sessions_prefix(owner))?
        .split('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
