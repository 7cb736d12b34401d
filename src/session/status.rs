use std::collections::BTreeSet;

use serde::Serialize;

use super::records::{self, SessionStatusRecord, ShardStatusRecord};
use super::states::RenterShardState;
use crate::db::records::{get_optional, list_keys, list_records_matching};
use crate::db::{keys, KvStore};
use crate::error::{Result, UploadError};
use crate::packets::ContractStatus;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ShardStatusView {
    pub index: usize,
    pub shard_hash: String,
    pub state: String,
    pub contract_id: Option<String>,
    pub host_peer_id: Option<String>,
    pub contract_status: Option<ContractStatus>,
    pub additional_info: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionStatusView {
    pub session_id: String,
    pub status: SessionStatusRecord,
    pub additional_info: String,
    pub shards: Vec<ShardStatusView>,
}

/// Reads a session's persisted status without touching any live object, so it
/// also works from a process that isn't running the upload.
pub fn query_status(store: &dyn KvStore, owner: &str, session_id: &str) -> Result<SessionStatusView> {
    let status: SessionStatusRecord =
        get_optional(store, &keys::session_key(owner, session_id, keys::STATUS))?
            .ok_or(UploadError::SessionNotFound)?;
    let additional_info = records::read_additional_info(
        store,
        &keys::session_key(owner, session_id, keys::ADDITIONAL_INFO),
    )?;

    let mut shards = Vec::with_capacity(status.shard_hashes.len());
    for (index, shard_hash) in status.shard_hashes.iter().enumerate() {
        let shard_id = keys::shard_id(session_id, shard_hash, index);
        let state = get_optional::<ShardStatusRecord>(
            store,
            &keys::renter_shard_key(owner, &shard_id, keys::STATUS),
        )?
        .map(|record| record.state)
        .unwrap_or_else(|| RenterShardState::Init.as_str().to_string());
        let contract =
            records::read_contract(store, &keys::renter_shard_key(owner, &shard_id, keys::CONTRACT))?;
        let (contract_id, host_peer_id, contract_status) = if contract.is_empty() {
            (None, None, None)
        } else {
            (
                Some(contract.meta.contract_id),
                Some(contract.meta.host_peer_id),
                Some(contract.meta.status),
            )
        };
        shards.push(ShardStatusView {
            index,
            shard_hash: shard_hash.clone(),
            state,
            contract_id,
            host_peer_id,
            contract_status,
            additional_info: records::read_additional_info(
                store,
                &keys::renter_shard_key(owner, &shard_id, keys::ADDITIONAL_INFO),
            )?,
        });
    }

    Ok(SessionStatusView {
        session_id: session_id.to_string(),
        status,
        additional_info,
        shards,
    })
}

/// Ids of every session the owner has persisted.
pub fn list_sessions(store: &dyn KvStore, owner: &str) -> Result<Vec<String>> {
    let ids: BTreeSet<String> = list_keys(store, &keys::sessions_prefix(owner))?
        .iter()
        .filter_map(|key| keys::session_id_from_key(owner, key))
        .collect();
    Ok(ids.into_iter().collect())
}

/// Host-side contract ids currently in `state`.
pub fn host_contracts_in_state(store: &dyn KvStore, owner: &str, state: &str) -> Result<Vec<String>> {
    let prefix = keys::host_shards_prefix(owner);
    let suffix = format!("/{}", keys::STATUS);
    Ok(
        list_records_matching::<ShardStatusRecord>(store, &prefix, &suffix)?
            .into_iter()
            .filter(|(_, record)| record.state == state)
            .filter_map(|(key, _)| {
                key.strip_prefix(&prefix)?
                    .strip_suffix(&suffix)
                    .map(str::to_string)
            })
            .collect(),
    )
}
