use serde::{Deserialize, Serialize};

use crate::db::{keys, records, KvStore, StoreError};
use crate::error::{Result, UploadError};
use crate::packets::{FileMeta, SignedContract};

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionStatusRecord {
    pub state: String,
    pub message: String,
    pub file_hash: String,
    pub shard_hashes: Vec<String>,
    pub last_updated: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct AdditionalInfoRecord {
    pub info: String,
    pub last_updated: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShardStatusRecord {
    pub state: String,
    pub last_updated: i64,
}

/// Reverse index entry: which file (and which shard of which session) a
/// contract id belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContractLocator {
    pub file_hash: String,
    pub session_id: String,
    pub shard_hash: String,
    pub shard_index: usize,
}

/// File metadata parked for an external signer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OfflineMetaRecord {
    pub meta: FileMeta,
    pub digest: String,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OfflineSigningRecord {
    pub signature: String, // hex
    pub signed_at: i64,
}

pub fn read_additional_info(store: &dyn KvStore, key: &str) -> Result<String> {
    Ok(records::get_optional::<AdditionalInfoRecord>(store, key)?
        .map(|record| record.info)
        .unwrap_or_default())
}

pub fn write_additional_info(store: &dyn KvStore, key: &str, info: &str) -> Result<()> {
    records::put_record(
        store,
        key,
        &AdditionalInfoRecord {
            info: info.to_string(),
            last_updated: now(),
        },
    )?;
    Ok(())
}

/// Stored contract payload, or an empty contract if none was agreed yet.
pub fn read_contract(store: &dyn KvStore, key: &str) -> Result<SignedContract> {
    match store.get(key) {
        Ok(data) => Ok(SignedContract::from_bytes(&data)?),
        Err(StoreError::NotFound(_)) => Ok(SignedContract::default()),
        Err(e) => Err(e.into()),
    }
}

pub fn write_contract(store: &dyn KvStore, key: &str, contract: &SignedContract) -> Result<()> {
    store.put(key, &contract.to_bytes()?)?;
    Ok(())
}

pub fn find_contract(store: &dyn KvStore, owner: &str, contract_id: &str) -> Result<ContractLocator> {
    records::get_optional(store, &keys::file_by_contract_key(owner, contract_id))?
        .ok_or_else(|| UploadError::ContractNotFound(contract_id.to_string()))
}
