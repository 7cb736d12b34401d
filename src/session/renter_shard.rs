use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::cache::ObjectCache;
use super::records::{self, now, ContractLocator, ShardStatusRecord};
use super::states::{apply_renter_shard_event, RenterShardEvent, RenterShardState};
use crate::db::records::get_optional;
use crate::db::{keys, KvStore, RecordBatch, StoreError};
use crate::error::{Result, UploadError};
use crate::logger::LOGGER;
use crate::packets::{ContractStatus, SignedContract};

/// Renter's view of one shard's contract negotiation.
pub struct RenterShard {
    store: Arc<dyn KvStore>,
    owner: String,
    id: String,
    session_id: String,
    file_hash: String,
    shard_hash: String,
    index: usize,
    state: Mutex<RenterShardState>,
    scope: CancellationToken,
}

impl RenterShard {
    #[allow(clippy::too_many_arguments)]
    pub fn obtain(
        cache: &ObjectCache,
        store: Arc<dyn KvStore>,
        parent: &CancellationToken,
        owner: &str,
        session_id: &str,
        file_hash: &str,
        shard_hash: &str,
        index: usize,
    ) -> Result<Arc<Self>> {
        let id = keys::shard_id(session_id, shard_hash, index);
        cache
            .renter_shards
            .get_or_try_insert_with(ObjectCache::key(owner, &id), || {
                let state = Self::stored_state(&*store, owner, &id)?
                    .unwrap_or(RenterShardState::Init);
                Ok::<_, UploadError>(Self {
                    store,
                    owner: owner.to_string(),
                    id,
                    session_id: session_id.to_string(),
                    file_hash: file_hash.to_string(),
                    shard_hash: shard_hash.to_string(),
                    index,
                    state: Mutex::new(state),
                    scope: parent.child_token(),
                })
            })
    }

    /// Persisted state of a shard, `None` if it never transitioned.
    pub fn stored_state(
        store: &dyn KvStore,
        owner: &str,
        shard_id: &str,
    ) -> Result<Option<RenterShardState>> {
        let key = keys::renter_shard_key(owner, shard_id, keys::STATUS);
        let Some(record) = get_optional::<ShardStatusRecord>(store, &key)? else {
            return Ok(None);
        };
        let state = RenterShardState::parse(&record.state).ok_or_else(|| StoreError::Corrupt {
            key,
            reason: format!("unknown shard state {}", record.state),
        })?;
        Ok(Some(state))
    }

    fn key(&self, record: &str) -> String {
        keys::renter_shard_key(&self.owner, &self.id, record)
    }

    fn status_batch(&self, state: RenterShardState) -> std::result::Result<RecordBatch, StoreError> {
        RecordBatch::new().put(
            self.key(keys::STATUS),
            &ShardStatusRecord {
                state: state.as_str().to_string(),
                last_updated: now(),
            },
        )
    }

    /// Records the agreed contract. Status, payload and the contract-id
    /// reverse index are written together.
    pub fn contract(&self, contract: &SignedContract) -> Result<()> {
        let mut state = self.state.lock();
        let next = apply_renter_shard_event(*state, RenterShardEvent::ToContract)?;

        self.status_batch(next)?
            .put_raw(self.key(keys::CONTRACT), contract.to_bytes()?)
            .put(
                keys::file_by_contract_key(&self.owner, &contract.meta.contract_id),
                &ContractLocator {
                    file_hash: self.file_hash.clone(),
                    session_id: self.session_id.clone(),
                    shard_hash: self.shard_hash.clone(),
                    shard_index: self.index,
                },
            )?
            .commit(&*self.store)?;

        *state = next;
        LOGGER.shard(&format!(
            "Shard {} contracted with {} ({})",
            self.index, contract.meta.host_peer_id, contract.meta.contract_id
        ));
        Ok(())
    }

    pub fn error(&self, reason: &str) -> Result<()> {
        let mut state = self.state.lock();
        let next = apply_renter_shard_event(*state, RenterShardEvent::ToError)?;

        self.status_batch(next)?
            .put(
                self.key(keys::ADDITIONAL_INFO),
                &records::AdditionalInfoRecord {
                    info: reason.to_string(),
                    last_updated: now(),
                },
            )?
            .commit(&*self.store)?;

        *state = next;
        drop(state);
        self.scope.cancel();
        LOGGER.shard(&format!("Shard {} failed: {}", self.index, reason));
        Ok(())
    }

    pub fn contracts(&self) -> Result<SignedContract> {
        records::read_contract(&*self.store, &self.key(keys::CONTRACT))
    }

    /// Marks the stored contract COMPLETED once settlement confirms storage.
    pub fn update_contracts_status(&self) -> Result<()> {
        let mut contract = self.contracts()?;
        if contract.is_empty() {
            return Err(UploadError::ContractNotFound(self.id.clone()));
        }
        contract.meta.status = ContractStatus::Completed;
        records::write_contract(&*self.store, &self.key(keys::CONTRACT), &contract)
    }

    /// Extends the storage window by `days`. The shard state is untouched.
    pub fn extend_contract(&self, days: u64) -> Result<SignedContract> {
        let mut contract = self.contracts()?;
        if contract.is_empty() {
            return Err(UploadError::ContractNotFound(self.id.clone()));
        }
        contract.meta.extend(days)?;
        records::write_contract(&*self.store, &self.key(keys::CONTRACT), &contract)?;
        Ok(contract)
    }

    pub fn additional_info(&self) -> Result<String> {
        records::read_additional_info(&*self.store, &self.key(keys::ADDITIONAL_INFO))
    }

    pub fn update_additional_info(&self, info: &str) -> Result<()> {
        records::write_additional_info(&*self.store, &self.key(keys::ADDITIONAL_INFO), info)
    }

    pub fn state(&self) -> RenterShardState {
        *self.state.lock()
    }

    pub fn is_contracted(&self) -> bool {
        self.state() == RenterShardState::Contract
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn shard_hash(&self) -> &str {
        &self.shard_hash
    }

    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }
}

impl fmt::Debug for RenterShard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenterShard")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
