use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::cache::ObjectCache;
use super::records::{self, now, ShardStatusRecord};
use super::states::{apply_host_shard_event, HostShardEvent, HostShardState};
use crate::db::records::get_optional;
use crate::db::{keys, KvStore, RecordBatch, StoreError};
use crate::error::{Result, UploadError};
use crate::logger::LOGGER;
use crate::packets::{ContractStatus, SignedContract};

/// Price inputs a host accepted when the contract was negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NegotiationTerms {
    pub price: u64,
    pub amount: u64,
    pub rate: u64,
}

/// Provider-side view of one stored shard, identified by contract id.
pub struct HostShard {
    store: Arc<dyn KvStore>,
    owner: String,
    contract_id: String,
    terms: NegotiationTerms,
    state: Mutex<HostShardState>,
    scope: CancellationToken,
}

impl HostShard {
    pub fn obtain(
        cache: &ObjectCache,
        store: Arc<dyn KvStore>,
        parent: &CancellationToken,
        owner: &str,
        contract_id: &str,
        terms: NegotiationTerms,
    ) -> Result<Arc<Self>> {
        cache
            .host_shards
            .get_or_try_insert_with(ObjectCache::key(owner, contract_id), || {
                let state = Self::stored_state(&*store, owner, contract_id)?
                    .unwrap_or(HostShardState::Init);
                Ok::<_, UploadError>(Self {
                    store,
                    owner: owner.to_string(),
                    contract_id: contract_id.to_string(),
                    terms,
                    state: Mutex::new(state),
                    scope: parent.child_token(),
                })
            })
    }

    pub fn stored_state(
        store: &dyn KvStore,
        owner: &str,
        contract_id: &str,
    ) -> Result<Option<HostShardState>> {
        let key = keys::host_shard_key(owner, contract_id, keys::STATUS);
        let Some(record) = get_optional::<ShardStatusRecord>(store, &key)? else {
            return Ok(None);
        };
        let state = HostShardState::parse(&record.state).ok_or_else(|| StoreError::Corrupt {
            key,
            reason: format!("unknown shard state {}", record.state),
        })?;
        Ok(Some(state))
    }

    fn key(&self, record: &str) -> String {
        keys::host_shard_key(&self.owner, &self.contract_id, record)
    }

    fn fire(&self, event: HostShardEvent, contract: Option<&SignedContract>) -> Result<()> {
        let mut state = self.state.lock();
        let next = apply_host_shard_event(*state, event)?;

        let mut batch = RecordBatch::new().put(
            self.key(keys::STATUS),
            &ShardStatusRecord {
                state: next.as_str().to_string(),
                last_updated: now(),
            },
        )?;
        if let Some(contract) = contract {
            batch = batch.put_raw(self.key(keys::CONTRACT), contract.to_bytes()?);
        }
        batch.commit(&*self.store)?;

        let previous = std::mem::replace(&mut *state, next);
        drop(state);
        if matches!(next, HostShardState::Complete | HostShardState::Error) {
            self.scope.cancel();
        }
        LOGGER.shard(&format!(
            "Host contract {}: {} -> {}",
            self.contract_id, previous, next
        ));
        Ok(())
    }

    pub fn contract(&self, contract: &SignedContract) -> Result<()> {
        self.fire(HostShardEvent::ToContract, Some(contract))
    }

    /// Callers check [`HostShard::is_contract_status`] first; a repeated cheque
    /// is rejected by the transition table.
    pub fn receive_pay_cheque(&self) -> Result<()> {
        self.fire(HostShardEvent::ToPaid, None)
    }

    pub fn complete(&self) -> Result<()> {
        self.fire(HostShardEvent::ToComplete, None)
    }

    pub fn error(&self, reason: &str) -> Result<()> {
        self.fire(HostShardEvent::ToError, None)?;
        self.update_additional_info(reason)
    }

    pub fn is_contract_status(&self) -> bool {
        self.state() == HostShardState::Contract
    }

    pub fn contracts(&self) -> Result<SignedContract> {
        records::read_contract(&*self.store, &self.key(keys::CONTRACT))
    }

    pub fn update_contracts_status(&self) -> Result<()> {
        let mut contract = self.contracts()?;
        if contract.is_empty() {
            return Err(UploadError::ContractNotFound(self.contract_id.clone()));
        }
        contract.meta.status = ContractStatus::Completed;
        records::write_contract(&*self.store, &self.key(keys::CONTRACT), &contract)
    }

    pub fn extend_contract(&self, days: u64) -> Result<SignedContract> {
        let mut contract = self.contracts()?;
        if contract.is_empty() {
            return Err(UploadError::ContractNotFound(self.contract_id.clone()));
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

    pub fn terms(&self) -> NegotiationTerms {
        self.terms
    }

    pub fn state(&self) -> HostShardState {
        *self.state.lock()
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }
}

impl fmt::Debug for HostShard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostShard")
            .field("contract_id", &self.contract_id)
            .field("terms", &self.terms)
            .field("state", &self.state())
            .finish()
    }
}
