use std::sync::Arc;

use super::orchestrator::Uploader;
use crate::error::{Result, UploadError};
use crate::logger::LOGGER;
use crate::network::{call_json, routes};
use crate::packets::{Ack, RenewRequest, SignedContract};
use crate::session::records::find_contract;
use crate::session::RenterShard;

impl Uploader {
    /// Extends a stored contract by `days`: the host is told first, then the
    /// local copy's `storage_end` moves. The shard's state is left alone.
    pub async fn renew_shard(&self, contract_id: &str, days: u64) -> Result<SignedContract> {
        let locator = find_contract(&*self.store, self.peer_id(), contract_id)?;
        let session = self.session(&locator.session_id, &locator.file_hash, &[])?;
        let shard = RenterShard::obtain(
            &self.cache,
            Arc::clone(&self.store),
            session.scope(),
            self.peer_id(),
            &locator.session_id,
            &locator.file_hash,
            &locator.shard_hash,
            locator.shard_index,
        )?;

        let contract = shard.contracts()?;
        if contract.is_empty() {
            return Err(UploadError::ContractNotFound(contract_id.to_string()));
        }
        // Checked here before the host is asked.
        contract.meta.clone().extend(days)?;
        let host = contract.meta.host_peer_id.clone();
        let ack: Ack = call_json(
            &*self.remote,
            &host,
            routes::RENEW,
            &RenewRequest {
                contract_id: contract_id.to_string(),
                days,
            },
            self.config.upload_init_timeout(),
        )
        .await?;
        if !ack.ok {
            return Err(UploadError::Negotiation {
                host,
                reason: "renewal refused".to_string(),
            });
        }

        let renewed = shard.extend_contract(days)?;
        if session.state().is_terminal() {
            self.cache.evict_session(&session);
        }
        LOGGER.shard(&format!(
            "Contract {} renewed by {} days, storage ends at {}",
            contract_id, days, renewed.meta.storage_end
        ));
        Ok(renewed)
    }
}
