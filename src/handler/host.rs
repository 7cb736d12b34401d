use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::crypto::signature::{countersign_contract, verify_renter_signature};
use crate::crypto::NodeIdentity;
use crate::db::KvStore;
use crate::error::{Result, UploadError};
use crate::logger::LOGGER;
use crate::network::{call_json, routes, RemoteCall, RouteHandler};
use crate::packets::{
    Ack, AckResult, ContractAck, NodeRole, PayChequeNotice, RenewRequest, SignedContract,
    StorageInfo, UploadInitRequest,
};
use crate::session::status::host_contracts_in_state;
use crate::session::{HostShard, HostShardState, NegotiationTerms, ObjectCache};
use crate::settlement::pricing::nominal_amount;
use crate::settlement::SettlementService;

/// What this node asks for its storage.
#[derive(Debug, Clone)]
pub struct StorageOffer {
    pub price: u64,
    pub supported_tokens: Vec<String>,
}

/// Storage-provider side of the negotiation.
#[derive(Clone)]
pub struct HostHandler {
    identity: Arc<NodeIdentity>,
    store: Arc<dyn KvStore>,
    cache: Arc<ObjectCache>,
    remote: Arc<dyn RemoteCall>,
    settlement: Arc<dyn SettlementService>,
    offer: StorageOffer,
    ack_timeout: Duration,
    root: CancellationToken,
}

impl HostHandler {
    pub fn new(
        identity: Arc<NodeIdentity>,
        store: Arc<dyn KvStore>,
        cache: Arc<ObjectCache>,
        remote: Arc<dyn RemoteCall>,
        settlement: Arc<dyn SettlementService>,
        offer: StorageOffer,
        config: &Config,
    ) -> Self {
        Self {
            identity,
            store,
            cache,
            remote,
            settlement,
            offer,
            ack_timeout: config.upload_init_timeout(),
            root: CancellationToken::new(),
        }
    }

    pub fn peer_id(&self) -> &str {
        self.identity.peer_id()
    }

    pub fn storage_info(&self) -> StorageInfo {
        StorageInfo {
            peer_id: self.identity.peer_id().to_string(),
            role: NodeRole::Host,
            supported_tokens: self.offer.supported_tokens.clone(),
            price: self.offer.price,
        }
    }

    fn shard(&self, contract_id: &str, terms: NegotiationTerms) -> Result<Arc<HostShard>> {
        HostShard::obtain(
            &self.cache,
            Arc::clone(&self.store),
            &self.root,
            self.identity.peer_id(),
            contract_id,
            terms,
        )
    }

    /// Contract a renter may act on, or `ContractNotFound`.
    fn owned_contract(&self, from: &str, contract_id: &str) -> Result<(Arc<HostShard>, SignedContract)> {
        if HostShard::stored_state(&*self.store, self.identity.peer_id(), contract_id)?.is_none() {
            return Err(UploadError::ContractNotFound(contract_id.to_string()));
        }
        let shard = self.shard(contract_id, NegotiationTerms::default())?;
        let contract = shard.contracts()?;
        if contract.is_empty() || contract.meta.renter_peer_id != from {
            return Err(UploadError::ContractNotFound(contract_id.to_string()));
        }
        Ok((shard, contract))
    }

    fn validate(&self, from: &str, request: &UploadInitRequest) -> Result<()> {
        let meta = &request.contract.meta;
        let invalid = |reason: String| -> Result<()> { Err(UploadError::Validation(reason)) };

        if meta.contract_id.is_empty() {
            return invalid("missing contract id".to_string());
        }
        if meta.renter_peer_id != from {
            return invalid("contract creator is not the caller".to_string());
        }
        if meta.host_peer_id != self.identity.peer_id() {
            return invalid("contract is addressed to another provider".to_string());
        }
        if meta.shard_hash != request.shard_hash || meta.shard_index != request.shard_index {
            return invalid("contract does not match the requested shard".to_string());
        }
        if !self.offer.supported_tokens.contains(&meta.token) {
            return invalid(format!("token {} not supported", meta.token));
        }
        if meta.price < self.offer.price {
            return invalid(format!(
                "price {} is below the asking price {}",
                meta.price, self.offer.price
            ));
        }
        if meta.storage_end <= meta.storage_start {
            return invalid("storage window is empty".to_string());
        }
        let minimum = nominal_amount(meta.price, meta.shard_size, meta.storage_days());
        if meta.amount < minimum {
            return invalid(format!(
                "amount {} is below the calculated minimum {}",
                meta.amount, minimum
            ));
        }
        verify_renter_signature(&request.contract)
    }

    /// Checks the offer and answers right away; the countersigned contract
    /// (or the reason it couldn't be stored) follows on the receive-contract
    /// route. A rejected offer leaves no trace here.
    pub async fn upload_init(&self, from: &str, request: UploadInitRequest) -> Result<Ack> {
        self.validate(from, &request)?;
        let meta = &request.contract.meta;
        if HostShard::stored_state(&*self.store, self.identity.peer_id(), &meta.contract_id)?.is_some() {
            return Err(UploadError::Validation(format!(
                "contract {} already exists",
                meta.contract_id
            )));
        }
        let rate = self.settlement.exchange_rate(&meta.token).await?;
        let terms = NegotiationTerms {
            price: meta.price,
            amount: meta.amount,
            rate,
        };

        let handler = self.clone();
        let renter = from.to_string();
        tokio::spawn(async move {
            handler.accept(&renter, request, terms).await;
        });
        Ok(Ack { ok: true })
    }

    async fn accept(&self, renter: &str, request: UploadInitRequest, terms: NegotiationTerms) {
        let mut contract = request.contract;
        let contract_id = contract.meta.contract_id.clone();

        let stored = countersign_contract(&self.identity, &mut contract)
            .and_then(|_| self.shard(&contract_id, terms))
            .and_then(|shard| shard.contract(&contract));
        let result = match stored {
            Ok(()) => {
                LOGGER.shard(&format!(
                    "Accepted contract {} for shard {} from {}",
                    contract_id, request.shard_index, renter
                ));
                AckResult::Accepted(contract)
            }
            Err(e) => {
                LOGGER.error(&format!("Failed to store contract {}: {}", contract_id, e));
                self.cache.evict_host_shard(self.identity.peer_id(), &contract_id);
                AckResult::Rejected(e.to_string())
            }
        };

        let ack = ContractAck {
            contract_id: contract_id.clone(),
            session_id: request.session_id,
            shard_hash: request.shard_hash,
            shard_index: request.shard_index,
            result,
        };
        let sent: Result<Ack> = call_json(
            &*self.remote,
            renter,
            routes::RECV_CONTRACT,
            &ack,
            self.ack_timeout,
        )
        .await;
        if let Err(e) = sent {
            LOGGER.warning(&format!(
                "Renter {} did not receive contract {}: {}",
                renter, contract_id, e
            ));
        }
    }

    /// Marks the shard paid. A repeated notice is acknowledged without a
    /// second transition.
    pub async fn pay_cheque(&self, from: &str, notice: PayChequeNotice) -> Result<Ack> {
        let (shard, _) = self.owned_contract(from, &notice.contract_id)?;
        if shard.is_contract_status() {
            shard.receive_pay_cheque()?;
            LOGGER.payment(&format!(
                "Received {} for contract {}",
                notice.amount, notice.contract_id
            ));
            return Ok(Ack { ok: true });
        }
        Ok(Ack {
            ok: shard.state() == HostShardState::Paid,
        })
    }

    /// Extends a contract the caller owns. The requested days are checked
    /// against the stored window before anything is written.
    pub async fn renew(&self, from: &str, request: RenewRequest) -> Result<Ack> {
        let (shard, contract) = self.owned_contract(from, &request.contract_id)?;
        contract.meta.clone().extend(request.days)?;
        if matches!(shard.state(), HostShardState::Complete | HostShardState::Error) {
            return Ok(Ack { ok: false });
        }
        let renewed = shard.extend_contract(request.days)?;
        LOGGER.shard(&format!(
            "Contract {} extended to {}",
            request.contract_id, renewed.meta.storage_end
        ));
        Ok(Ack { ok: true })
    }

    /// Completes every paid contract whose storage window ended by `now`.
    pub fn complete_expired(&self, now: i64) -> Result<Vec<String>> {
        let mut completed = Vec::new();
        for contract_id in
            host_contracts_in_state(&*self.store, self.identity.peer_id(), HostShardState::Paid.as_str())?
        {
            let shard = self.shard(&contract_id, NegotiationTerms::default())?;
            let contract = shard.contracts()?;
            if contract.is_empty() || contract.meta.storage_end > now {
                continue;
            }
            shard.update_contracts_status()?;
            shard.complete()?;
            self.cache.evict_host_shard(self.identity.peer_id(), &contract_id);
            completed.push(contract_id);
        }
        Ok(completed)
    }
}

#[async_trait]
impl RouteHandler for HostHandler {
    async fn handle(&self, from: &str, route: &str, body: &[u8]) -> Result<Vec<u8>> {
        match route {
            routes::STORAGE_INFO => Ok(serde_json::to_vec(&self.storage_info())?),
            routes::UPLOAD_INIT => {
                let request: UploadInitRequest = serde_json::from_slice(body)?;
                Ok(serde_json::to_vec(&self.upload_init(from, request).await?)?)
            }
            routes::PAY_CHEQUE => {
                let notice: PayChequeNotice = serde_json::from_slice(body)?;
                Ok(serde_json::to_vec(&self.pay_cheque(from, notice).await?)?)
            }
            routes::RENEW => {
                let request: RenewRequest = serde_json::from_slice(body)?;
                Ok(serde_json::to_vec(&self.renew(from, request).await?)?)
            }
            other => Err(UploadError::Validation(format!("unsupported route {}", other))),
        }
    }
}
