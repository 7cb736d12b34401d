use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::retry::{RetryError, RetryPolicy};
use crate::config::Config;
use crate::crypto::signature::{sign_contract, sign_file_meta, sign_status_query, verify_host_signature};
use crate::crypto::NodeIdentity;
use crate::db::KvStore;
use crate::error::{Result, UploadError};
use crate::host::HostProvider;
use crate::logger::LOGGER;
use crate::network::{call_json, routes, ContractAcks, RemoteCall};
use crate::packets::{
    window_end, Ack, AckResult, ContractMetadata, ContractStatus, FileMeta, NodeRole, PayChequeNotice,
    SignedContract, SignedFileMeta, StorageInfo, UploadInitRequest,
};
use crate::session::records::now;
use crate::session::{ObjectCache, RenterSession, RenterShard, SessionState};
use crate::settlement::pricing::{confirmation_window, nominal_amount, real_amount, total_cost};
use crate::settlement::SettlementService;

/// Per-upload negotiation inputs.
#[derive(Debug, Clone)]
pub struct UploadParams {
    /// Offered price per GiB-day.
    pub price: u64,
    pub token: String,
    pub shard_size: u64,
    pub storage_days: u64,
    /// Shards to negotiate. Empty means every shard of the session.
    pub shard_indexes: Vec<usize>,
    /// Park the file metadata for an external signer instead of signing here.
    pub offline_signing: bool,
    /// Back-dated window start for repairs. `None` starts the window now.
    pub storage_start: Option<i64>,
}

impl UploadParams {
    pub fn new(price: u64, token: &str, shard_size: u64, storage_days: u64) -> Self {
        Self {
            price,
            token: token.to_string(),
            shard_size,
            storage_days,
            shard_indexes: Vec::new(),
            offline_signing: false,
            storage_start: None,
        }
    }
}

/// Renter-side upload engine. Cheap to clone; every clone shares the same
/// cache, store and acknowledgment registry.
#[derive(Clone)]
pub struct Uploader {
    pub(super) identity: Arc<NodeIdentity>,
    pub(super) store: Arc<dyn KvStore>,
    pub(super) cache: Arc<ObjectCache>,
    pub(super) remote: Arc<dyn RemoteCall>,
    pub(super) settlement: Arc<dyn SettlementService>,
    pub(super) acks: Arc<ContractAcks>,
    pub(super) config: Config,
    negotiation_policy: RetryPolicy,
    confirmation_policy: Option<RetryPolicy>,
    pub(super) root: CancellationToken,
}

impl Uploader {
    pub fn new(
        identity: Arc<NodeIdentity>,
        store: Arc<dyn KvStore>,
        cache: Arc<ObjectCache>,
        remote: Arc<dyn RemoteCall>,
        settlement: Arc<dyn SettlementService>,
        acks: Arc<ContractAcks>,
        config: Config,
    ) -> Self {
        Self {
            negotiation_policy: RetryPolicy::negotiation(&config),
            confirmation_policy: None,
            identity,
            store,
            cache,
            remote,
            settlement,
            acks,
            config,
            root: CancellationToken::new(),
        }
    }

    pub fn with_negotiation_policy(mut self, policy: RetryPolicy) -> Self {
        self.negotiation_policy = policy;
        self
    }

    /// Overrides the size-scaled confirmation policy.
    pub fn with_confirmation_policy(mut self, policy: RetryPolicy) -> Self {
        self.confirmation_policy = Some(policy);
        self
    }

    pub fn peer_id(&self) -> &str {
        self.identity.peer_id()
    }

    /// Cancels every session started by this uploader.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub fn session(
        &self,
        session_id: &str,
        file_hash: &str,
        shard_hashes: &[String],
    ) -> Result<Arc<RenterSession>> {
        RenterSession::obtain(
            &self.cache,
            Arc::clone(&self.store),
            &self.root,
            self.identity.peer_id(),
            session_id,
            file_hash,
            shard_hashes,
        )
    }

    pub fn shard(&self, session: &RenterSession, index: usize) -> Result<Arc<RenterShard>> {
        let shard_hash = session
            .shard_hashes()
            .get(index)
            .ok_or_else(|| UploadError::Validation(format!("no shard at index {}", index)))?;
        RenterShard::obtain(
            &self.cache,
            Arc::clone(&self.store),
            session.scope(),
            self.identity.peer_id(),
            session.id(),
            session.file_hash(),
            shard_hash,
            index,
        )
    }

    /// Drives `session` from init to complete. Any failure leaves the session
    /// in `error` with the failure as its message.
    pub async fn upload(
        &self,
        session: &Arc<RenterSession>,
        hosts: Arc<dyn HostProvider>,
        params: UploadParams,
    ) -> Result<()> {
        if session.state() != SessionState::Init {
            return Err(UploadError::Validation(format!(
                "session {} is already {}",
                session.id(),
                session.state()
            )));
        }
        let result = self.run(session, hosts, &params).await;
        if let Err(e) = &result {
            LOGGER.error(&format!("Upload session {} failed: {}", session.id(), e));
            if !session.state().is_terminal() {
                let _ = session.error(&e.to_string());
            }
        }
        if session.state().is_terminal() {
            self.cache.evict_session(session);
        }
        result
    }

    async fn run(
        &self,
        session: &Arc<RenterSession>,
        hosts: Arc<dyn HostProvider>,
        params: &UploadParams,
    ) -> Result<()> {
        let indexes = self.shard_indexes(session, params)?;
        let threshold = self.config.quorum_threshold(indexes.len());
        storage_window(params)?;

        self.check_balance(params, indexes.len()).await?;
        session.submit()?;

        let mut shards = Vec::with_capacity(indexes.len());
        for &index in &indexes {
            shards.push(self.shard(session, index)?);
        }
        for shard in &shards {
            if shard.is_contracted() {
                continue;
            }
            let uploader = self.clone();
            let session = Arc::clone(session);
            let shard = Arc::clone(shard);
            let hosts = Arc::clone(&hosts);
            let params = params.clone();
            tokio::spawn(async move {
                uploader.negotiate_shard(&session, &shard, &*hosts, &params).await;
            });
        }

        self.wait_for_quorum(session, &indexes, threshold).await?;

        let contracted = self.submit_file_meta(session, &shards, params).await?;
        let confirmed = self
            .wait_for_storage(session, &contracted, threshold, params)
            .await?;
        self.pay(session, &confirmed, params).await?;

        session.complete()?;
        LOGGER.info(&format!("Upload session {} complete", session.id()));
        Ok(())
    }

    /// Finishes a wait cut short by the session scope. A session a shard task
    /// already failed reports that failure instead of the cancellation.
    fn stopped(session: &RenterSession) -> UploadError {
        if session.state() == SessionState::Error {
            UploadError::ShardFailed(session.message())
        } else {
            UploadError::Cancelled
        }
    }

    fn shard_indexes(&self, session: &RenterSession, params: &UploadParams) -> Result<Vec<usize>> {
        let total = session.shard_hashes().len();
        if params.shard_indexes.is_empty() {
            return Ok((0..total).collect());
        }
        let mut seen = HashSet::new();
        let mut indexes = Vec::with_capacity(params.shard_indexes.len());
        for &index in &params.shard_indexes {
            if index >= total {
                return Err(UploadError::Validation(format!(
                    "shard index {} out of range ({} shards)",
                    index, total
                )));
            }
            if seen.insert(index) {
                indexes.push(index);
            }
        }
        Ok(indexes)
    }

    /// Refuses to start negotiating unless the renter can pay for every shard.
    async fn check_balance(&self, params: &UploadParams, shard_count: usize) -> Result<()> {
        let min_price = self.settlement.price(&params.token).await?;
        if params.price < min_price {
            return Err(UploadError::Settlement(format!(
                "price {} is below the minimum {}",
                params.price, min_price
            )));
        }
        let rate = self.settlement.exchange_rate(&params.token).await?;
        let required = total_cost(
            params.shard_size,
            params.price,
            params.storage_days,
            rate,
            shard_count,
        );
        let available = self
            .settlement
            .balance(self.identity.peer_id(), &params.token)
            .await?;
        if available < required {
            return Err(UploadError::InsufficientBalance {
                required,
                available,
            });
        }
        LOGGER.payment(&format!(
            "Balance check passed: {} required, {} available",
            required, available
        ));
        Ok(())
    }

    async fn negotiate_shard(
        &self,
        session: &RenterSession,
        shard: &RenterShard,
        hosts: &dyn HostProvider,
        params: &UploadParams,
    ) {
        let label = format!("shard {}", shard.index());
        let outcome = self
            .negotiation_policy
            .run(shard.scope(), &label, |attempt| {
                self.negotiate(session, shard, hosts, params, attempt)
            })
            .await;

        let err = match outcome {
            Ok(_) => return,
            Err(RetryError::Permanent(UploadError::Cancelled)) => {
                LOGGER.shard(&format!("Shard {} negotiation stopped", shard.index()));
                return;
            }
            Err(RetryError::Permanent(e)) => e,
            Err(RetryError::Transient(e)) => UploadError::ContractSetupTimeout(e.to_string()),
        };
        // Session first, so its message names the cause rather than the
        // quorum check that would notice the errored shard.
        let reason = err.to_string();
        if let Err(e) = session.error(&reason) {
            LOGGER.debug(&format!("Session {}: {}", session.id(), e));
        }
        if let Err(e) = shard.error(&reason) {
            LOGGER.debug(&format!("Shard {}: {}", shard.index(), e));
        }
    }

    /// One negotiation attempt against a fresh host.
    async fn negotiate(
        &self,
        session: &RenterSession,
        shard: &RenterShard,
        hosts: &dyn HostProvider,
        params: &UploadParams,
        attempt: usize,
    ) -> std::result::Result<SignedContract, RetryError> {
        let host = hosts
            .next_valid_host()
            .await
            .map_err(RetryError::Permanent)?;
        LOGGER.shard(&format!(
            "Shard {} attempt {}: negotiating with {}",
            shard.index(),
            attempt,
            host
        ));

        let info: StorageInfo = call_json(
            &*self.remote,
            &host,
            routes::STORAGE_INFO,
            &(),
            self.config.probe_timeout(),
        )
        .await
        .map_err(RetryError::Transient)?;
        if info.role != NodeRole::Host || !info.supported_tokens.contains(&params.token) {
            return Err(RetryError::Transient(UploadError::Negotiation {
                host,
                reason: format!("token {} not supported", params.token),
            }));
        }

        let meta = self
            .contract_meta(shard, &host, params)
            .map_err(RetryError::Permanent)?;
        let contract_id = meta.contract_id.clone();
        let signed = sign_contract(&self.identity, meta).map_err(RetryError::Permanent)?;

        let ack = self.acks.register(shard.id(), &contract_id);
        let request = UploadInitRequest {
            session_id: session.id().to_string(),
            file_hash: session.file_hash().to_string(),
            shard_hash: shard.shard_hash().to_string(),
            shard_index: shard.index() as u32,
            contract: signed.clone(),
        };
        let sent: Result<Ack> = call_json(
            &*self.remote,
            &host,
            routes::UPLOAD_INIT,
            &request,
            self.config.upload_init_timeout(),
        )
        .await;
        if let Err(e) = sent {
            self.acks.cancel(shard.id(), &contract_id);
            return Err(RetryError::Transient(e));
        }

        let result = match tokio::time::timeout(self.config.ack_timeout(), ack).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => {
                self.acks.cancel(shard.id(), &contract_id);
                return Err(RetryError::Transient(UploadError::HostTimeout(host)));
            }
        };

        let contract = match result {
            AckResult::Accepted(contract) => contract,
            AckResult::Rejected(reason) => {
                return Err(RetryError::Transient(UploadError::Negotiation { host, reason }))
            }
        };
        if contract.meta != signed.meta {
            return Err(RetryError::Transient(UploadError::Negotiation {
                host,
                reason: "acknowledged contract differs from the offer".to_string(),
            }));
        }
        verify_host_signature(&contract).map_err(RetryError::Transient)?;

        shard.contract(&contract).map_err(RetryError::Permanent)?;
        Ok(contract)
    }

    fn contract_meta(
        &self,
        shard: &RenterShard,
        host: &str,
        params: &UploadParams,
    ) -> Result<ContractMetadata> {
        let (storage_start, storage_end) = storage_window(params)?;
        Ok(ContractMetadata {
            contract_id: Uuid::new_v4().to_string(),
            renter_peer_id: self.identity.peer_id().to_string(),
            host_peer_id: host.to_string(),
            shard_hash: shard.shard_hash().to_string(),
            shard_index: shard.index() as u32,
            shard_size: params.shard_size,
            token: params.token.clone(),
            price: params.price,
            amount: nominal_amount(params.price, params.shard_size, params.storage_days),
            storage_start,
            storage_end,
            status: ContractStatus::Init,
        })
    }

    /// Polls the shard counters until `threshold` shards hold a contract.
    /// A single errored shard fails the session.
    async fn wait_for_quorum(
        &self,
        session: &RenterSession,
        indexes: &[usize],
        threshold: usize,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.quorum_poll_interval());
        loop {
            tokio::select! {
                _ = session.scope().cancelled() => return Err(Self::stopped(session)),
                _ = ticker.tick() => {}
            }
            let (completed, errored) = session.count_shards(indexes)?;
            if errored > 0 && session.state() == SessionState::Error {
                return Err(Self::stopped(session));
            }
            if errored > 0 {
                return Err(UploadError::ShardFailed(format!(
                    "{} of {} shards failed",
                    errored,
                    indexes.len()
                )));
            }
            LOGGER.session(&format!(
                "Session {}: {}/{} shards contracted",
                session.id(),
                completed,
                threshold
            ));
            if completed >= threshold {
                return Ok(());
            }
        }
    }

    /// Builds and signs the file metadata from every contracted shard, then
    /// registers it with the settlement service.
    async fn submit_file_meta(
        &self,
        session: &Arc<RenterSession>,
        shards: &[Arc<RenterShard>],
        params: &UploadParams,
    ) -> Result<Vec<(Arc<RenterShard>, SignedContract)>> {
        session.to_contract("")?;

        let mut contracted = Vec::new();
        for shard in shards {
            let contract = shard.contracts()?;
            if !contract.is_empty() {
                contracted.push((Arc::clone(shard), contract));
            }
        }
        let meta = FileMeta {
            file_hash: session.file_hash().to_string(),
            owner_peer_id: self.identity.peer_id().to_string(),
            token: params.token.clone(),
            shard_size: params.shard_size,
            contracts: contracted.iter().map(|(_, c)| c.clone()).collect(),
            created_at: now(),
        };

        let signature = session.expect_signature();
        if params.offline_signing {
            let record = session.save_offline_meta(&meta)?;
            LOGGER.session(&format!(
                "Session {}: waiting for offline signature of {}",
                session.id(),
                record.digest
            ));
        } else {
            let identity = Arc::clone(&self.identity);
            let signer = Arc::clone(session);
            let unsigned = meta.clone();
            tokio::spawn(async move {
                let delivered = sign_file_meta(&identity, &unsigned)
                    .and_then(|signature| signer.deliver_signature(signature));
                if let Err(e) = delivered {
                    let _ = signer.error(&format!("failed to sign file meta: {}", e));
                }
            });
        }

        let signature = tokio::select! {
            _ = session.scope().cancelled() => return Err(Self::stopped(session)),
            received = signature => received.map_err(|_| Self::stopped(session))?,
        };
        session.file_meta_signed()?;

        self.settlement
            .add_file_meta(&SignedFileMeta { meta, signature })
            .await?;
        session.file_meta_added()?;
        Ok(contracted)
    }

    /// Polls settlement until `threshold` contracts report COMPLETED. Returns
    /// the confirmed shards in index order.
    async fn wait_for_storage(
        &self,
        session: &RenterSession,
        contracted: &[(Arc<RenterShard>, SignedContract)],
        threshold: usize,
        params: &UploadParams,
    ) -> Result<Vec<(Arc<RenterShard>, SignedContract)>> {
        session.wait_upload()?;
        let query = sign_status_query(&self.identity, session.file_hash(), now());
        session.wait_upload_req_signed()?;

        let policy = self.confirmation_policy.clone().unwrap_or_else(|| {
            let total_bytes = params.shard_size.saturating_mul(contracted.len() as u64);
            RetryPolicy::confirmation(confirmation_window(total_bytes))
        });
        let confirmed_ids = parking_lot::Mutex::new(HashSet::<String>::new());
        let confirmed = &confirmed_ids;
        let query = &query;

        let outcome = policy
            .run(session.scope(), "storage confirmation", |_| async move {
                let statuses = self
                    .settlement
                    .contract_statuses(query)
                    .await
                    .map_err(RetryError::Transient)?;
                for status in statuses
                    .iter()
                    .filter(|s| s.status == ContractStatus::Completed)
                {
                    if confirmed.lock().contains(&status.contract_id) {
                        continue;
                    }
                    let Some((shard, _)) = contracted
                        .iter()
                        .find(|(_, c)| c.meta.contract_id == status.contract_id)
                    else {
                        continue;
                    };
                    shard
                        .update_contracts_status()
                        .and_then(|_| shard.update_additional_info(status.status.as_str()))
                        .map_err(RetryError::Permanent)?;
                    confirmed.lock().insert(status.contract_id.clone());
                }

                let count = confirmed.lock().len();
                LOGGER.session(&format!(
                    "Session {}: {}/{} storage confirmations",
                    session.id(),
                    count,
                    threshold
                ));
                if count >= threshold {
                    Ok(())
                } else {
                    Err(RetryError::Transient(UploadError::StorageConfirmTimeout(
                        format!("{} of {} shards confirmed", count, threshold),
                    )))
                }
            })
            .await;
        outcome.map_err(RetryError::into_inner)?;

        let confirmed = confirmed_ids.into_inner();
        Ok(contracted
            .iter()
            .filter(|(_, c)| confirmed.contains(&c.meta.contract_id))
            .map(|(shard, c)| (Arc::clone(shard), c.clone()))
            .collect())
    }

    /// Settles one voucher per confirmed shard, one at a time.
    async fn pay(
        &self,
        session: &RenterSession,
        confirmed: &[(Arc<RenterShard>, SignedContract)],
        params: &UploadParams,
    ) -> Result<()> {
        session.pay()?;
        let rate = self.settlement.exchange_rate(&params.token).await?;

        for (position, (shard, contract)) in confirmed.iter().enumerate() {
            if session.scope().is_cancelled() {
                return Err(UploadError::Cancelled);
            }
            if position > 0 {
                tokio::time::sleep(self.config.payment_pause()).await;
            }

            let amount = real_amount(contract.meta.amount, rate);
            self.settlement
                .settle(
                    self.identity.peer_id(),
                    &contract.meta.host_peer_id,
                    &contract.meta.contract_id,
                    &contract.meta.token,
                    amount,
                )
                .await
                .map_err(|e| match e {
                    UploadError::Settlement(_) => e,
                    other => UploadError::Settlement(other.to_string()),
                })?;
            LOGGER.payment(&format!(
                "Paid {} {} to {} for shard {}",
                amount,
                contract.meta.token,
                contract.meta.host_peer_id,
                shard.index()
            ));

            let notice = PayChequeNotice {
                contract_id: contract.meta.contract_id.clone(),
                amount,
            };
            let notified: Result<Ack> = call_json(
                &*self.remote,
                &contract.meta.host_peer_id,
                routes::PAY_CHEQUE,
                &notice,
                self.config.upload_init_timeout(),
            )
            .await;
            if let Err(e) = notified {
                LOGGER.warning(&format!(
                    "Host {} was not told about payment for {}: {}",
                    contract.meta.host_peer_id, contract.meta.contract_id, e
                ));
            }
        }
        Ok(())
    }
}

/// Contract window for `params`: at least one day, inside the i64 range.
fn storage_window(params: &UploadParams) -> Result<(i64, i64)> {
    if params.storage_days == 0 {
        return Err(UploadError::Validation(
            "storage needs at least one day".to_string(),
        ));
    }
    let start = params.storage_start.unwrap_or_else(now);
    let end = window_end(start, params.storage_days).ok_or_else(|| {
        UploadError::Validation(format!(
            "storage of {} days is out of range",
            params.storage_days
        ))
    })?;
    Ok((start, end))
}
