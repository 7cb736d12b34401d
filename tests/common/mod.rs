#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shard_market::config::Config;
use shard_market::crypto::NodeIdentity;
use shard_market::db::{BatchOp, KvStore, NodeStore, StoreError};
use shard_market::handler::{HostHandler, NodeRouter, StorageOffer};
use shard_market::host::HostProvider;
use shard_market::network::{
    routes, ConnectedPeer, Connector, ContractAcks, HostCandidate, HostDiscovery, RemoteCall,
    RouteHandler,
};
use shard_market::packets::{
    Ack, ContractStatus, NodeRole, ShardContractStatus, SignedFileMeta, StatusQuery, StorageInfo,
};
use shard_market::session::ObjectCache;
use shard_market::settlement::pricing::RATE_SCALE;
use shard_market::settlement::SettlementService;
use shard_market::upload::{RetryPolicy, Uploader};
use shard_market::{Result, UploadError};
use tempfile::TempDir;

pub const TOKEN: &str = "BTT";
pub const PRICE: u64 = 250;
pub const SHARD_SIZE: u64 = 4 * 1024 * 1024;
pub const DAYS: u64 = 30;

pub fn temp_store() -> (TempDir, Arc<dyn KvStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = NodeStore::open(dir.path().to_str().unwrap()).unwrap();
    (dir, Arc::new(store))
}

pub fn shard_hashes(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("shard-hash-{:02}", i)).collect()
}

pub fn fast_config() -> Config {
    Config {
        quorum_poll_interval_ms: 10,
        upload_init_timeout_ms: 2_000,
        ack_timeout_ms: 2_000,
        probe_timeout_ms: 1_000,
        connect_timeout_ms: 500,
        payment_pause_ms: 0,
        ..Config::default()
    }
}

/// In-memory store used for provider nodes.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> std::result::Result<Vec<u8>, StoreError> {
        self.entries
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, value: &[u8]) -> std::result::Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn query_prefix(&self, prefix: &str) -> std::result::Result<Vec<(String, Vec<u8>)>, StoreError> {
        Ok(self
            .entries
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn batch(&self, ops: Vec<BatchOp>) -> std::result::Result<(), StoreError> {
        let mut entries = self.entries.lock();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Memory store whose batches can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_batches: AtomicBool,
}

impl KvStore for FlakyStore {
    fn get(&self, key: &str) -> std::result::Result<Vec<u8>, StoreError> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> std::result::Result<(), StoreError> {
        self.inner.put(key, value)
    }

    fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.inner.delete(key)
    }

    fn query_prefix(&self, prefix: &str) -> std::result::Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.inner.query_prefix(prefix)
    }

    fn batch(&self, ops: Vec<BatchOp>) -> std::result::Result<(), StoreError> {
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.batch(ops)
    }
}

/// Memory store whose first write stalls, widening any window between
/// building an object and publishing it.
pub struct SlowStore {
    inner: MemoryStore,
    stalled: AtomicBool,
    pub stall: Duration,
}

impl SlowStore {
    pub fn new(stall: Duration) -> Self {
        Self {
            inner: MemoryStore::default(),
            stalled: AtomicBool::new(false),
            stall,
        }
    }
}

impl KvStore for SlowStore {
    fn get(&self, key: &str) -> std::result::Result<Vec<u8>, StoreError> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> std::result::Result<(), StoreError> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            std::thread::sleep(self.stall);
        }
        self.inner.put(key, value)
    }

    fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.inner.delete(key)
    }

    fn query_prefix(&self, prefix: &str) -> std::result::Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.inner.query_prefix(prefix)
    }

    fn batch(&self, ops: Vec<BatchOp>) -> std::result::Result<(), StoreError> {
        self.inner.batch(ops)
    }
}

/// Routes remote calls to in-process handlers.
#[derive(Default)]
pub struct Loopback {
    nodes: Mutex<HashMap<String, Arc<dyn RouteHandler>>>,
    down: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl Loopback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, peer_id: &str, handler: Arc<dyn RouteHandler>) {
        self.nodes.lock().insert(peer_id.to_string(), handler);
    }

    pub fn set_down(&self, peer_id: &str, down: bool) {
        let mut set = self.down.lock();
        if down {
            set.insert(peer_id.to_string());
        } else {
            set.remove(peer_id);
        }
    }

    pub fn calls_to(&self, route: &str) -> usize {
        self.calls.lock().iter().filter(|(_, r)| r == route).count()
    }

    pub fn remote(self: &Arc<Self>, from: &str) -> Arc<dyn RemoteCall> {
        Arc::new(LoopbackRemote {
            from: from.to_string(),
            net: Arc::clone(self),
        })
    }

    pub fn connector(self: &Arc<Self>, connected: Vec<ConnectedPeer>) -> Arc<dyn Connector> {
        Arc::new(LoopbackConnector {
            net: Arc::clone(self),
            connected,
        })
    }

    fn reachable(&self, peer_id: &str) -> Option<Arc<dyn RouteHandler>> {
        if self.down.lock().contains(peer_id) {
            return None;
        }
        self.nodes.lock().get(peer_id).cloned()
    }
}

pub struct LoopbackRemote {
    from: String,
    net: Arc<Loopback>,
}

#[async_trait]
impl RemoteCall for LoopbackRemote {
    async fn call(&self, peer_id: &str, route: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        self.net
            .calls
            .lock()
            .push((peer_id.to_string(), route.to_string()));
        let handler = self.net.reachable(peer_id).ok_or_else(|| UploadError::Remote {
            peer: peer_id.to_string(),
            route: route.to_string(),
            reason: "unreachable".to_string(),
        })?;
        handler.handle(&self.from, route, &body).await
    }
}

pub struct LoopbackConnector {
    net: Arc<Loopback>,
    connected: Vec<ConnectedPeer>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, peer_id: &str) -> Result<()> {
        match self.net.reachable(peer_id) {
            Some(_) => Ok(()),
            None => Err(UploadError::Remote {
                peer: peer_id.to_string(),
                route: "connect".to_string(),
                reason: "unreachable".to_string(),
            }),
        }
    }

    fn connected_peers(&self) -> Vec<ConnectedPeer> {
        self.connected.clone()
    }
}

/// Provider that answers probes and upload inits but never acknowledges.
pub struct SilentHost {
    pub peer_id: String,
}

#[async_trait]
impl RouteHandler for SilentHost {
    async fn handle(&self, _from: &str, route: &str, _body: &[u8]) -> Result<Vec<u8>> {
        match route {
            routes::STORAGE_INFO => Ok(serde_json::to_vec(&StorageInfo {
                peer_id: self.peer_id.clone(),
                role: NodeRole::Host,
                supported_tokens: vec![TOKEN.to_string()],
                price: PRICE,
            })?),
            _ => Ok(serde_json::to_vec(&Ack { ok: true })?),
        }
    }
}

pub struct Payment {
    pub payee: String,
    pub contract_id: String,
    pub amount: u128,
}

/// Settlement service with scripted answers.
pub struct ScriptedSettlement {
    pub min_price: Mutex<u64>,
    pub rate: Mutex<u64>,
    pub balance: Mutex<u128>,
    pub incompatible: Mutex<HashSet<String>>,
    pub fail_settle: Mutex<bool>,
    pub confirm: Mutex<bool>,
    pub payments: Mutex<Vec<Payment>>,
    pub file_metas: Mutex<HashMap<String, SignedFileMeta>>,
}

impl ScriptedSettlement {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            min_price: Mutex::new(1),
            rate: Mutex::new(RATE_SCALE as u64),
            balance: Mutex::new(u128::MAX),
            incompatible: Mutex::new(HashSet::new()),
            fail_settle: Mutex::new(false),
            confirm: Mutex::new(true),
            payments: Mutex::new(Vec::new()),
            file_metas: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl SettlementService for ScriptedSettlement {
    async fn price(&self, _token: &str) -> Result<u64> {
        Ok(*self.min_price.lock())
    }

    async fn exchange_rate(&self, _token: &str) -> Result<u64> {
        Ok(*self.rate.lock())
    }

    async fn balance(&self, _peer_id: &str, _token: &str) -> Result<u128> {
        Ok(*self.balance.lock())
    }

    async fn vault_compatible(&self, _renter: &str, host: &str) -> Result<bool> {
        Ok(!self.incompatible.lock().contains(host))
    }

    async fn settle(
        &self,
        _payer: &str,
        payee: &str,
        contract_id: &str,
        _token: &str,
        amount: u128,
    ) -> Result<()> {
        if *self.fail_settle.lock() {
            return Err(UploadError::Settlement("voucher rejected".to_string()));
        }
        self.payments.lock().push(Payment {
            payee: payee.to_string(),
            contract_id: contract_id.to_string(),
            amount,
        });
        Ok(())
    }

    async fn add_file_meta(&self, meta: &SignedFileMeta) -> Result<()> {
        self.file_metas
            .lock()
            .insert(meta.meta.file_hash.clone(), meta.clone());
        Ok(())
    }

    async fn file_meta(&self, file_hash: &str) -> Result<Option<SignedFileMeta>> {
        Ok(self.file_metas.lock().get(file_hash).cloned())
    }

    async fn contract_statuses(&self, query: &StatusQuery) -> Result<Vec<ShardContractStatus>> {
        let status = if *self.confirm.lock() {
            ContractStatus::Completed
        } else {
            ContractStatus::Init
        };
        Ok(self
            .file_metas
            .lock()
            .get(&query.file_hash)
            .map(|meta| {
                meta.meta
                    .contracts
                    .iter()
                    .map(|c| ShardContractStatus {
                        contract_id: c.meta.contract_id.clone(),
                        shard_index: c.meta.shard_index,
                        status,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_contract_status(&self, _contract_id: &str, _status: ContractStatus) -> Result<()> {
        Ok(())
    }
}

pub struct StaticDiscovery(pub Vec<HostCandidate>);

#[async_trait]
impl HostDiscovery for StaticDiscovery {
    async fn ranked_hosts(&self, _min_pool: usize) -> Result<Vec<HostCandidate>> {
        Ok(self.0.clone())
    }
}

/// Hands out hosts in order, wrapping around.
pub struct RoundRobinHosts {
    hosts: Vec<String>,
    next: AtomicUsize,
}

impl RoundRobinHosts {
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            hosts,
            next: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HostProvider for RoundRobinHosts {
    async fn next_valid_host(&self) -> Result<String> {
        if self.hosts.is_empty() {
            return Err(UploadError::HostsExhausted);
        }
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(self.hosts[i % self.hosts.len()].clone())
    }
}

pub struct HostNode {
    pub identity: Arc<NodeIdentity>,
    pub store: Arc<dyn KvStore>,
    pub cache: Arc<ObjectCache>,
    pub handler: Arc<HostHandler>,
}

impl HostNode {
    pub fn peer_id(&self) -> &str {
        self.identity.peer_id()
    }
}

/// One renter plus any number of providers on a loopback network.
pub struct Market {
    pub net: Arc<Loopback>,
    pub settlement: Arc<ScriptedSettlement>,
    pub config: Config,
    pub renter: Arc<NodeIdentity>,
    pub renter_store: Arc<dyn KvStore>,
    pub acks: Arc<ContractAcks>,
    pub cache: Arc<ObjectCache>,
    pub uploader: Uploader,
    pub hosts: Vec<HostNode>,
    _dir: TempDir,
}

impl Market {
    pub fn new(host_count: usize) -> Self {
        Self::with_config(host_count, fast_config())
    }

    pub fn with_config(host_count: usize, config: Config) -> Self {
        let net = Loopback::new();
        let settlement = ScriptedSettlement::new();
        let (dir, renter_store) = temp_store();
        let renter = Arc::new(NodeIdentity::generate().unwrap());
        let acks = Arc::new(ContractAcks::new());
        let cache = ObjectCache::new();

        net.register(
            renter.peer_id(),
            Arc::new(NodeRouter::renter(renter.peer_id(), Arc::clone(&acks))),
        );

        let uploader = Uploader::new(
            Arc::clone(&renter),
            Arc::clone(&renter_store),
            Arc::clone(&cache),
            net.remote(renter.peer_id()),
            settlement.clone(),
            Arc::clone(&acks),
            config.clone(),
        )
        .with_negotiation_policy(RetryPolicy::immediate(Duration::from_secs(5)))
        .with_confirmation_policy(RetryPolicy::immediate(Duration::from_secs(2)));

        let mut market = Self {
            net,
            settlement,
            config,
            renter,
            renter_store,
            acks,
            cache,
            uploader,
            hosts: Vec::new(),
            _dir: dir,
        };
        for _ in 0..host_count {
            market.add_host();
        }
        market
    }

    pub fn add_host(&mut self) -> &HostNode {
        let identity = Arc::new(NodeIdentity::generate().unwrap());
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
        let cache = ObjectCache::new();
        let handler = Arc::new(HostHandler::new(
            Arc::clone(&identity),
            Arc::clone(&store),
            Arc::clone(&cache),
            self.net.remote(identity.peer_id()),
            self.settlement.clone(),
            StorageOffer {
                price: PRICE,
                supported_tokens: vec![TOKEN.to_string()],
            },
            &self.config,
        ));
        let router = NodeRouter::renter(identity.peer_id(), Arc::new(ContractAcks::new()))
            .with_host(Arc::clone(&handler));
        self.net.register(identity.peer_id(), Arc::new(router));
        self.hosts.push(HostNode {
            identity,
            store,
            cache,
            handler,
        });
        self.hosts.last().unwrap()
    }

    pub fn add_silent_host(&self) -> String {
        let peer_id = NodeIdentity::generate().unwrap().peer_id().to_string();
        self.net.register(
            &peer_id,
            Arc::new(SilentHost {
                peer_id: peer_id.clone(),
            }),
        );
        peer_id
    }

    pub fn host_ids(&self) -> Vec<String> {
        self.hosts.iter().map(|h| h.peer_id().to_string()).collect()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.net.connector(Vec::new())
    }

    pub fn settlement(&self) -> Arc<dyn SettlementService> {
        self.settlement.clone()
    }

    pub fn host(&self, peer_id: &str) -> &HostNode {
        self.hosts.iter().find(|h| h.peer_id() == peer_id).unwrap()
    }
}
