use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{screen, HostProvider, Screening};
use crate::config::Config;
use crate::error::{Result, UploadError};
use crate::logger::LOGGER;
use crate::network::{
    call_json, connect_within, routes, Connector, HostCandidate, HostDiscovery, RemoteCall,
};
use crate::packets::{NodeRole, StorageInfo};
use crate::settlement::SettlementService;

struct Pool {
    primary: Vec<HostCandidate>,
    cursor: usize,
    visited: usize,
    retries: usize,
    failed: HashSet<String>,
    backup: VecDeque<String>,
}

/// Hosts from the discovery service, walked round-robin from a random
/// offset, with already-connected peers as a backup pool.
pub struct DiscoveredHostProvider {
    local_peer_id: String,
    settlement: Arc<dyn SettlementService>,
    connector: Arc<dyn Connector>,
    remote: Arc<dyn RemoteCall>,
    connect_timeout: Duration,
    probe_timeout: Duration,
    max_retry: usize,
    deadline: Instant,
    pool: Mutex<Pool>,
}

impl DiscoveredHostProvider {
    pub async fn new(
        local_peer_id: &str,
        discovery: &dyn HostDiscovery,
        settlement: Arc<dyn SettlementService>,
        connector: Arc<dyn Connector>,
        remote: Arc<dyn RemoteCall>,
        config: &Config,
    ) -> Result<Self> {
        let primary: Vec<HostCandidate> = discovery
            .ranked_hosts(config.min_host_pool)
            .await?
            .into_iter()
            .filter(|candidate| candidate.peer_id != local_peer_id)
            .collect();
        let in_primary: HashSet<&str> = primary.iter().map(|c| c.peer_id.as_str()).collect();

        // Unknown latency sorts first.
        let mut connected: Vec<_> = connector
            .connected_peers()
            .into_iter()
            .filter(|peer| peer.peer_id != local_peer_id && !in_primary.contains(peer.peer_id.as_str()))
            .collect();
        connected.sort_by_key(|peer| peer.latency);
        let backup: VecDeque<String> = connected.into_iter().map(|peer| peer.peer_id).collect();

        let cursor = if primary.is_empty() {
            0
        } else {
            rand::random_range(0..primary.len())
        };
        LOGGER.host(&format!(
            "Host pool ready: {} ranked, {} backup",
            primary.len(),
            backup.len()
        ));

        Ok(Self {
            local_peer_id: local_peer_id.to_string(),
            settlement,
            connector,
            remote,
            connect_timeout: config.connect_timeout(),
            probe_timeout: config.probe_timeout(),
            max_retry: config.host_max_retry,
            deadline: Instant::now() + config.host_search_deadline(),
            pool: Mutex::new(Pool {
                primary,
                cursor,
                visited: 0,
                retries: 0,
                failed: HashSet::new(),
                backup,
            }),
        })
    }

    async fn search(&self, pool: &mut Pool) -> Result<String> {
        while pool.visited < pool.primary.len() && pool.retries < self.max_retry {
            let candidate = pool.primary[pool.cursor].clone();
            pool.cursor = (pool.cursor + 1) % pool.primary.len();
            pool.visited += 1;

            if candidate.blacklisted || pool.failed.contains(&candidate.peer_id) {
                continue;
            }
            match screen(
                &*self.settlement,
                &*self.connector,
                &self.local_peer_id,
                &candidate.peer_id,
                self.connect_timeout,
            )
            .await
            {
                Screening::Ready => {
                    LOGGER.host(&format!(
                        "Selected host {} (price {})",
                        candidate.peer_id, candidate.price
                    ));
                    return Ok(candidate.peer_id);
                }
                Screening::Incompatible => pool.retries += 1,
                Screening::Unreachable(e) => {
                    LOGGER.host(&format!("Cannot reach {}: {}", candidate.peer_id, e));
                    pool.retries += 1;
                    pool.failed.insert(candidate.peer_id);
                }
            }
        }

        while let Some(peer_id) = pool.backup.pop_front() {
            if let Err(e) = connect_within(&*self.connector, &peer_id, self.connect_timeout).await {
                LOGGER.host(&format!("Cannot reach backup {}: {}", peer_id, e));
                continue;
            }
            match call_json::<_, StorageInfo>(
                &*self.remote,
                &peer_id,
                routes::STORAGE_INFO,
                &(),
                self.probe_timeout,
            )
            .await
            {
                Ok(info) if info.role == NodeRole::Host => {
                    LOGGER.host(&format!("Selected backup host {}", peer_id));
                    return Ok(peer_id);
                }
                Ok(_) => LOGGER.host(&format!("Backup {} is not a host", peer_id)),
                Err(e) => LOGGER.host(&format!("Probe of backup {} failed: {}", peer_id, e)),
            }
        }

        Err(UploadError::HostsExhausted)
    }
}

#[async_trait]
impl HostProvider for DiscoveredHostProvider {
    async fn next_valid_host(&self) -> Result<String> {
        if Instant::now() >= self.deadline {
            return Err(UploadError::HostSearchTimeout);
        }
        let mut pool = self.pool.lock().await;
        tokio::time::timeout_at(self.deadline, self.search(&mut pool))
            .await
            .map_err(|_| UploadError::HostSearchTimeout)?
    }
}
