use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{screen, HostProvider, Screening};
use crate::config::Config;
use crate::error::{Result, UploadError};
use crate::logger::LOGGER;
use crate::network::Connector;
use crate::settlement::SettlementService;

struct FixedList {
    hosts: Vec<String>,
    next: usize,
    requeued: HashSet<String>,
}

/// Walks a caller-chosen host list once. A host that can't be reached goes
/// to the back of the list for a single second try.
pub struct FixedHostProvider {
    local_peer_id: String,
    settlement: Arc<dyn SettlementService>,
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    blacklist: HashSet<String>,
    list: Mutex<FixedList>,
}

impl FixedHostProvider {
    pub fn new(
        local_peer_id: &str,
        hosts: Vec<String>,
        settlement: Arc<dyn SettlementService>,
        connector: Arc<dyn Connector>,
        config: &Config,
    ) -> Self {
        Self {
            local_peer_id: local_peer_id.to_string(),
            settlement,
            connector,
            connect_timeout: config.connect_timeout(),
            blacklist: HashSet::new(),
            list: Mutex::new(FixedList {
                hosts,
                next: 0,
                requeued: HashSet::new(),
            }),
        }
    }

    pub fn with_blacklist<I: IntoIterator<Item = String>>(mut self, peers: I) -> Self {
        self.blacklist.extend(peers);
        self
    }
}

#[async_trait]
impl HostProvider for FixedHostProvider {
    async fn next_valid_host(&self) -> Result<String> {
        let mut list = self.list.lock().await;
        while list.next < list.hosts.len() {
            let peer_id = list.hosts[list.next].clone();
            list.next += 1;

            if peer_id == self.local_peer_id || self.blacklist.contains(&peer_id) {
                continue;
            }
            match screen(
                &*self.settlement,
                &*self.connector,
                &self.local_peer_id,
                &peer_id,
                self.connect_timeout,
            )
            .await
            {
                Screening::Ready => {
                    LOGGER.host(&format!("Selected host {}", peer_id));
                    return Ok(peer_id);
                }
                Screening::Incompatible => {}
                Screening::Unreachable(e) => {
                    LOGGER.host(&format!("Cannot reach {}: {}", peer_id, e));
                    if list.requeued.insert(peer_id.clone()) {
                        list.hosts.push(peer_id);
                    }
                }
            }
        }
        Err(UploadError::HostsExhausted)
    }
}
