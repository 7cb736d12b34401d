mod host;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::network::{routes, ContractAcks, RouteHandler};
use crate::packets::{NodeRole, StorageInfo};

pub use host::{HostHandler, StorageOffer};

/// Entry point for every inbound call to this node.
pub struct NodeRouter {
    peer_id: String,
    acks: Arc<ContractAcks>,
    host: Option<Arc<HostHandler>>,
}

impl NodeRouter {
    pub fn renter(peer_id: &str, acks: Arc<ContractAcks>) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            acks,
            host: None,
        }
    }

    pub fn with_host(mut self, host: Arc<HostHandler>) -> Self {
        self.host = Some(host);
        self
    }
}

#[async_trait]
impl RouteHandler for NodeRouter {
    async fn handle(&self, from: &str, route: &str, body: &[u8]) -> Result<Vec<u8>> {
        match (route, &self.host) {
            (routes::RECV_CONTRACT, _) => self.acks.handle(from, route, body).await,
            (_, Some(host)) => host.handle(from, route, body).await,
            (routes::STORAGE_INFO, None) => Ok(serde_json::to_vec(&StorageInfo {
                peer_id: self.peer_id.clone(),
                role: NodeRole::Renter,
                supported_tokens: Vec::new(),
                price: 0,
            })?),
            (other, None) => Err(crate::error::UploadError::Validation(format!(
                "{} is not a storage provider, cannot serve {}",
                self.peer_id, other
            ))),
        }
    }
}
