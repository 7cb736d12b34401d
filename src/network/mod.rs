pub mod acks;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UploadError};

pub use acks::ContractAcks;

/// Route names carried by every remote call.
pub mod routes {
    pub const UPLOAD_INIT: &str = "/storage/upload/init";
    pub const RECV_CONTRACT: &str = "/storage/upload/recvcontract";
    pub const STORAGE_INFO: &str = "/storage/info";
    pub const PAY_CHEQUE: &str = "/storage/upload/paycheque";
    pub const RENEW: &str = "/storage/contract/renew";
}

/// Outbound request/response channel to another peer.
#[async_trait]
pub trait RemoteCall: Send + Sync {
    async fn call(&self, peer_id: &str, route: &str, body: Vec<u8>) -> Result<Vec<u8>>;
}

/// Inbound side: answers calls addressed to the local node.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, from: &str, route: &str, body: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedPeer {
    pub peer_id: String,
    pub latency: Option<Duration>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, peer_id: &str) -> Result<()>;

    fn connected_peers(&self) -> Vec<ConnectedPeer>;
}

/// A host advertised by the discovery service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostCandidate {
    pub peer_id: String,
    pub price: u64,
    pub blacklisted: bool,
}

#[async_trait]
pub trait HostDiscovery: Send + Sync {
    /// Ranked candidates, best first. Implementations return at least
    /// `min_pool` entries when that many are known.
    async fn ranked_hosts(&self, min_pool: usize) -> Result<Vec<HostCandidate>>;
}

/// JSON request/response over [`RemoteCall`], bounded by `timeout`.
pub async fn call_json<Req, Resp>(
    remote: &dyn RemoteCall,
    peer_id: &str,
    route: &str,
    request: &Req,
    timeout: Duration,
) -> Result<Resp>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let body = serde_json::to_vec(request)?;
    let response = tokio::time::timeout(timeout, remote.call(peer_id, route, body))
        .await
        .map_err(|_| UploadError::Remote {
            peer: peer_id.to_string(),
            route: route.to_string(),
            reason: format!("no response within {:?}", timeout),
        })??;
    Ok(serde_json::from_slice(&response)?)
}

/// Connect bounded by `deadline`.
pub async fn connect_within(connector: &dyn Connector, peer_id: &str, deadline: Duration) -> Result<()> {
    tokio::time::timeout(deadline, connector.connect(peer_id))
        .await
        .map_err(|_| UploadError::Remote {
            peer: peer_id.to_string(),
            route: "connect".to_string(),
            reason: format!("not connected within {:?}", deadline),
        })?
}
