mod discovered;
mod fixed;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, UploadError};
use crate::logger::LOGGER;
use crate::network::{connect_within, Connector};
use crate::settlement::SettlementService;

pub use discovered::DiscoveredHostProvider;
pub use fixed::FixedHostProvider;

/// Source of storage providers for shard negotiations. Every call advances
/// past the host it returns, so a retry gets a different one.
#[async_trait]
pub trait HostProvider: Send + Sync {
    async fn next_valid_host(&self) -> Result<String>;
}

pub(crate) enum Screening {
    Ready,
    Incompatible,
    Unreachable(UploadError),
}

/// Vault compatibility first, then a bounded connect. Neither failure is
/// fatal to the caller.
pub(crate) async fn screen(
    settlement: &dyn SettlementService,
    connector: &dyn Connector,
    local_peer_id: &str,
    peer_id: &str,
    connect_timeout: Duration,
) -> Screening {
    match settlement.vault_compatible(local_peer_id, peer_id).await {
        Ok(true) => {}
        Ok(false) => {
            LOGGER.host(&format!("Skipping {}: vault not compatible", peer_id));
            return Screening::Incompatible;
        }
        Err(e) => {
            LOGGER.host(&format!("Skipping {}: compatibility check failed: {}", peer_id, e));
            return Screening::Incompatible;
        }
    }
    match connect_within(connector, peer_id, connect_timeout).await {
        Ok(()) => Screening::Ready,
        Err(e) => Screening::Unreachable(e),
    }
}
