use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::oneshot;

use super::{routes, RouteHandler};
use crate::db::keys;
use crate::error::{Result, UploadError};
use crate::logger::LOGGER;
use crate::packets::{Ack, AckResult, ContractAck};

struct Waiter {
    contract_id: String,
    tx: oneshot::Sender<AckResult>,
}

/// Renter-side registry of negotiations waiting for a host's asynchronous
/// contract acknowledgment. One waiter per shard; an ack only reaches it if
/// it carries the contract id that waiter sent.
#[derive(Default)]
pub struct ContractAcks {
    waiters: DashMap<String, Waiter>,
}

impl ContractAcks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any earlier waiter for the same shard.
    pub fn register(&self, shard_id: &str, contract_id: &str) -> oneshot::Receiver<AckResult> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(
            shard_id.to_string(),
            Waiter {
                contract_id: contract_id.to_string(),
                tx,
            },
        );
        rx
    }

    /// Drops the waiter if it still belongs to `contract_id`.
    pub fn cancel(&self, shard_id: &str, contract_id: &str) {
        self.waiters
            .remove_if(shard_id, |_, waiter| waiter.contract_id == contract_id);
    }

    /// Hands `ack` to its waiter. Returns false for unknown or stale acks.
    pub fn deliver(&self, ack: ContractAck) -> bool {
        let shard_id = keys::shard_id(&ack.session_id, &ack.shard_hash, ack.shard_index as usize);
        let Some((_, waiter)) = self
            .waiters
            .remove_if(&shard_id, |_, waiter| waiter.contract_id == ack.contract_id)
        else {
            LOGGER.warning(&format!(
                "Dropping acknowledgment for {} ({}): nobody is waiting",
                shard_id, ack.contract_id
            ));
            return false;
        };
        waiter.tx.send(ack.result).is_ok()
    }

    pub fn pending(&self) -> usize {
        self.waiters.len()
    }
}

#[async_trait]
impl RouteHandler for ContractAcks {
    async fn handle(&self, from: &str, route: &str, body: &[u8]) -> Result<Vec<u8>> {
        match route {
            routes::RECV_CONTRACT => {
                let ack: ContractAck = serde_json::from_slice(body)?;
                LOGGER.debug(&format!(
                    "Contract acknowledgment from {} for {}",
                    from, ack.contract_id
                ));
                let ok = self.deliver(ack);
                Ok(serde_json::to_vec(&Ack { ok })?)
            }
            other => Err(UploadError::Validation(format!("unsupported route {}", other))),
        }
    }
}
