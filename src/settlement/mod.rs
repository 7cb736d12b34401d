pub mod pricing;

use async_trait::async_trait;

use crate::error::Result;
use crate::packets::{ContractStatus, ShardContractStatus, SignedFileMeta, StatusQuery};

/// Chain-backed escrow, oracle and registry operations the upload engine
/// relies on. Amounts are in the token's smallest unit.
#[async_trait]
pub trait SettlementService: Send + Sync {
    /// On-chain minimum storage price for `token`.
    async fn price(&self, token: &str) -> Result<u64>;

    /// Token exchange rate, fixed point with [`pricing::RATE_SCALE`].
    async fn exchange_rate(&self, token: &str) -> Result<u64>;

    async fn balance(&self, peer_id: &str, token: &str) -> Result<u128>;

    /// Whether the two peers' vaults can settle with each other.
    async fn vault_compatible(&self, renter_peer_id: &str, host_peer_id: &str) -> Result<bool>;

    /// Redeems one voucher paying `payee` for `contract_id`.
    async fn settle(
        &self,
        payer: &str,
        payee: &str,
        contract_id: &str,
        token: &str,
        amount: u128,
    ) -> Result<()>;

    async fn add_file_meta(&self, meta: &SignedFileMeta) -> Result<()>;

    async fn file_meta(&self, file_hash: &str) -> Result<Option<SignedFileMeta>>;

    async fn contract_statuses(&self, query: &StatusQuery) -> Result<Vec<ShardContractStatus>>;

    async fn update_contract_status(&self, contract_id: &str, status: ContractStatus) -> Result<()>;
}
