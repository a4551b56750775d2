// Access to the on-chain zap registry contract.

use crate::error::KeeperError;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use std::fmt::Display;
use tracing::{debug, info};

sol! {
    #[sol(rpc)]
    contract ZapRegistryContract {
        function getTotalZaps() external view returns (uint256);
        function getZap(uint256 zapId) external view returns (address owner, uint256 triggerType, bool active, uint256 executionCount, uint256 actionCount);
        function execute(uint256 zapId) external payable;
        function isKeeper(address keeper) external view returns (bool);
        function executionReward() external view returns (uint256);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    /// Fired by chain state; the keeper leaves these alone.
    OnChain,
    /// Fired by the hooks backend and executed by the keeper.
    OffChain,
    Unknown(u64),
}

impl From<u64> for TriggerType {
    fn from(value: u64) -> Self {
        match value {
            0 => TriggerType::OnChain,
            1 => TriggerType::OffChain,
            other => TriggerType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainZap {
    pub owner: Address,
    pub trigger_type: TriggerType,
    pub active: bool,
    pub execution_count: u64,
    pub action_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub gas_used: u64,
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait ZapRegistry: Send + Sync {
    /// The address transactions are sent from.
    fn keeper_address(&self) -> Address;

    async fn total_zaps(&self) -> Result<u64, KeeperError>;

    async fn zap(&self, id: u64) -> Result<OnChainZap, KeeperError>;

    async fn is_keeper(&self, address: Address) -> Result<bool, KeeperError>;

    /// Wei paid to the keeper per execution.
    async fn execution_reward(&self) -> Result<U256, KeeperError>;

    async fn balance(&self, address: Address) -> Result<U256, KeeperError>;

    /// Sends `execute(id)` and waits for the receipt.
    async fn execute(&self, id: u64) -> Result<ExecutionReceipt, KeeperError>;
}

fn chain(e: impl Display) -> KeeperError {
    KeeperError::Chain(e.to_string())
}

fn to_u64(value: U256, what: &str) -> Result<u64, KeeperError> {
    u64::try_from(value).map_err(|_| KeeperError::Chain(format!("{what} {value} does not fit in u64")))
}

/// Gas limit with 20 % headroom over the estimate.
pub fn padded_gas_limit(estimate: u64) -> u64 {
    estimate.saturating_mul(120) / 100
}

pub struct EvmZapRegistry {
    provider: DynProvider,
    address: Address,
    keeper: Address,
}

impl EvmZapRegistry {
    /// Connects to `rpc_url` with a wallet built from `private_key`.
    pub fn connect(rpc_url: &str, private_key: &str, address: Address) -> Result<Self, KeeperError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| KeeperError::Config(format!("KEEPER_PRIVATE_KEY: {e}")))?;
        let keeper = signer.address();
        let url = rpc_url
            .parse::<Url>()
            .map_err(|e| KeeperError::Config(format!("SEPOLIA_RPC_URL {rpc_url}: {e}")))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();
        info!(keeper = %keeper, contract = %address, "Connected to zap registry");
        Ok(Self {
            provider,
            address,
            keeper,
        })
    }

    fn contract(&self) -> ZapRegistryContract::ZapRegistryContractInstance<DynProvider> {
        ZapRegistryContract::new(self.address, self.provider.clone())
    }
}

#[async_trait]
impl ZapRegistry for EvmZapRegistry {
    fn keeper_address(&self) -> Address {
        self.keeper
    }

    async fn total_zaps(&self) -> Result<u64, KeeperError> {
        let total = self.contract().getTotalZaps().call().await.map_err(chain)?;
        to_u64(total, "total zaps")
    }

    async fn zap(&self, id: u64) -> Result<OnChainZap, KeeperError> {
        let zap = self
            .contract()
            .getZap(U256::from(id))
            .call()
            .await
            .map_err(chain)?;
        Ok(OnChainZap {
            owner: zap.owner,
            trigger_type: TriggerType::from(to_u64(zap.triggerType, "trigger type")?),
            active: zap.active,
            execution_count: to_u64(zap.executionCount, "execution count")?,
            action_count: to_u64(zap.actionCount, "action count")?,
        })
    }

    async fn is_keeper(&self, address: Address) -> Result<bool, KeeperError> {
        self.contract().isKeeper(address).call().await.map_err(chain)
    }

    async fn execution_reward(&self) -> Result<U256, KeeperError> {
        self.contract().executionReward().call().await.map_err(chain)
    }

    async fn balance(&self, address: Address) -> Result<U256, KeeperError> {
        self.provider.get_balance(address).await.map_err(chain)
    }

    async fn execute(&self, id: u64) -> Result<ExecutionReceipt, KeeperError> {
        let contract = self.contract();
        let call = contract.execute(U256::from(id));
        let estimate = call.estimate_gas().await.map_err(chain)?;
        debug!(zap_id = id, estimate, "Estimated gas for execute");

        let pending = call
            .gas(padded_gas_limit(estimate))
            .send()
            .await
            .map_err(chain)?;
        info!(zap_id = id, tx = %pending.tx_hash(), "Execute transaction sent, waiting for confirmation");
        let receipt = pending.get_receipt().await.map_err(chain)?;

        Ok(ExecutionReceipt {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
            gas_used: receipt.gas_used,
            block_number: receipt.block_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_types_follow_contract_encoding() {
        assert_eq!(TriggerType::from(0), TriggerType::OnChain);
        assert_eq!(TriggerType::from(1), TriggerType::OffChain);
        assert_eq!(TriggerType::from(7), TriggerType::Unknown(7));
    }

    #[test]
    fn gas_limit_has_twenty_percent_headroom() {
        assert_eq!(padded_gas_limit(100_000), 120_000);
        assert_eq!(padded_gas_limit(21_001), 25_201);
        assert_eq!(padded_gas_limit(u64::MAX), u64::MAX / 100);
    }

    #[test]
    fn oversized_values_are_rejected() {
        assert_eq!(to_u64(U256::from(42u64), "count").unwrap(), 42);
        assert!(to_u64(U256::MAX, "count").is_err());
    }

    #[test]
    fn connect_rejects_bad_key() {
        let result = EvmZapRegistry::connect("http://localhost:8545", "not-a-key", Address::ZERO);
        assert!(matches!(result, Err(KeeperError::Config(_))));
    }
}
