use crate::error::KeeperError;
use crate::oracle::TriggerOracle;
use crate::registry::{TriggerType, ZapRegistry};
use alloy::primitives::U256;
use alloy::primitives::utils::format_ether;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use zapforge::shutdown::Shutdown;

/// 0.01 ETH in wei.
pub const LOW_BALANCE_WEI: u64 = 10_000_000_000_000_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub total: u64,
    pub active: u64,
    pub executed: u64,
    pub failed: u64,
}

/// Executes off-chain-triggered zaps on the registry contract when the hooks
/// backend reports that their trigger fired.
pub struct Keeper {
    registry: Arc<dyn ZapRegistry>,
    oracle: Arc<dyn TriggerOracle>,
    interval: Duration,
}

impl Keeper {
    pub fn new(registry: Arc<dyn ZapRegistry>, oracle: Arc<dyn TriggerOracle>, interval: Duration) -> Self {
        Self {
            registry,
            oracle,
            interval,
        }
    }

    /// Checks registration, balance and reward before the first cycle.
    pub async fn preflight(&self) -> Result<(), KeeperError> {
        let keeper = self.registry.keeper_address();
        if !self.registry.is_keeper(keeper).await? {
            return Err(KeeperError::NotRegistered(keeper));
        }
        info!(keeper = %keeper, "Keeper registered");

        let balance = self.registry.balance(keeper).await?;
        info!(balance_eth = %format_ether(balance), "Keeper balance");
        if balance < U256::from(LOW_BALANCE_WEI) {
            warn!(balance_eth = %format_ether(balance), "Low balance, consider adding more ETH");
        }

        let reward = self.registry.execution_reward().await?;
        info!(reward_eth = %format_ether(reward), "Execution reward");
        Ok(())
    }

    /// One pass over every zap on the contract. Per-zap failures are logged and counted.
    pub async fn run_cycle(&self) -> Result<CycleSummary, KeeperError> {
        let total = self.registry.total_zaps().await?;
        let mut summary = CycleSummary {
            total,
            ..Default::default()
        };
        if total == 0 {
            info!("No zaps to monitor yet");
            return Ok(summary);
        }

        for id in 0..total {
            let zap = match self.registry.zap(id).await {
                Ok(zap) => zap,
                Err(e) => {
                    warn!(zap_id = id, error = %e, "Could not read zap");
                    continue;
                }
            };
            if !zap.active {
                continue;
            }
            summary.active += 1;

            match zap.trigger_type {
                TriggerType::OffChain => {
                    debug!(zap_id = id, executions = zap.execution_count, "Off-chain trigger");
                    let fire = match self.oracle.should_execute(id).await {
                        Ok(fire) => fire,
                        Err(e) => {
                            debug!(zap_id = id, error = %e, "Could not check trigger");
                            false
                        }
                    };
                    if !fire {
                        continue;
                    }
                    match self.registry.execute(id).await {
                        Ok(receipt) if receipt.success => {
                            summary.executed += 1;
                            info!(
                                zap_id = id,
                                tx = %receipt.tx_hash,
                                gas_used = receipt.gas_used,
                                block = ?receipt.block_number,
                                "Zap executed"
                            );
                        }
                        Ok(receipt) => {
                            summary.failed += 1;
                            warn!(zap_id = id, tx = %receipt.tx_hash, "Zap execution reverted");
                            self.requeue(id).await;
                        }
                        Err(e) => {
                            summary.failed += 1;
                            error!(zap_id = id, error = %e, "Failed to execute zap");
                            self.requeue(id).await;
                        }
                    }
                }
                TriggerType::OnChain => debug!(zap_id = id, "On-chain trigger, skipping"),
                TriggerType::Unknown(kind) => debug!(zap_id = id, kind, "Unknown trigger type, skipping"),
            }
        }
        Ok(summary)
    }

    /// The signal was consumed by the check; hand it back after a failed execution.
    async fn requeue(&self, id: u64) {
        match self.oracle.requeue(id).await {
            Ok(()) => debug!(zap_id = id, "Signal requeued for the next cycle"),
            Err(e) => warn!(zap_id = id, error = %e, "Could not requeue signal, it is lost"),
        }
    }

    /// Runs a cycle immediately and then every interval until `shutdown` fires.
    pub async fn run(&self, mut shutdown: impl Shutdown) -> Result<(), KeeperError> {
        self.preflight().await?;
        info!(interval_secs = self.interval.as_secs(), "Keeper service is running");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let stop = shutdown.wait_for_signal();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => match self.run_cycle().await {
                    Ok(summary) => info!(
                        total = summary.total,
                        active = summary.active,
                        executed = summary.executed,
                        failed = summary.failed,
                        "Monitoring cycle finished"
                    ),
                    Err(e) => error!(error = %e, "Monitoring cycle failed"),
                },
            }
        }
        info!("Keeper service stopped");
        Ok(())
    }
}
