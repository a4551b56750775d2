// The keeper service: executes off-chain-triggered zaps on the registry contract.

mod config;
mod error;
mod keeper;
mod oracle;
mod registry;

use std::error::Error;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zapforge::shutdown::TerminationShutdown;
use zapforge::utils::HttpClient;

use crate::config::KeeperConfig;
use crate::keeper::Keeper;
use crate::oracle::HttpTriggerOracle;
use crate::registry::{EvmZapRegistry, ZapRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = KeeperConfig::from_env()?;
    let registry = EvmZapRegistry::connect(&config.rpc_url, &config.private_key, config.contract_address)?;
    info!(
        keeper = %registry.keeper_address(),
        contract = %config.contract_address,
        backend = %config.backend_url,
        "Keeper service starting"
    );

    let oracle = HttpTriggerOracle::new(HttpClient::new(), config.backend_url.clone());
    let keeper = Keeper::new(Arc::new(registry), Arc::new(oracle), config.interval);
    keeper.run(TerminationShutdown::new()).await?;
    Ok(())
}
