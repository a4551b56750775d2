use alloy::primitives::Address;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Missing or invalid configuration: {0}")]
    Config(String),
    #[error("{0} is not registered as a keeper")]
    NotRegistered(Address),
    #[error("Chain error: {0}")]
    Chain(String),
    #[error("Trigger oracle error: {0}")]
    Oracle(String),
}
