//! # Zapforge: trigger-to-action automation for wallet-owned zaps.
//!
//! A zap pairs one trigger (an email landing in Gmail, a price crossing a
//! threshold, an incoming webhook) with an ordered list of actions. The
//! [`engine::Engine`] collects trigger events, the [`executor::ZapExecutor`]
//! runs the actions and records every run in a [`store::ZapStore`], and the
//! [`server`] exposes the whole thing over HTTP.

/// The `actions` module provides the steps a zap can run.
pub mod actions;
/// The `config` module reads service settings from the environment.
pub mod config;
/// The `engine` module wires triggers to the executor.
pub mod engine;
/// The `executor` module runs zaps and records their runs.
pub mod executor;
/// The `model` module defines zaps, runs and linked accounts.
pub mod model;
/// The `server` module provides the HTTP API.
pub mod server;
/// The `shutdown` module provides a trait for gracefully shutting down the engine.
pub mod shutdown;
/// The `store` module persists zaps and their runs.
pub mod store;
/// The `triggers` module provides the sources that fire zaps.
pub mod triggers;
/// The `utils` module provides HTTP, Google and templating helpers.
pub mod utils;

pub use actions::{Action, ActionRegistry};
pub use config::Settings;
pub use engine::Engine;
pub use executor::{RunMode, ZapExecutor, ZapRunReport};
pub use store::{JsonFileStore, ZapStore};
pub use triggers::{PollTrigger, PollTriggerBuilder};
pub use utils::context_hub::ContextHub;
