use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A trait for sources that can trigger a graceful shutdown of the engine.
#[async_trait]
pub trait Shutdown: Send + Sync {
    /// This future resolves when a shutdown signal is received.
    async fn wait_for_signal(&mut self);
}

#[derive(Default)]
pub struct CtrlCShutdown;

impl CtrlCShutdown {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Shutdown for CtrlCShutdown {
    async fn wait_for_signal(&mut self) {
        // An error receiving the signal still ends the wait.
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl-C received, initiating graceful shutdown");
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
#[derive(Default)]
pub struct TerminationShutdown;

impl TerminationShutdown {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Shutdown for TerminationShutdown {
    async fn wait_for_signal(&mut self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, initiating graceful shutdown"),
                        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown"),
                    }
                    return;
                }
                Err(e) => info!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C only"),
            }
        }
        CtrlCShutdown.wait_for_signal().await;
    }
}

/// Resolves when the token is cancelled, so several services can share one stop signal.
pub struct CancellationShutdown {
    token: CancellationToken,
}

impl CancellationShutdown {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl Shutdown for CancellationShutdown {
    async fn wait_for_signal(&mut self) {
        self.token.cancelled().await;
        info!("Cancellation requested, initiating graceful shutdown");
    }
}

pub struct TimeBasedShutdown {
    duration: Duration,
}

impl TimeBasedShutdown {
    /// Creates a new handler that will trigger a shutdown after the given duration.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl Shutdown for TimeBasedShutdown {
    async fn wait_for_signal(&mut self) {
        info!(
            duration_secs = self.duration.as_secs(),
            "Engine shutdown scheduled"
        );
        tokio::time::sleep(self.duration).await;
        info!(duration_secs = self.duration.as_secs(), "Time-based shutdown triggered");
    }
}
