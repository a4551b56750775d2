// The `poll_trigger` module provides a trigger that runs a probe at a regular interval.

use crate::triggers::{Probe, Trigger, TriggerError, event::TriggerEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Delay before the first check unless the trigger is hot-started.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// A builder for [`PollTrigger`].
pub struct PollTriggerBuilder {
    probe: Arc<dyn Probe>,
    interval: Duration,
    initial_delay: Duration,
    hot_start: bool,
}

impl PollTriggerBuilder {
    /// Creates a new `PollTriggerBuilder`.
    ///
    /// # Arguments
    ///
    /// * `probe` - The check to run on every tick.
    /// * `interval` - The interval between two checks.
    pub fn new(probe: Arc<dyn Probe>, interval: Duration) -> Self {
        Self {
            probe,
            interval,
            initial_delay: DEFAULT_INITIAL_DELAY,
            hot_start: false,
        }
    }

    /// Sets whether the first check runs immediately upon launch.
    pub fn with_hot_start(mut self, hot_start: bool) -> Self {
        self.hot_start = hot_start;
        self
    }

    /// Sets the delay before the first check.
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Builds a `PollTrigger`.
    pub fn build(&self) -> PollTrigger {
        PollTrigger {
            probe: self.probe.clone(),
            interval: self.interval,
            initial_delay: self.initial_delay,
            hot_start: self.hot_start,
        }
    }
}

/// A trigger that runs a [`Probe`] at a regular interval and forwards what it finds.
pub struct PollTrigger {
    probe: Arc<dyn Probe>,
    interval: Duration,
    initial_delay: Duration,
    hot_start: bool,
}

#[async_trait]
impl Trigger for PollTrigger {
    async fn launch(
        &self,
        tx: mpsc::Sender<TriggerEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, TriggerError> {
        if self.interval.is_zero() {
            return Err(TriggerError::ActivationError(format!(
                "{} needs a non-zero poll interval",
                self.probe.name()
            )));
        }
        let probe = self.probe.clone();
        let interval = self.interval;
        let start_time = if self.hot_start {
            Instant::now()
        } else {
            Instant::now() + self.initial_delay
        };

        let task_handle = tokio::spawn(async move {
            let trigger_name = probe.name().to_string();
            let mut ticker = tokio::time::interval_at(start_time, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(trigger_name = %trigger_name, interval_secs = interval.as_secs(), "PollTrigger started");

            'outer: loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(trigger_name = %trigger_name, "PollTrigger received shutdown signal, terminating");
                        break;
                    }

                    _ = ticker.tick() => {
                        let events = match probe.check().await {
                            Ok(events) => events,
                            Err(e) => {
                                warn!(trigger_name = %trigger_name, error = %e, "Probe check failed");
                                continue;
                            }
                        };
                        debug!(trigger_name = %trigger_name, fired = events.len(), "Probe check completed");

                        for event in events {
                            debug!(trigger_name = %trigger_name, zap_id = %event.zap_id, "Firing event");
                            if let Err(e) = tx.send(event).await {
                                warn!(trigger_name = %trigger_name, error = %e, "Main channel closed, stopping trigger");
                                break 'outer;
                            }
                        }
                    }
                }
            }
            debug!(trigger_name = %trigger_name, "PollTrigger task completed");
        });

        Ok(task_handle)
    }
}
