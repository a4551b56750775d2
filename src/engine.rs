use crate::executor::{RunMode, ZapExecutor};
use crate::model::ZapStatus;
use crate::shutdown::Shutdown;
use crate::store::ZapStore;
use crate::triggers::{Trigger, event::TriggerEvent};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

pub const EVENT_CHANNEL_CAPACITY: usize = 100;
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("None of the {0} configured triggers could be launched")]
    NoTriggersLaunched(usize),
}

/// Connects triggers to the executor.
///
/// Every event is handled on its own task, so a slow action never holds up the
/// triggers. On shutdown the triggers are stopped first, then in-flight runs
/// get a grace period to finish.
pub struct Engine {
    triggers: Vec<Box<dyn Trigger>>,
    shutdown_handler: Option<Box<dyn Shutdown>>,
    executor: Arc<ZapExecutor>,
    store: Arc<dyn ZapStore>,
    grace_period: Duration,
}

impl Engine {
    pub fn new(executor: Arc<ZapExecutor>, store: Arc<dyn ZapStore>) -> Self {
        Engine {
            triggers: Vec::new(),
            shutdown_handler: None,
            executor,
            store,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn add_trigger(mut self, t: Box<dyn Trigger>) -> Self {
        self.triggers.push(t);
        self
    }

    pub fn with_shutdown_handler(mut self, handler: impl Shutdown + 'static) -> Self {
        self.shutdown_handler = Some(Box::new(handler));
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub async fn run(mut self) -> Result<(), EngineError> {
        let (mut event_rx, shutdown_tx, trigger_handles) = self.launch_triggers().await?;
        let mut inflight = JoinSet::new();

        let mut handler = self.shutdown_handler.take();
        let shutdown = async {
            match handler.as_mut() {
                Some(handler) => handler.wait_for_signal().await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(shutdown);

        info!("Engine event loop started, waiting for events");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("External shutdown signal triggered termination");
                    break;
                }
                received = event_rx.recv() => match received {
                    Some(event) => self.dispatch(event, &mut inflight),
                    None => {
                        debug!("Event loop terminated - no more events to process");
                        break;
                    }
                },
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Zap execution task panicked");
                    }
                }
            }
        }

        // Closing the receiver unblocks triggers parked on a full channel.
        drop(event_rx);
        self.shutdown_triggers(shutdown_tx, trigger_handles).await;
        self.drain(inflight).await;
        info!("Engine has shut down gracefully");
        Ok(())
    }

    fn dispatch(&self, event: TriggerEvent, inflight: &mut JoinSet<()>) {
        info!(zap_id = %event.zap_id, source = ?event.source, "Received event");
        let store = self.store.clone();
        let executor = self.executor.clone();
        inflight.spawn(process_event(store, executor, event));
    }

    async fn launch_triggers(
        &self,
    ) -> Result<
        (
            mpsc::Receiver<TriggerEvent>,
            broadcast::Sender<()>,
            Vec<JoinHandle<()>>,
        ),
        EngineError,
    > {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut trigger_handles = Vec::new();

        info!(trigger_count = self.triggers.len(), "Launching triggers");
        for (index, trigger) in self.triggers.iter().enumerate() {
            let shutdown_rx = shutdown_tx.subscribe();
            match trigger.launch(event_tx.clone(), shutdown_rx).await {
                Ok(handle) => {
                    debug!(trigger_index = index, "Trigger launched successfully");
                    trigger_handles.push(handle);
                }
                Err(e) => {
                    error!(trigger_index = index, error = %e, "Failed to launch trigger");
                }
            }
        }
        if trigger_handles.is_empty() && !self.triggers.is_empty() {
            return Err(EngineError::NoTriggersLaunched(self.triggers.len()));
        }
        info!(
            launched_count = trigger_handles.len(),
            "All triggers launched"
        );

        Ok((event_rx, shutdown_tx, trigger_handles))
    }

    async fn shutdown_triggers(
        &self,
        shutdown_tx: broadcast::Sender<()>,
        trigger_handles: Vec<JoinHandle<()>>,
    ) {
        info!(
            trigger_count = trigger_handles.len(),
            "Sending shutdown signal to all triggers"
        );
        let _ = shutdown_tx.send(());
        for (index, mut handle) in trigger_handles.into_iter().enumerate() {
            match tokio::time::timeout(self.grace_period, &mut handle).await {
                Ok(Ok(())) => debug!(trigger_index = index, "Trigger terminated successfully"),
                Ok(Err(e)) => error!(
                    trigger_index = index,
                    error = %e,
                    "Error waiting for trigger to terminate"
                ),
                Err(_) => {
                    warn!(trigger_index = index, "Trigger did not stop within the grace period, aborting");
                    handle.abort();
                }
            }
        }
        info!("All triggers have been shut down");
    }

    async fn drain(&self, mut inflight: JoinSet<()>) {
        if inflight.is_empty() {
            return;
        }
        info!(
            inflight = inflight.len(),
            grace_secs = self.grace_period.as_secs(),
            "Waiting for in-flight zap runs"
        );
        let finished = tokio::time::timeout(self.grace_period, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;
        if finished.is_err() {
            warn!(aborted = inflight.len(), "Grace period elapsed, aborting in-flight zap runs");
            inflight.abort_all();
        }
    }
}

async fn process_event(store: Arc<dyn ZapStore>, executor: Arc<ZapExecutor>, event: TriggerEvent) {
    let zap = match store.get_zap(&event.zap_id).await {
        Ok(Some(zap)) => zap,
        Ok(None) => {
            warn!(zap_id = %event.zap_id, "Event for unknown zap dropped");
            return;
        }
        Err(e) => {
            error!(zap_id = %event.zap_id, error = %e, "Failed to load zap");
            return;
        }
    };
    if zap.status != ZapStatus::Active {
        debug!(zap_id = %zap.id, status = zap.status.as_str(), "Zap is not active, event ignored");
        return;
    }
    match executor.execute(&zap, event.payload, RunMode::Triggered).await {
        Ok(report) => info!(zap_id = %zap.id, status = ?report.status, "{}", report.message),
        Err(e) => error!(zap_id = %zap.id, error = %e, "Zap execution failed"),
    }
}
