use serde::Serialize;
use serde_json::Value;

/// Which kind of trigger produced an event.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Gmail,
    Price,
}

/// A trigger firing for one zap. `payload` becomes the run's trigger data.
#[derive(Serialize, Debug, Clone)]
pub struct TriggerEvent {
    pub zap_id: String,
    pub source: TriggerSource,
    pub payload: Value,
}
