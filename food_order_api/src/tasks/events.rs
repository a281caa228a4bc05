//! Task lifecycle events for external monitoring.
//!
//! When enabled, every event is logged as JSON under the `food_order_api::events` target
//! and broadcast to in-process subscribers.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::types::TaskId;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TaskEvent {
    TaskReceived { uuid: TaskId, name: String },
    TaskStarted { uuid: TaskId, worker: String },
    TaskProgress { uuid: TaskId, percent: f64, description: Option<String> },
    TaskSucceeded { uuid: TaskId, result: Value, runtime: f64 },
    TaskFailed { uuid: TaskId, exception: String, runtime: f64 },
}

impl TaskEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskEvent::TaskReceived { .. } => "task-received",
            TaskEvent::TaskStarted { .. } => "task-started",
            TaskEvent::TaskProgress { .. } => "task-progress",
            TaskEvent::TaskSucceeded { .. } => "task-succeeded",
            TaskEvent::TaskFailed { .. } => "task-failed",
        }
    }
}

#[derive(Clone)]
pub struct EventPublisher {
    enabled: bool,
    sender: broadcast::Sender<TaskEvent>,
}

impl EventPublisher {
    pub fn new(enabled: bool) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { enabled, sender }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn publish(&self, event: TaskEvent) {
        if !self.enabled {
            return;
        }
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "food_order_api::events", event = event.kind(), "{json}"),
            Err(e) => tracing::warn!("Failed to serialize task event: {e}"),
        }
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }
}
