//! Storage models for background tasks.

use crate::types::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Started,
    Progress,
    Success,
    Failure,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Progress => "PROGRESS",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskState::Pending),
            "STARTED" => Ok(TaskState::Started),
            "PROGRESS" => Ok(TaskState::Progress),
            "SUCCESS" => Ok(TaskState::Success),
            "FAILURE" => Ok(TaskState::Failure),
            other => Err(anyhow::anyhow!("unknown task state: {other}")),
        }
    }
}

/// Progress snapshot stored alongside a running task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub current: u64,
    pub total: u64,
    /// `current / total * 100`, rounded to two decimals; 0 when `total` is 0
    pub percent: f64,
    pub description: Option<String>,
}

impl TaskProgress {
    pub fn new(current: u64, total: u64, description: Option<String>) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            ((current as f64 / total as f64) * 100.0 * 100.0).round() / 100.0
        };
        Self {
            current,
            total,
            percent,
            description,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskCreateDBRequest {
    pub id: TaskId,
    pub name: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct TaskDBResponse {
    pub id: TaskId,
    pub name: String,
    pub payload: serde_json::Value,
    pub state: TaskState,
    pub progress: Option<TaskProgress>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Final result of running a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(serde_json::Value),
    Failure(String),
}
