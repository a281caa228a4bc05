//! Background task queue.
//!
//! Work that should not run inside an HTTP request (sending mail, bulk product imports) is
//! persisted as a task through [`TaskQueue::delay`] and executed by a [`worker::Worker`],
//! either embedded in the HTTP process or running as the separate `worker` subcommand.
//!
//! Tasks move through `PENDING -> STARTED -> (PROGRESS ->) SUCCESS | FAILURE`. Claiming is
//! atomic in storage, so no task runs twice even with several workers.
//!
//! - [`events`]: lifecycle events for external monitoring
//! - [`jobs`]: the task implementations
//! - [`progress`]: progress reporting from inside a running task
//! - [`worker`]: the claim/execute loop

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::instrument;
use uuid::Uuid;

use crate::api::models::products::ProductCreate;
use crate::db::errors::Result;
use crate::db::models::tasks::{TaskCreateDBRequest, TaskDBResponse};
use crate::db::storage::Storage;
use crate::types::TaskId;

pub mod events;
pub mod jobs;
pub mod progress;
pub mod worker;

/// A unit of background work and its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    SendMail {
        subject: String,
        message: String,
        recipients: Vec<String>,
    },
    /// Items are validated when the task runs, not when it is queued
    BulkCreateProducts {
        items: Vec<ProductCreate>,
    },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::SendMail { .. } => "send_mail",
            TaskKind::BulkCreateProducts { .. } => "bulk_create_products",
        }
    }
}

/// Producer side of the queue, shared through the application state.
#[derive(Clone)]
pub struct TaskQueue {
    storage: Arc<dyn Storage>,
    wakeup: Arc<Notify>,
}

impl TaskQueue {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            wakeup: Arc::new(Notify::new()),
        }
    }

    /// Signalled whenever a task is enqueued by this process.
    pub fn wakeup(&self) -> Arc<Notify> {
        self.wakeup.clone()
    }

    /// Enqueue a task and return its id.
    #[instrument(skip_all, fields(task = kind.name()), err)]
    pub async fn delay(&self, kind: TaskKind) -> Result<TaskId> {
        let payload = serde_json::to_value(&kind).map_err(anyhow::Error::from)?;
        let task = self
            .storage
            .create_task(&TaskCreateDBRequest {
                id: Uuid::new_v4(),
                name: kind.name().to_string(),
                payload,
            })
            .await?;
        tracing::debug!(task_id = %task.id, "Task enqueued");
        self.wakeup.notify_one();
        Ok(task.id)
    }

    pub async fn get(&self, id: TaskId) -> Result<Option<TaskDBResponse>> {
        self.storage.get_task(id).await
    }
}
