//! Task worker: claims pending tasks and runs them with bounded concurrency.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Notify, Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Config, WorkerConfig};
use crate::db::models::tasks::{TaskDBResponse, TaskOutcome};
use crate::db::storage::Storage;
use crate::email::EmailService;
use crate::errors::Error;
use crate::tasks::{
    TaskKind, TaskQueue,
    events::{EventPublisher, TaskEvent},
    jobs::{self, JobContext},
};

/// The settings a worker is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub app: String,
    pub concurrency: usize,
    pub log_level: String,
    pub events: bool,
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            app: config.app.clone(),
            concurrency: config.concurrency,
            log_level: config.log_level.clone(),
            events: config.events,
        }
    }
}

/// Renders as the equivalent command line, e.g.
/// `worker -A food_order_api --loglevel=info --concurrency=1 -E`.
impl fmt::Display for WorkerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker -A {} --loglevel={} --concurrency={}",
            self.app, self.log_level, self.concurrency
        )?;
        if self.events {
            f.write_str(" -E")?;
        }
        Ok(())
    }
}

/// Consumer side of the task queue.
///
/// Cheap to clone; each running task holds its own handle.
#[derive(Clone)]
pub struct Worker {
    id: String,
    settings: WorkerSettings,
    storage: Arc<dyn Storage>,
    email: Arc<EmailService>,
    events: EventPublisher,
    wakeup: Arc<Notify>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(config: &Config, storage: Arc<dyn Storage>, queue: &TaskQueue) -> Result<Self, Error> {
        let settings = WorkerSettings::from(&config.worker);
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        Ok(Self {
            id: format!("{}@{hostname}-{}", settings.app, uuid::Uuid::new_v4().simple()),
            events: EventPublisher::new(settings.events),
            settings,
            storage,
            email: Arc::new(EmailService::new(&config.email)?),
            wakeup: queue.wakeup(),
            poll_interval: config.worker.poll_interval,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Receive lifecycle events. Nothing is sent unless events are enabled.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Claim and run tasks until `shutdown` is cancelled, then wait for running tasks.
    #[instrument(skip_all, fields(worker_id = %self.id))]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(settings = %self.settings, "Task worker starting");

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut join_set = JoinSet::new();

        loop {
            while let Some(result) = join_set.try_join_next() {
                if let Err(join_error) = result {
                    error!(error = %join_error, "Task panicked");
                }
            }

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // Never closed while the loop runs
                    Err(_) => break,
                },
            };

            match self.storage.claim_task(&self.id).await {
                Ok(Some(task)) => {
                    let worker = self.clone();
                    join_set.spawn(async move {
                        let _permit = permit;
                        worker.execute(task).await;
                    });
                    continue;
                }
                Ok(None) => drop(permit),
                Err(e) => {
                    drop(permit);
                    warn!(error = %e, "Failed to claim task");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.wakeup.notified() => debug!("Woken by new task"),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(running = join_set.len(), "Task worker shutting down, waiting for running tasks");
        while let Some(result) = join_set.join_next().await {
            if let Err(join_error) = result {
                error!(error = %join_error, "Task panicked");
            }
        }
        info!("Task worker stopped");
    }

    /// Run queued tasks one at a time until none are pending. Returns how many ran.
    pub async fn run_pending(&self) -> crate::db::errors::Result<usize> {
        let mut count = 0;
        while let Some(task) = self.storage.claim_task(&self.id).await? {
            self.execute(task).await;
            count += 1;
        }
        Ok(count)
    }

    #[instrument(skip_all, fields(task_id = %task.id, task = %task.name))]
    async fn execute(&self, task: TaskDBResponse) {
        self.events.publish(TaskEvent::TaskReceived {
            uuid: task.id,
            name: task.name.clone(),
        });
        self.events.publish(TaskEvent::TaskStarted {
            uuid: task.id,
            worker: self.id.clone(),
        });
        let started = Instant::now();

        let outcome = match serde_json::from_value::<TaskKind>(task.payload) {
            Ok(kind) => {
                let ctx = JobContext {
                    storage: self.storage.as_ref(),
                    email: &self.email,
                    events: &self.events,
                };
                jobs::execute(task.id, kind, &ctx).await
            }
            Err(e) => TaskOutcome::Failure(format!("Unknown task payload for {}: {e}", task.name)),
        };
        let runtime = started.elapsed().as_secs_f64();

        match &outcome {
            TaskOutcome::Success(result) => {
                info!(runtime, "Task succeeded");
                self.events.publish(TaskEvent::TaskSucceeded {
                    uuid: task.id,
                    result: result.clone(),
                    runtime,
                });
            }
            TaskOutcome::Failure(exception) => {
                warn!(runtime, error = %exception, "Task failed");
                self.events.publish(TaskEvent::TaskFailed {
                    uuid: task.id,
                    exception: exception.clone(),
                    runtime,
                });
            }
        }

        if let Err(e) = self.storage.finish_task(task.id, &outcome).await {
            error!(error = %e, "Failed to record task outcome");
        }
    }
}
