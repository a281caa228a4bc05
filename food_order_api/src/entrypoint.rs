//! Worker process entrypoint.
//!
//! The worker shares an application directory with the API process (a mounted volume in
//! container deployments). It waits for that directory, moves into it and only then starts
//! consuming tasks.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, DatabaseConfig};
use crate::db::{self, storage::Storage};
use crate::tasks::{TaskQueue, worker::Worker};

/// Poll until `path` is an existing directory.
///
/// There is no retry limit: every failed attempt is logged and retried after `interval`.
pub async fn wait_for_app_dir(path: &Path, interval: Duration) {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => {
                info!(path = %path.display(), attempt, "Application directory is available");
                return;
            }
            Ok(_) => info!(path = %path.display(), attempt, "Application path is not a directory yet, retrying"),
            Err(e) => info!(path = %path.display(), attempt, error = %e, "Waiting for application directory"),
        }
        tokio::time::sleep(interval).await;
    }
}

/// Run the standalone worker until `shutdown` resolves.
pub async fn run_worker<F>(config: Config, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let database = config.database.clone();
    launch(config, async move { db::connect(&database).await }, shutdown).await
}

/// Wait for `worker.app_dir` and change into it, then open storage and consume tasks until
/// `shutdown` resolves. Storage is only opened once the directory is in place.
pub async fn launch<S, F>(config: Config, storage: S, shutdown: F) -> anyhow::Result<()>
where
    S: Future<Output = anyhow::Result<Arc<dyn Storage>>>,
    F: Future<Output = ()> + Send + 'static,
{
    if let Some(app_dir) = &config.worker.app_dir {
        wait_for_app_dir(app_dir, config.worker.dir_poll_interval).await;
        std::env::set_current_dir(app_dir)?;
        info!(path = %app_dir.display(), "Changed into application directory");
    }

    if config.database == DatabaseConfig::Memory {
        warn!("Worker is using in-memory storage and will only see tasks it enqueues itself");
    }

    let storage = storage.await?;
    let queue = TaskQueue::new(storage.clone());
    let worker = Worker::new(&config, storage, &queue)?;
    info!(worker_id = worker.id(), "Starting {}", worker.settings());

    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));

    shutdown.await;
    token.cancel();
    handle.await?;
    Ok(())
}
