//! Persistence layer: storage models, the [`Storage`](storage::Storage) trait and its
//! in-memory and PostgreSQL backends.

pub mod errors;
pub mod models;
pub mod storage;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::DatabaseConfig;
use storage::{Storage, in_memory::InMemoryStorage, postgres::PostgresStorage};

/// Open the configured storage backend, running migrations for postgres.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn Storage>> {
    match config {
        DatabaseConfig::Memory => {
            info!("Using in-memory storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        DatabaseConfig::Postgres { url, max_connections } => {
            let pool = PgPoolOptions::new().max_connections(*max_connections).connect(url).await?;
            crate::migrator().run(&pool).await?;
            info!("Connected to PostgreSQL and applied migrations");
            Ok(Arc::new(PostgresStorage::new(pool)))
        }
    }
}
