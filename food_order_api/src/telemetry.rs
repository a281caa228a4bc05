//! Tracing initialization.
//!
//! Logs go to stdout through the `tracing-subscriber` fmt layer. The filter comes from
//! `RUST_LOG` when set, otherwise from the level passed in (`log_level` for the API process,
//! `worker.log_level` for the worker).

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(default_level: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!(default_level, "Telemetry initialized");
    Ok(())
}
