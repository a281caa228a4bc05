use clap::Parser;
use food_order_api::{
    Application, Config,
    config::{Args, Command},
    entrypoint, telemetry,
};

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before the SMTP transport or the database pool build a TLS client
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    match args.command.unwrap_or_default() {
        Command::Serve => {
            telemetry::init_telemetry(&config.log_level)?;
            tracing::debug!("{:?}", args);
            Application::new(config).await?.serve(shutdown_signal()).await
        }
        Command::Worker => {
            telemetry::init_telemetry(&config.worker.log_level)?;
            tracing::debug!("{:?}", args);
            entrypoint::run_worker(config, shutdown_signal()).await
        }
    }
}
