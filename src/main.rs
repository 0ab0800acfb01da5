//! Switchboard server binary.

use std::process::ExitCode;

use switchboard::config::AppConfig;
use switchboard::server::{self, ServerError};
use switchboard::telemetry;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load_validated() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("switchboard: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = telemetry::init(&config.server) {
        eprintln!("switchboard: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<(), ServerError> {
    let addr = config.server.socket_addr()?;
    let app = server::build_app(&config).await?;
    let listener = TcpListener::bind(addr).await?;
    server::serve(listener, app, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
