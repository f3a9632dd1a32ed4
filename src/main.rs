use anyhow::Result;
use std::sync::Arc;

use gcs_console::config::CONFIG;
use gcs_console::planning::{PlanningClient, PlanningSessionController};
use gcs_console::telemetry::{Readiness, TelemetryClient};
use gcs_console::web::{AppState, WebServer};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging(&CONFIG.general.log_level)?;
    info!("GCS console starting...");

    // Create a shutdown signal channel
    let (shutdown_tx, _) = broadcast::channel(1);

    let telemetry = Arc::new(TelemetryClient::new(CONFIG.telemetry.clone()));
    let planner = PlanningClient::new(&CONFIG.planner)?;
    let readiness: Arc<dyn Readiness> = telemetry.clone();
    let session = Arc::new(PlanningSessionController::new(planner, readiness));

    if !session.check_connection().await {
        warn!(
            "Planning service at {} is not ready, sending disabled until re-checked",
            CONFIG.planner.base_url
        );
    }

    if CONFIG.telemetry.auto_connect {
        telemetry.connect().await;
    } else {
        info!("Telemetry auto-connect disabled in config, skipping...");
    }

    let web_server = WebServer::new(
        CONFIG.web.clone(),
        AppState {
            session,
            telemetry: telemetry.clone(),
        },
    );
    let web_handle = spawn_web_server(web_server, shutdown_tx.subscribe()).await;

    let shutdown_signal = async {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping services...");
                if shutdown_tx.send(()).is_err() {
                    warn!("No services listening for shutdown");
                }
            }
            Err(err) => {
                error!("Failed to listen for shutdown signal: {}", err);
            }
        }
    };

    let (web_result, _) = tokio::join!(web_handle, shutdown_signal);
    if let Err(e) = web_result {
        error!("Web server join error: {}", e);
    }

    telemetry.disconnect().await;
    info!("All services stopped, shutting down");

    Ok(())
}

async fn spawn_web_server(
    server: WebServer,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = server.start() => {
                if let Err(e) = result {
                    error!("Web server error: {:#}", e);
                }
            }
            _ = shutdown.recv() => {
                info!("Shutting down web server...");
                server.stop().await;
            }
        }
    })
}

fn setup_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?
        .add_directive("hyper=info".parse()?)
        .add_directive("tungstenite=info".parse()?);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true) // Show module path
                .with_file(true) // Show file name
                .with_line_number(true), // Show line numbers
        )
        .with(filter)
        .try_init()?;
    Ok(())
}
