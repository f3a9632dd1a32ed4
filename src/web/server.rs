use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::console_page::{self, AppState};
use crate::config::WebConfig;

use anyhow::{Context, Result};

pub struct WebServer {
    config: WebConfig,
    state: AppState,
    running: Arc<AtomicBool>,
}

impl WebServer {
    pub fn new(config: WebConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let app = Router::new()
            .merge(console_page::routes(self.state.clone()))
            .layer(TraceLayer::new_for_http());

        self.running.store(true, Ordering::SeqCst);

        let host = &self.config.host;
        let port = self.config.port;
        info!("Starting console on http://{}:{}", host, port);

        let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port))
            .await
            .context(format!("Failed to bind to port {}", port))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(Self::shutdown_signal(self.running.clone()))
            .await
            .context("Failed to serve")?;

        Ok(())
    }

    async fn shutdown_signal(running: Arc<AtomicBool>) {
        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
