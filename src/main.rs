// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::application::lab_service::LabService;
use crate::application::notes::{InMemoryNoteStore, NoteStore};
use crate::application::tutor::{TutorClient, TutorService};
use crate::infrastructure::config::{LabConfig, load_lab_config};
use crate::infrastructure::file_notes::JsonFileNoteStore;
use crate::infrastructure::http_tutor::HttpTutorClient;
use crate::presentation::app_state::AppState;
use crate::presentation::router::create_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_lab_config()?;
    tracing::info!(sensors = config.sensors.len(), "configuration loaded");

    // Create services (application layer)
    let lab = LabService::new(
        config.sensors.clone(),
        config.pipeline.channel_settings(),
        config.pipeline.default_source,
    );
    let tutor = TutorService::new(build_tutor_client(&config)?);
    let notes = build_note_store(&config).await?;

    // Create application state
    let state = Arc::new(AppState {
        lab: lab.clone(),
        tutor,
        notes,
    });

    // Build router (presentation layer)
    let router = create_router(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "starting sensor-lab service");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    lab.shutdown().await;
    tracing::info!("sensor-lab service stopped");
    Ok(())
}

fn build_tutor_client(config: &LabConfig) -> anyhow::Result<Option<Arc<dyn TutorClient>>> {
    match &config.tutor.base_url {
        Some(base_url) => {
            let client = HttpTutorClient::new(base_url, Duration::from_millis(config.tutor.timeout_ms))?;
            tracing::info!(%base_url, "tutor backend configured");
            Ok(Some(Arc::new(client)))
        }
        None => {
            tracing::info!("no tutor backend configured, using local explanations");
            Ok(None)
        }
    }
}

async fn build_note_store(config: &LabConfig) -> anyhow::Result<Arc<dyn NoteStore>> {
    match &config.notes.path {
        Some(path) => Ok(Arc::new(JsonFileNoteStore::open(path).await?)),
        None => Ok(Arc::new(InMemoryNoteStore::new())),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
