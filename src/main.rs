mod api;
mod config;
mod downloader;
mod links;
mod provider;
mod router;
mod session;
mod util;

use std::sync::Arc;

use downloader::Orchestrator;
use provider::{GoogleAuth, GoogleDrive, ProviderRegistry};
use router::{AppState, create_router};
use session::SessionStore;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    color_eyre::install()?;

    let config = config::config();

    if !config.download_dir.exists() {
        tracing::info!(
            "Download directory '{}' does not exist, creating...",
            config.download_dir.display()
        );
        std::fs::create_dir_all(&config.download_dir)?;
    }

    let drive = GoogleDrive::new();
    let orchestrator = Arc::new(Orchestrator::new(drive.clone()));

    let mut providers = ProviderRegistry::new();
    providers.register(GoogleAuth::new(
        config.google.client_id.clone(),
        config.google.client_secret.clone(),
        config.google.redirect_url.clone(),
    ));

    let state = AppState {
        orchestrator: orchestrator.clone(),
        drive,
        sessions: SessionStore::new(),
        providers: Arc::new(providers),
        download_dir: config.download_dir.clone(),
    };

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.host).await?;
    tracing::info!("Listening on: {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop in-flight transfers so partially written files are not left
    // growing after the server exits.
    orchestrator.abort_all();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
    }
    tracing::info!("Shutdown signal received, stopping...");
}
