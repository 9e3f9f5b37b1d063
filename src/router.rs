//! Route table and shared application state

use std::path::PathBuf;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::{auth, download};
use crate::downloader::Orchestrator;
use crate::provider::{GoogleDrive, ProviderRegistry};
use crate::session::{self, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator<GoogleDrive>>,
    /// Separate handle for folder expansion at submit time; the
    /// orchestrator's copy feeds the workers.
    pub drive: GoogleDrive,
    pub sessions: SessionStore,
    pub providers: Arc<ProviderRegistry>,
    pub download_dir: PathBuf,
}

/// Everything that requires a signed-in user.
fn guarded_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/download", post(download::start))
        .route("/download/cancel", post(download::cancel))
        .route("/download/cancel-all", post(download::cancel_all))
        .route("/folders", get(download::folders))
        .route("/progress", get(download::progress))
        .route("/progress/ws", get(download::progress_ws))
        .layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            session::require_session,
        ))
}

fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/{provider}/login", get(auth::login))
        .route("/auth/{provider}/callback", get(auth::callback))
        .route("/auth/logout", post(auth::logout))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", guarded_router(state.clone()).merge(auth_router()))
        .fallback_service(ServeDir::new("www"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
