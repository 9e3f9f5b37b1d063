//! Download endpoints
//!
//! Submitting links, polling progress, the websocket push feed, and
//! cancellation. Everything here sits behind the session guard, so the
//! [`CurrentUser`] extension is always present.

use std::time::Duration;

use axum::{Extension, Json};
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ApiError;
use crate::downloader::{BatchRequest, FailedDownload, Progress};
use crate::links::parse_links;
use crate::provider::ContentSource;
use crate::router::AppState;
use crate::session::CurrentUser;
use crate::util::{FolderNode, folder_tree, sanitize_file_name};

/// How often the websocket pushes a snapshot. Matches the terminal linger,
/// so completed and failed downloads are seen at least once.
const PUSH_PERIOD: Duration = Duration::from_millis(1500);

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    /// Comma-separated Google Drive share links.
    pub links: String,
    /// Optional subdirectory under the configured download root.
    pub path: Option<String>,
    /// Optional filename override, applied to every file in the batch.
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub file_ids: Vec<String>,
}

/// `POST /api/download`: parse the links, expand folders into their files,
/// and hand the whole batch to the orchestrator.
pub async fn start(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<DownloadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let parsed = parse_links(&request.links)?;

    let mut file_ids = parsed.file_ids;
    for folder_id in &parsed.folder_ids {
        let members = state
            .drive
            .list_folder(folder_id, &user.access_token)
            .await?;
        debug!(folder_id, files = members.len(), "expanded folder");
        file_ids.extend(members);
    }

    let mut destination = state.download_dir.clone();
    if let Some(sub) = request.path.as_deref().filter(|p| !p.is_empty()) {
        destination = destination.join(sanitize_file_name(sub));
    }

    let batch = BatchRequest {
        file_ids: file_ids.clone(),
        destination,
        owner_id: user.user_id.clone(),
        access_token: user.access_token.clone(),
        file_name: request.file_name.clone(),
    };
    state.orchestrator.start_batch(batch)?;

    Ok((StatusCode::CREATED, Json(StartResponse { file_ids })))
}

/// One progress report: everything active plus failures not yet reported.
/// Shared by the polling endpoint and the websocket feed, so clients that
/// never open the socket still learn about failed transfers.
#[derive(Debug, Serialize)]
pub struct ProgressReport {
    downloads: Vec<Progress>,
    failed: Vec<FailedDownload>,
}

impl ProgressReport {
    fn gather(state: &AppState, user: &CurrentUser) -> Self {
        Self {
            downloads: state.orchestrator.snapshot_all(&user.user_id),
            failed: state.orchestrator.drain_failures(&user.user_id),
        }
    }

    fn is_empty(&self) -> bool {
        self.downloads.is_empty() && self.failed.is_empty()
    }
}

/// `GET /api/progress`: one snapshot of the caller's active downloads and
/// any undelivered failures. 404 when there is neither.
pub async fn progress(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ProgressReport>, StatusCode> {
    let report = ProgressReport::gather(&state, &user);
    if report.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(report))
}

/// `GET /api/folders`: the directory tree under the download root, so the
/// client can pick a destination instead of typing one.
pub async fn folders(State(state): State<AppState>) -> Result<Json<FolderNode>, StatusCode> {
    folder_tree(&state.download_dir).map(Json).map_err(|err| {
        warn!(error = %err, "failed to read the destination tree");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub file_id: String,
}

/// `POST /api/download/cancel`: cancel one of the caller's downloads.
pub async fn cancel(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CancelRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .cancel_one(&request.file_id, &user.user_id)?;
    info!(file_id = %request.file_id, user = %user.user_id, "download cancelled");
    Ok(StatusCode::OK)
}

/// `POST /api/download/cancel-all`: cancel every download the caller owns.
/// A no-op when nothing is running.
pub async fn cancel_all(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> StatusCode {
    state.orchestrator.cancel_all(&user.user_id);
    StatusCode::OK
}

/// `GET /api/progress/ws`: push a progress frame every 1.5 seconds until
/// the caller has nothing in flight.
pub async fn progress_ws(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| push_progress(socket, state, user))
}

async fn push_progress(mut socket: WebSocket, state: AppState, user: CurrentUser) {
    let mut ticker = tokio::time::interval(PUSH_PERIOD);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let push = ProgressReport::gather(&state, &user);

                if push.is_empty() {
                    let _ = socket
                        .send(Message::from("no downloads in progress"))
                        .await;
                    break;
                }

                let Ok(frame) = serde_json::to_string(&push) else {
                    break;
                };
                if socket.send(Message::from(frame)).await.is_err() {
                    debug!(user = %user.user_id, "progress socket closed by peer");
                    break;
                }
            }
            message = socket.recv() => {
                // Any close or error from the peer ends the feed.
                match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}
