//! OAuth sign-in endpoints
//!
//! `GET /api/auth/{provider}/login` sends the browser to the consent screen
//! with a one-shot CSRF state cookie; `GET /api/auth/{provider}/callback`
//! exchanges the returned code, mints a session, and redirects home.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{AppendHeaders, IntoResponse, Redirect};
use serde::Deserialize;
use tracing::{info, warn};
use ulid::Ulid;

use crate::router::AppState;
use crate::session::{SESSION_COOKIE, STATE_COOKIE, build_cookie, clear_cookie, cookie_value};

/// The consent screen round trip should not take longer than this.
const STATE_COOKIE_TTL_SECS: i64 = 300;
const SESSION_COOKIE_TTL_SECS: i64 = 24 * 3600;

pub async fn login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> impl IntoResponse {
    let provider = match state.providers.get(&provider) {
        Ok(p) => p,
        Err(err) => {
            return (StatusCode::NOT_FOUND, err.to_string()).into_response();
        }
    };

    let csrf_state = Ulid::new().to_string();
    let url = provider.auth_url(&csrf_state);

    (
        AppendHeaders([(
            header::SET_COOKIE,
            build_cookie(STATE_COOKIE, &csrf_state, STATE_COOKIE_TTL_SECS),
        )]),
        Redirect::temporary(&url),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: String,
    state: String,
}

pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let provider = match state.providers.get(&provider) {
        Ok(p) => p,
        Err(err) => return (StatusCode::NOT_FOUND, err.to_string()).into_response(),
    };

    // The state we sent out must come back unchanged.
    match cookie_value(&headers, STATE_COOKIE) {
        Some(sent) if sent == query.state => {}
        _ => {
            warn!(provider = provider.name(), "oauth state mismatch");
            return (StatusCode::UNAUTHORIZED, "state mismatch").into_response();
        }
    }

    let auth = match provider.exchange_code(&query.code).await {
        Ok(auth) => auth,
        Err(err) => {
            warn!(provider = provider.name(), error = %err, "code exchange failed");
            return (StatusCode::UNAUTHORIZED, "sign-in failed").into_response();
        }
    };

    info!(user = %auth.user_id, provider = provider.name(), "user signed in");
    let session_id = state.sessions.create(auth);

    (
        AppendHeaders([
            (
                header::SET_COOKIE,
                build_cookie(SESSION_COOKIE, &session_id, SESSION_COOKIE_TTL_SECS),
            ),
            (header::SET_COOKIE, clear_cookie(STATE_COOKIE)),
        ]),
        Redirect::temporary("/"),
    )
        .into_response()
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(session_id) = cookie_value(&headers, SESSION_COOKIE) {
        state.sessions.remove(&session_id);
    }
    (
        AppendHeaders([(header::SET_COOKIE, clear_cookie(SESSION_COOKIE))]),
        Redirect::temporary("/"),
    )
}
