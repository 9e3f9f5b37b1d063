//! Cookie sessions
//!
//! An in-memory session store keyed by ULID, plus the axum middleware that
//! turns a session cookie into a [`CurrentUser`] for the guarded routes.
//! Sessions die with the process; signing in again is cheap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use ulid::Ulid;

use crate::provider::{Authenticated, TokenSet};

pub const SESSION_COOKIE: &str = "drivedl_session";
pub const STATE_COOKIE: &str = "drivedl_oauth_state";

/// Session lifetime. Access tokens expire sooner; `get` checks both.
const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub token: TokenSet,
    pub expires_at: DateTime<Utc>,
}

/// The identity handed to request handlers behind the session guard.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a session for a freshly authenticated user, returning its ID.
    pub fn create(&self, auth: Authenticated) -> String {
        let id = Ulid::new().to_string();
        let session = Session {
            user_id: auth.user_id,
            token: auth.token,
            expires_at: Utc::now() + Duration::hours(SESSION_TTL_HOURS),
        };
        self.inner.lock().unwrap().insert(id.clone(), session);
        id
    }

    /// Look a session up, evicting it when the session or its access token
    /// has expired.
    pub fn get(&self, session_id: &str) -> Option<Session> {
        let mut map = self.inner.lock().unwrap();
        let session = map.get(session_id)?;
        if session.expires_at <= Utc::now() || !session.token.is_valid() {
            debug!(session_id, "evicting expired session");
            map.remove(session_id);
            return None;
        }
        Some(session.clone())
    }

    pub fn remove(&self, session_id: &str) {
        self.inner.lock().unwrap().remove(session_id);
    }
}

/// Pull one cookie's value out of the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Build a `Set-Cookie` value for a host-scoped, HTTP-only cookie.
pub fn build_cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}")
}

/// A `Set-Cookie` value that deletes the named cookie.
pub fn clear_cookie(name: &str) -> String {
    build_cookie(name, "", 0)
}

/// Middleware guarding the API: resolves the session cookie and injects a
/// [`CurrentUser`], or rejects with 401.
pub async fn require_session(
    State(sessions): State<SessionStore>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let session_id = cookie_value(request.headers(), SESSION_COOKIE)
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let session = sessions.get(&session_id).ok_or(StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(CurrentUser {
        user_id: session.user_id,
        access_token: session.token.access_token,
    });
    Ok(next.run(request).await)
}
