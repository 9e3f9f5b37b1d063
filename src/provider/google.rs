//! Google Drive and Google OAuth
//!
//! [`GoogleDrive`] talks to the Drive v3 REST API with a bearer token:
//! metadata lookups, `alt=media` streaming downloads, and folder listings.
//! [`GoogleAuth`] runs the authorization-code flow against the Google OAuth
//! endpoints and resolves the signed-in account's email.

use chrono::{Duration, Utc};
use futures_util::TryStreamExt;
use futures_util::future::BoxFuture;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::{
    AuthProvider, Authenticated, ByteStream, ContentSource, GOOGLE_PROVIDER, ProviderError,
    RemoteFile, TokenSet,
};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files";
const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

const SCOPES: &str = "https://www.googleapis.com/auth/drive.readonly \
                      https://www.googleapis.com/auth/userinfo.email";

fn status_error(status: http::StatusCode, context: String) -> ProviderError {
    ProviderError::Status { status, context }
}

#[derive(Debug, Clone, Default)]
pub struct GoogleDrive {
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    /// Drive reports sizes as decimal strings, and omits the field entirely
    /// for folders and Google-native documents.
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileList {
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

impl GoogleDrive {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl ContentSource for GoogleDrive {
    async fn fetch_metadata(
        &self,
        file_id: &str,
        access_token: &str,
    ) -> Result<RemoteFile, ProviderError> {
        let url = format!("{DRIVE_API}/{file_id}?fields=id,name,mimeType,size");
        let response = self.client.get(url).bearer_auth(access_token).send().await?;

        if !response.status().is_success() {
            return Err(status_error(
                response.status(),
                format!("metadata of {file_id}"),
            ));
        }

        let file: DriveFile = response.json().await?;
        debug!(file_id = %file.id, name = %file.name, "fetched drive metadata");

        Ok(RemoteFile {
            is_folder: file.mime_type == FOLDER_MIME,
            total_bytes: file.size.and_then(|s| s.parse().ok()).unwrap_or(0),
            name: file.name,
        })
    }

    async fn open_stream(
        &self,
        file_id: &str,
        access_token: &str,
    ) -> Result<ByteStream, ProviderError> {
        let url = format!("{DRIVE_API}/{file_id}?alt=media");
        let response = self.client.get(url).bearer_auth(access_token).send().await?;

        if !response.status().is_success() {
            return Err(status_error(
                response.status(),
                format!("media download of {file_id}"),
            ));
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn list_folder(
        &self,
        folder_id: &str,
        access_token: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let mut file_ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", format!("'{folder_id}' in parents and trashed = false")),
                ("fields", "files(id,name,mimeType,size),nextPageToken".to_string()),
                ("pageSize", "1000".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }
            let url = Url::parse_with_params(DRIVE_API, &params)
                .expect("static drive endpoint URL is valid");

            let response = self.client.get(url).bearer_auth(access_token).send().await?;
            if !response.status().is_success() {
                return Err(status_error(
                    response.status(),
                    format!("listing of folder {folder_id}"),
                ));
            }

            let page: DriveFileList = response.json().await?;
            file_ids.extend(page.files.into_iter().map(|f| f.id));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(folder_id, files = file_ids.len(), "listed drive folder");
        Ok(file_ids)
    }
}

pub struct GoogleAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: String,
}

impl GoogleAuth {
    pub fn new(client_id: String, client_secret: String, redirect_url: String) -> Self {
        Self {
            client: Client::new(),
            client_id,
            client_secret,
            redirect_url,
        }
    }
}

impl AuthProvider for GoogleAuth {
    fn name(&self) -> &'static str {
        GOOGLE_PROVIDER
    }

    fn auth_url(&self, state: &str) -> String {
        // offline access so Google issues a refresh token
        Url::parse_with_params(
            AUTH_ENDPOINT,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "offline"),
                ("state", state),
            ],
        )
        .expect("static auth endpoint URL is valid")
        .to_string()
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Authenticated, ProviderError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(TOKEN_ENDPOINT)
                .form(&[
                    ("code", code),
                    ("client_id", &self.client_id),
                    ("client_secret", &self.client_secret),
                    ("redirect_uri", &self.redirect_url),
                    ("grant_type", "authorization_code"),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::TokenExchange(format!("{status}: {body}")));
            }

            let tokens: TokenResponse = response.json().await?;

            let response = self
                .client
                .get(USERINFO_ENDPOINT)
                .bearer_auth(&tokens.access_token)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(status_error(response.status(), "userinfo".to_string()));
            }
            let user: UserInfo = response.json().await?;

            Ok(Authenticated {
                user_id: user.email,
                token: TokenSet {
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                    expires_at: Utc::now() + Duration::seconds(tokens.expires_in),
                },
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_url_carries_state_and_scopes() {
        let auth = GoogleAuth::new(
            "client-123".to_string(),
            "secret".to_string(),
            "http://localhost:3000/api/auth/google/callback".to_string(),
        );

        let url = auth.auth_url("csrf-token");
        assert!(url.starts_with(AUTH_ENDPOINT));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("state=csrf-token"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("drive.readonly"));
        assert!(!url.contains("secret"));
    }
}
