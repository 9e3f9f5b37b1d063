//! Remote content and identity providers
//!
//! Two seams into the outside world: [`ContentSource`] for reading file
//! metadata and bytes, and [`AuthProvider`] for the OAuth handshake.
//! `ContentSource` stays generic so workers can be spawned without boxing
//! every future; `AuthProvider` is object safe so the registry can hold
//! providers behind a name.

pub mod google;
pub mod registry;

pub use google::{GoogleAuth, GoogleDrive};
pub use registry::ProviderRegistry;

use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Registry key of the Google provider.
pub const GOOGLE_PROVIDER: &str = "google";

/// The raw byte stream of one remote file.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request to the provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status} for {context}")]
    Status {
        status: http::StatusCode,
        context: String,
    },

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("no provider registered under `{0}`")]
    NotRegistered(String),
}

/// Metadata of one remote entry, file or folder.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub name: String,
    /// 0 when the provider does not report a size.
    pub total_bytes: u64,
    pub is_folder: bool,
}

/// Read access to a remote drive.
pub trait ContentSource: Send + Sync + 'static {
    fn fetch_metadata(
        &self,
        file_id: &str,
        access_token: &str,
    ) -> impl Future<Output = Result<RemoteFile, ProviderError>> + Send;

    fn open_stream(
        &self,
        file_id: &str,
        access_token: &str,
    ) -> impl Future<Output = Result<ByteStream, ProviderError>> + Send;

    /// IDs of the files directly inside a folder. Nested folders are listed
    /// as-is; the caller decides whether to recurse.
    fn list_folder(
        &self,
        folder_id: &str,
        access_token: &str,
    ) -> impl Future<Output = Result<Vec<String>, ProviderError>> + Send;
}

/// Tokens handed back by a successful code exchange.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// A signed-in identity plus its tokens.
#[derive(Debug, Clone)]
pub struct Authenticated {
    /// Stable user identifier at the provider, here the account email.
    pub user_id: String,
    pub token: TokenSet,
}

/// The OAuth authorization-code flow, one implementation per provider.
pub trait AuthProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Consent-screen URL carrying the caller's CSRF state.
    fn auth_url(&self, state: &str) -> String;

    /// Swap the callback code for tokens and resolve who signed in.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Authenticated, ProviderError>>;
}

impl std::fmt::Debug for dyn AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthProvider")
            .field("name", &self.name())
            .finish()
    }
}
