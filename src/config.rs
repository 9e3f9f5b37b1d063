//! Config module for drivedl

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct GoogleConfig {
    /// OAuth client ID of the Google Cloud project
    #[clap(env = "DRIVEDL_GOOGLE_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret
    #[clap(env = "DRIVEDL_GOOGLE_CLIENT_SECRET")]
    pub client_secret: String,

    /// Redirect URL registered with the OAuth client
    #[clap(
        env = "DRIVEDL_GOOGLE_REDIRECT_URL",
        default_value = "http://localhost:3000/api/auth/google/callback"
    )]
    pub redirect_url: String,
}

#[derive(Parser, Debug, Clone)]
pub struct Config {
    #[clap(env = "DRIVEDL_HOST", default_value = "0.0.0.0:3000")]
    pub host: String,

    /// Directory downloads are written into
    #[clap(env = "DRIVEDL_DOWNLOAD_DIR", default_value = "downloads/")]
    pub download_dir: PathBuf,

    #[clap(flatten)]
    pub google: GoogleConfig,
}

pub fn config() -> Config {
    Config::parse()
}
