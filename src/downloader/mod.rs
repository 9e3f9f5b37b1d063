//! The download engine
//!
//! Fans a batch of Drive file IDs out into independent worker tasks, tracks
//! per-file progress in a shared ledger, and supports cooperative
//! cancellation of one or all transfers. Nothing in here touches the wire
//! protocol; the HTTP layer only consumes snapshots and drained errors.

pub mod cancel;
pub mod ledger;
pub mod orchestrator;
pub mod progress;
pub mod transfer;

pub use cancel::CancellationRegistry;
pub use ledger::ProgressLedger;
pub use orchestrator::{BatchRequest, FailedDownload, Orchestrator};
pub use progress::Progress;

use std::path::PathBuf;

use thiserror::Error;

use crate::provider::ProviderError;

/// Batch-level validation and lookup failures, rejected synchronously
/// before any worker starts.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("no file IDs were submitted")]
    Empty,

    #[error("duplicate file ID `{0}` in batch")]
    Duplicate(String),

    #[error("file `{0}` is already downloading")]
    AlreadyDownloading(String),

    #[error("no download in progress for `{0}`")]
    NotFound(String),
}

/// Failures isolated to a single transfer. Delivered on that file's error
/// channel; siblings keep running.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("failed to fetch file metadata: {0}")]
    Metadata(#[source] ProviderError),

    #[error("`{0}` is a folder; expand it into files before downloading")]
    IsFolder(String),

    #[error("failed to create destination file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open the download stream: {0}")]
    OpenStream(#[source] ProviderError),

    #[error("failed to read the remote stream: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write the destination file: {0}")]
    Write(#[source] std::io::Error),
}
