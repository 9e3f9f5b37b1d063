//! Transfer executor
//!
//! Moves one file's bytes from the drive to local disk in fixed 32 KiB
//! chunks, emitting a progress snapshot per chunk. Cancellation is checked
//! cooperatively before every read, so a triggered token is observed within
//! one chunk's I/O latency.

use std::path::PathBuf;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::{Progress, TransferError};
use crate::provider::ContentSource;
use crate::util::{create_dest_file, sanitize_file_name};

/// Streaming the body in 32 KiB chunks is fast and memory efficient.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Everything one worker needs to move one file.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub file_id: String,
    pub owner_id: String,
    /// Directory the file lands in. Validated upstream.
    pub destination: PathBuf,
    /// Explicit filename override; falls back to the drive's reported name.
    pub file_name: Option<String>,
    pub access_token: String,
}

/// How a transfer ended when nothing went wrong.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The cancel token fired. Not an error and not a completion: no
    /// terminal event is emitted.
    Cancelled,
}

/// Run one transfer to completion, cancellation, or failure.
///
/// Emits an initial zero-byte snapshot before the first read so observers
/// see the file the moment the transfer starts, and a terminal snapshot
/// with `complete = true` on the success path only.
#[instrument(level = "debug", skip_all, fields(file_id = %job.file_id))]
pub async fn run<C: ContentSource>(
    source: &C,
    job: &TransferJob,
    cancel: CancellationToken,
    progress_tx: mpsc::Sender<Progress>,
) -> Result<Outcome, TransferError> {
    let meta = source
        .fetch_metadata(&job.file_id, &job.access_token)
        .await
        .map_err(TransferError::Metadata)?;

    if meta.is_folder {
        return Err(TransferError::IsFolder(job.file_id.clone()));
    }

    let file_name = match &job.file_name {
        Some(name) if !name.is_empty() => name.clone(),
        _ => meta.name.clone(),
    };
    let dest_path = job.destination.join(sanitize_file_name(&file_name));
    debug!(path = ?dest_path, "destination resolved");

    let mut dest = create_dest_file(&dest_path)
        .await
        .map_err(|source| TransferError::CreateFile {
            path: dest_path.clone(),
            source,
        })?;

    let mut prog = Progress::new(&job.file_id, &job.owner_id, meta.total_bytes);
    let _ = progress_tx.send(prog.clone()).await;

    let mut stream = source
        .open_stream(&job.file_id, &job.access_token)
        .await
        .map_err(TransferError::OpenStream)?;

    info!(file = %file_name, bytes = meta.total_bytes, "downloading");

    let started = Instant::now();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        if cancel.is_cancelled() {
            info!("download cancelled");
            return Ok(Outcome::Cancelled);
        }

        let n = stream.read(&mut buf).await.map_err(TransferError::Read)?;
        if n == 0 {
            break;
        }

        dest.write_all(&buf[..n])
            .await
            .map_err(TransferError::Write)?;

        prog.record_chunk(n as u64, started.elapsed().as_secs_f64());
        let _ = progress_tx.send(prog.clone()).await;
    }

    dest.flush().await.map_err(TransferError::Write)?;

    prog.finish();
    let _ = progress_tx.send(prog).await;

    info!(file = %file_name, "download complete");
    Ok(Outcome::Completed)
}
