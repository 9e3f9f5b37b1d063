//! Download orchestrator
//!
//! Accepts a validated batch, spawns one transfer worker per file, wires
//! each worker's progress stream into the ledger, and owns the cancellation
//! registry. Workers are fully independent: one file failing or being
//! cancelled never affects its siblings.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::cancel::CancellationRegistry;
use super::ledger::ProgressLedger;
use super::progress::Progress;
use super::transfer::{self, Outcome, TransferJob};
use super::{BatchError, TransferError};
use crate::provider::ContentSource;

/// How long a terminal state stays visible before the record is evicted.
/// One websocket push period, so every observer sees it at least once.
pub const TERMINAL_LINGER: Duration = Duration::from_millis(1500);

/// One accepted download request.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Concrete file IDs; folders must be expanded before this point.
    pub file_ids: Vec<String>,
    pub destination: PathBuf,
    pub owner_id: String,
    pub access_token: String,
    /// Optional filename override, applied to every file in the batch.
    pub file_name: Option<String>,
}

/// A per-file transfer failure, drained by the observation layer.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDownload {
    pub file_id: String,
    pub error: String,
}

type FailureChannels = Mutex<HashMap<String, (String, mpsc::Receiver<TransferError>)>>;

pub struct Orchestrator<C> {
    source: Arc<C>,
    ledger: ProgressLedger,
    cancellations: CancellationRegistry,
    /// `file_id -> (owner_id, error receiver)`. The worker drops its sender
    /// in the finalizer; the buffered receiver stays here until an observer
    /// drains it, so a failure is reported exactly once.
    failures: Arc<FailureChannels>,
    terminal_linger: Duration,
}

impl<C: ContentSource> Orchestrator<C> {
    pub fn new(source: C) -> Self {
        Self {
            source: Arc::new(source),
            ledger: ProgressLedger::new(),
            cancellations: CancellationRegistry::new(),
            failures: Arc::new(Mutex::new(HashMap::new())),
            terminal_linger: TERMINAL_LINGER,
        }
    }

    /// Shorten the eviction delay. Tests use this to keep scenarios fast.
    pub fn with_terminal_linger(mut self, linger: Duration) -> Self {
        self.terminal_linger = linger;
        self
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    /// Validate and launch a batch. The whole batch is rejected before any
    /// worker starts when it is empty, repeats a file ID, or names a file
    /// that is already downloading.
    pub fn start_batch(&self, request: BatchRequest) -> Result<(), BatchError> {
        if request.file_ids.is_empty() {
            return Err(BatchError::Empty);
        }

        let mut seen = HashSet::new();
        for file_id in &request.file_ids {
            if !seen.insert(file_id.as_str()) {
                return Err(BatchError::Duplicate(file_id.clone()));
            }
        }

        // Claims every key atomically; holding the records in the ledger is
        // what enforces at-most-one-worker-per-key from here on.
        let records = request
            .file_ids
            .iter()
            .map(|id| Progress::new(id, &request.owner_id, 0))
            .collect();
        self.ledger.insert_batch(records)?;

        info!(
            owner = %request.owner_id,
            files = request.file_ids.len(),
            destination = ?request.destination,
            "starting download batch"
        );

        for file_id in &request.file_ids {
            self.spawn_worker(file_id.clone(), &request);
        }

        Ok(())
    }

    fn spawn_worker(&self, file_id: String, request: &BatchRequest) {
        let token = CancellationToken::new();
        self.cancellations.register(&file_id, token.clone());

        let (progress_tx, mut progress_rx) = mpsc::channel::<Progress>(32);
        let (error_tx, error_rx) = mpsc::channel::<TransferError>(1);
        self.failures
            .lock()
            .unwrap()
            .insert(file_id.clone(), (request.owner_id.clone(), error_rx));

        // Fan-in: the worker is the sole producer for its key, this task the
        // sole path into the ledger for it.
        let consumer_ledger = self.ledger.clone();
        let consumer = tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                consumer_ledger.upsert(progress);
            }
        });

        let job = TransferJob {
            file_id,
            owner_id: request.owner_id.clone(),
            destination: request.destination.clone(),
            file_name: request.file_name.clone(),
            access_token: request.access_token.clone(),
        };
        let source = Arc::clone(&self.source);
        let ledger = self.ledger.clone();
        let cancellations = self.cancellations.clone();
        let linger = self.terminal_linger;

        tokio::spawn(async move {
            let result = transfer::run(source.as_ref(), &job, token, progress_tx).await;

            // Finalizer. This is the only cleanup path for the worker and it
            // runs exactly once: drain the progress stream into the ledger,
            // report a failure if there was one, then evict.
            let _ = consumer.await;

            match result {
                Ok(Outcome::Completed) => {}
                Ok(Outcome::Cancelled) => {
                    info!(file_id = %job.file_id, "worker stopped on cancellation");
                }
                Err(err) => {
                    error!(file_id = %job.file_id, error = %err, "download failed");
                    let _ = error_tx.try_send(err);
                }
            }

            // Leave the terminal state visible for one observation tick.
            tokio::time::sleep(linger).await;

            cancellations.unregister(&job.file_id);
            ledger.delete(&job.file_id);
        });
    }

    /// Cancel one download owned by `owner_id`.
    ///
    /// Racing a worker that just finished naturally is fine: once its record
    /// is evicted this reports not-found, and triggering during the eviction
    /// linger is a harmless no-op.
    pub fn cancel_one(&self, file_id: &str, owner_id: &str) -> Result<(), BatchError> {
        self.ledger.snapshot_one(file_id, owner_id)?;
        self.cancellations.trigger(file_id);
        Ok(())
    }

    /// Cancel every in-flight download owned by `owner_id`. A no-op when
    /// there are none.
    pub fn cancel_all(&self, owner_id: &str) {
        for progress in self.ledger.snapshot_all(owner_id) {
            self.cancellations.trigger(&progress.file_id);
        }
    }

    /// Blanket cancellation of every registered download, regardless of
    /// owner. Used on shutdown.
    pub fn abort_all(&self) {
        self.cancellations.trigger_all();
    }

    /// Owner-scoped progress snapshot.
    pub fn snapshot_all(&self, owner_id: &str) -> Vec<Progress> {
        self.ledger.snapshot_all(owner_id)
    }

    pub fn snapshot_one(&self, file_id: &str, owner_id: &str) -> Result<Progress, BatchError> {
        self.ledger.snapshot_one(file_id, owner_id)
    }

    /// Pull any transfer failures for this owner that have not been
    /// reported yet. Each failure is yielded exactly once; channels of
    /// workers that finished without error are swept out here.
    pub fn drain_failures(&self, owner_id: &str) -> Vec<FailedDownload> {
        let mut channels = self.failures.lock().unwrap();
        let mut failed = Vec::new();

        channels.retain(|file_id, (owner, rx)| {
            if owner != owner_id {
                // Workers that ended without an error leave a closed, empty
                // channel behind. Sweep those no matter who is draining, so
                // owners that never drain do not accumulate entries.
                return !(rx.is_closed() && rx.is_empty());
            }
            match rx.try_recv() {
                Ok(err) => {
                    failed.push(FailedDownload {
                        file_id: file_id.clone(),
                        error: err.to_string(),
                    });
                    false
                }
                Err(mpsc::error::TryRecvError::Empty) => true,
                Err(mpsc::error::TryRecvError::Disconnected) => false,
            }
        });

        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::support::{Behavior, MockDrive};
    use std::time::Instant;

    const LINGER: Duration = Duration::from_millis(150);

    fn orchestrator(drive: MockDrive) -> Orchestrator<MockDrive> {
        Orchestrator::new(drive).with_terminal_linger(LINGER)
    }

    fn request(file_ids: &[&str], dir: &std::path::Path) -> BatchRequest {
        BatchRequest {
            file_ids: file_ids.iter().map(|s| s.to_string()).collect(),
            destination: dir.to_path_buf(),
            owner_id: "tester".to_string(),
            access_token: "token".to_string(),
            file_name: None,
        }
    }

    async fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn batch_completes_then_records_are_evicted() {
        let drive = MockDrive::new();
        drive.add_file("a", "a.bin", vec![1; 300]);
        drive.add_file("b", "b.bin", vec![2; 600]);
        drive.add_file("c", "c.bin", vec![3; 900]);

        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(drive);
        orch.start_batch(request(&["a", "b", "c"], dir.path()))
            .unwrap();

        // One record and one cancellation entry per key, immediately.
        assert_eq!(orch.ledger().len(), 3);

        // Every file reaches a visible complete=true, percent=100 snapshot.
        let all_complete = wait_for(
            || {
                let snaps = orch.snapshot_all("tester");
                snaps.len() == 3 && snaps.iter().all(|p| p.complete && p.percent == 100)
            },
            Duration::from_secs(3),
        )
        .await;
        assert!(all_complete, "terminal snapshots never became visible");

        // One tick later everything is gone, including cancellation entries.
        let evicted = wait_for(
            || orch.ledger().is_empty(),
            LINGER + Duration::from_secs(2),
        )
        .await;
        assert!(evicted);
        assert!(orch.drain_failures("tester").is_empty());

        for (name, len) in [("a.bin", 300), ("b.bin", 600), ("c.bin", 900)] {
            assert_eq!(std::fs::read(dir.path().join(name)).unwrap().len(), len);
        }
    }

    #[tokio::test]
    async fn duplicate_key_rejects_whole_batch() {
        let drive = MockDrive::new();
        drive.add_file("a", "a.bin", vec![0; 10]);
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(drive);

        let err = orch
            .start_batch(request(&["a", "b", "a"], dir.path()))
            .unwrap_err();
        assert!(matches!(err, BatchError::Duplicate(ref id) if id == "a"));
        assert!(orch.ledger().is_empty());
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let orch = orchestrator(MockDrive::new());
        let dir = tempfile::tempdir().unwrap();
        let err = orch.start_batch(request(&[], dir.path())).unwrap_err();
        assert!(matches!(err, BatchError::Empty));
    }

    #[tokio::test]
    async fn key_already_in_flight_rejects_new_batch() {
        let drive = MockDrive::new();
        drive.add_with_behavior("slow", "slow.bin", 0, Behavior::Endless);
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(drive);

        orch.start_batch(request(&["slow"], dir.path())).unwrap();
        let err = orch
            .start_batch(request(&["slow"], dir.path()))
            .unwrap_err();
        assert!(matches!(err, BatchError::AlreadyDownloading(_)));

        orch.cancel_all("tester");
    }

    #[tokio::test]
    async fn stream_failure_reports_exactly_one_error_and_never_completes() {
        let drive = MockDrive::new();
        drive.add_with_behavior("bad", "bad.bin", 500, Behavior::FailOpen);
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(drive);

        orch.start_batch(request(&["bad"], dir.path())).unwrap();

        let mut failures = Vec::new();
        let got_error = wait_for(
            || {
                // The record must never show complete while it exists.
                if let Ok(p) = orch.snapshot_one("bad", "tester") {
                    assert!(!p.complete);
                }
                failures.extend(orch.drain_failures("tester"));
                !failures.is_empty()
            },
            Duration::from_secs(3),
        )
        .await;
        assert!(got_error);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].file_id, "bad");

        // Exactly once: nothing more to drain, and the record goes away.
        assert!(orch.drain_failures("tester").is_empty());
        assert!(wait_for(|| orch.ledger().is_empty(), Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn dead_failure_channels_are_swept_across_owners() {
        let drive = MockDrive::new();
        drive.add_file("ok", "ok.bin", vec![1; 100]);
        drive.add_with_behavior("bad", "bad.bin", 0, Behavior::FailMetadata);
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(drive);

        let mut req = request(&["ok", "bad"], dir.path());
        req.owner_id = "silent".to_string();
        orch.start_batch(req).unwrap();

        // Both workers finish and their records are evicted; the failure
        // channels are still registered because nobody has drained yet.
        assert!(wait_for(|| orch.ledger().is_empty(), Duration::from_secs(3)).await);
        assert_eq!(orch.failures.lock().unwrap().len(), 2);

        // A different owner draining sweeps the errorless channel but must
        // not consume the silent owner's buffered error.
        assert!(orch.drain_failures("other").is_empty());
        assert_eq!(orch.failures.lock().unwrap().len(), 1);

        let failed = orch.drain_failures("silent");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].file_id, "bad");
        assert!(orch.failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelling_one_file_leaves_siblings_running() {
        let drive = MockDrive::new();
        drive.add_with_behavior("slow", "slow.bin", 0, Behavior::Endless);
        drive.add_file("quick", "quick.bin", vec![9; 2048]);
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(drive);

        orch.start_batch(request(&["slow", "quick"], dir.path()))
            .unwrap();

        // Let the slow transfer get going, then cancel just that one.
        tokio::time::sleep(Duration::from_millis(30)).await;
        orch.cancel_one("slow", "tester").unwrap();

        // The sibling still reaches completion.
        let sibling_done = wait_for(
            || {
                orch.snapshot_one("quick", "tester")
                    .map(|p| p.complete)
                    .unwrap_or(false)
                    || !orch.ledger().contains("quick")
            },
            Duration::from_secs(3),
        )
        .await;
        assert!(sibling_done);
        assert_eq!(
            std::fs::read(dir.path().join("quick.bin")).unwrap().len(),
            2048
        );

        // The cancelled record disappears without ever completing and
        // without reporting an error.
        assert!(wait_for(|| !orch.ledger().contains("slow"), Duration::from_secs(2)).await);
        assert!(orch.drain_failures("tester").is_empty());

        // After eviction, cancelling again is a clean not-found.
        let err = orch.cancel_one("slow", "tester").unwrap_err();
        assert!(matches!(err, BatchError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_is_owner_scoped_and_cancel_all_on_idle_is_noop() {
        let drive = MockDrive::new();
        drive.add_with_behavior("slow", "slow.bin", 0, Behavior::Endless);
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(drive);

        // Nothing in flight: blanket cancel is a no-op.
        orch.cancel_all("tester");

        orch.start_batch(request(&["slow"], dir.path())).unwrap();

        // A different owner can neither see nor cancel the download.
        let err = orch.snapshot_one("slow", "intruder").unwrap_err();
        assert!(matches!(err, BatchError::NotFound(_)));
        assert!(orch.cancel_one("slow", "intruder").is_err());
        assert!(orch.snapshot_all("intruder").is_empty());

        // The rightful owner can.
        orch.cancel_one("slow", "tester").unwrap();
        assert!(wait_for(|| orch.ledger().is_empty(), Duration::from_secs(2)).await);
    }
}
