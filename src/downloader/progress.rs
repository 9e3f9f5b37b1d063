//! Per-file progress tracking
//!
//! One `Progress` record exists per in-flight download. The owning worker is
//! the only writer; everyone else sees snapshots through the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::format_bytes;

/// Live state of one downloading file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    /// Drive file ID this record belongs to.
    pub file_id: String,
    /// Session user that started the batch. Scopes visibility.
    pub owner_id: String,
    /// Declared size of the remote file in bytes. 0 when unknown.
    pub total_bytes: u64,
    /// Bytes written to disk so far. Non-decreasing until terminal.
    pub transferred_bytes: u64,
    /// Whole-number completion percentage. 0 while the total is unknown.
    pub percent: u8,
    /// `total_bytes` rendered for display, e.g. "1.50 KB".
    pub readable_size: String,
    /// Cumulative-average transfer speed in MB/s, rounded to 2 decimals.
    pub speed_mbps: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set on the success path only. Cancelled or failed downloads never
    /// report complete.
    pub complete: bool,
}

impl Progress {
    /// A zero-progress record, created the moment a batch item is accepted.
    pub fn new(file_id: impl Into<String>, owner_id: impl Into<String>, total_bytes: u64) -> Self {
        Self {
            file_id: file_id.into(),
            owner_id: owner_id.into(),
            total_bytes,
            transferred_bytes: 0,
            percent: 0,
            readable_size: format_bytes(total_bytes),
            speed_mbps: 0.0,
            started_at: Utc::now(),
            finished_at: None,
            complete: false,
        }
    }

    /// Fold one chunk into the running counters.
    ///
    /// `elapsed_secs` is wall time since the transfer started; the speed is a
    /// cumulative average over the whole transfer, not a sliding window.
    pub fn record_chunk(&mut self, written: u64, elapsed_secs: f64) {
        self.transferred_bytes += written;
        if self.total_bytes > 0 {
            // A lying server must not push us past the declared size.
            self.transferred_bytes = self.transferred_bytes.min(self.total_bytes);
            self.percent = (self.transferred_bytes as f64 / self.total_bytes as f64 * 100.0) as u8;
        }
        if elapsed_secs > 0.0 {
            let mbps = (self.transferred_bytes as f64 / elapsed_secs) / 1e6;
            self.speed_mbps = (mbps * 100.0).round() / 100.0;
        }
    }

    /// Mark the success-path terminal state.
    pub fn finish(&mut self) {
        self.complete = true;
        self.finished_at = Some(Utc::now());
        if self.total_bytes > 0 {
            self.percent = (self.transferred_bytes as f64 / self.total_bytes as f64 * 100.0) as u8;
        }
    }

    /// Merge the mutable fields of a newer snapshot into this record.
    ///
    /// Identity fields (`file_id`, `owner_id`, `started_at`) are kept.
    /// The total is absorbed too: records start at 0 and learn their real
    /// size from the worker's first event, after the metadata fetch.
    pub fn absorb(&mut self, newer: &Progress) {
        self.total_bytes = newer.total_bytes;
        self.readable_size = newer.readable_size.clone();
        self.transferred_bytes = newer.transferred_bytes;
        self.percent = newer.percent;
        self.speed_mbps = newer.speed_mbps;
        self.finished_at = newer.finished_at;
        self.complete = newer.complete;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_updates_are_monotonic() {
        let mut prog = Progress::new("abc", "user", 1000);
        let mut last = 0;
        for _ in 0..10 {
            prog.record_chunk(100, 1.0);
            assert!(prog.transferred_bytes >= last);
            last = prog.transferred_bytes;
        }
        assert_eq!(prog.transferred_bytes, 1000);
        assert_eq!(prog.percent, 100);
    }

    #[test]
    fn transferred_never_exceeds_known_total() {
        let mut prog = Progress::new("abc", "user", 512);
        prog.record_chunk(1024, 1.0);
        assert_eq!(prog.transferred_bytes, 512);
        assert_eq!(prog.percent, 100);
    }

    #[test]
    fn unknown_total_keeps_percent_at_zero() {
        let mut prog = Progress::new("abc", "user", 0);
        prog.record_chunk(4096, 1.0);
        assert_eq!(prog.percent, 0);
        assert_eq!(prog.transferred_bytes, 4096);
    }

    #[test]
    fn speed_is_cumulative_average_rounded() {
        let mut prog = Progress::new("abc", "user", 0);
        // 3_000_000 bytes over 2s -> 1.5 MB/s
        prog.record_chunk(3_000_000, 2.0);
        assert_eq!(prog.speed_mbps, 1.5);
        // No elapsed time yet: speed untouched.
        let mut fresh = Progress::new("abc", "user", 0);
        fresh.record_chunk(100, 0.0);
        assert_eq!(fresh.speed_mbps, 0.0);
    }

    #[test]
    fn absorb_merges_state_but_keeps_identity() {
        // Ledger records start with an unknown total; the worker's events
        // carry the real one.
        let mut original = Progress::new("abc", "user", 0);
        let started = original.started_at;

        let mut newer = Progress::new("abc", "user", 1000);
        newer.record_chunk(1000, 1.0);
        newer.finish();
        newer.owner_id = "someone-else".to_string();

        original.absorb(&newer);
        assert!(original.complete);
        assert_eq!(original.transferred_bytes, 1000);
        assert_eq!(original.total_bytes, 1000);
        assert_eq!(original.started_at, started);
        assert_eq!(original.owner_id, "user");
    }
}
