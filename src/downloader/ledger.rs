//! The progress ledger
//!
//! A mutex-guarded map of `file_id -> Progress`, the single source of truth
//! for what is downloading right now. Workers write, observers read; reads
//! dominate, but a plain mutex is fine at this scale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::BatchError;
use super::progress::Progress;

#[derive(Debug, Clone, Default)]
pub struct ProgressLedger {
    inner: Arc<Mutex<HashMap<String, Progress>>>,
}

impl ProgressLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically insert the zero-progress records for a new batch.
    ///
    /// Fails without inserting anything if any key already has an active
    /// record, so no two workers can ever own the same key.
    pub fn insert_batch(&self, records: Vec<Progress>) -> Result<(), BatchError> {
        let mut map = self.inner.lock().unwrap();
        for record in &records {
            if map.contains_key(&record.file_id) {
                return Err(BatchError::AlreadyDownloading(record.file_id.clone()));
            }
        }
        for record in records {
            map.insert(record.file_id.clone(), record);
        }
        Ok(())
    }

    /// Merge a newer snapshot into the stored record, or insert it if the
    /// key is unknown. Only the owning worker calls this for its key.
    pub fn upsert(&self, progress: Progress) {
        let mut map = self.inner.lock().unwrap();
        match map.get_mut(&progress.file_id) {
            Some(existing) => existing.absorb(&progress),
            None => {
                map.insert(progress.file_id.clone(), progress);
            }
        }
    }

    /// All records belonging to `owner_id`, in no particular order.
    pub fn snapshot_all(&self, owner_id: &str) -> Vec<Progress> {
        let map = self.inner.lock().unwrap();
        map.values()
            .filter(|prog| prog.owner_id == owner_id)
            .cloned()
            .collect()
    }

    /// One record, with cross-tenant isolation: a record owned by someone
    /// else is reported as not found even when the key is guessed right.
    pub fn snapshot_one(&self, file_id: &str, owner_id: &str) -> Result<Progress, BatchError> {
        let map = self.inner.lock().unwrap();
        map.get(file_id)
            .filter(|prog| prog.owner_id == owner_id)
            .cloned()
            .ok_or_else(|| BatchError::NotFound(file_id.to_string()))
    }

    /// Idempotent removal.
    pub fn delete(&self, file_id: &str) {
        self.inner.lock().unwrap().remove(file_id);
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.inner.lock().unwrap().contains_key(file_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file_id: &str, owner: &str) -> Progress {
        Progress::new(file_id, owner, 100)
    }

    #[test]
    fn insert_batch_rejects_active_key_atomically() {
        let ledger = ProgressLedger::new();
        ledger.insert_batch(vec![record("a", "u1")]).unwrap();

        let err = ledger
            .insert_batch(vec![record("b", "u1"), record("a", "u1")])
            .unwrap_err();
        assert!(matches!(err, BatchError::AlreadyDownloading(ref id) if id == "a"));

        // The rejected batch must not leave partial state behind.
        assert!(!ledger.contains("b"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn upsert_merges_into_existing_record() {
        let ledger = ProgressLedger::new();
        ledger.insert_batch(vec![record("a", "u1")]).unwrap();
        let started = ledger.snapshot_one("a", "u1").unwrap().started_at;

        let mut newer = record("a", "u1");
        newer.record_chunk(100, 1.0);
        newer.finish();
        ledger.upsert(newer);

        let stored = ledger.snapshot_one("a", "u1").unwrap();
        assert!(stored.complete);
        assert_eq!(stored.transferred_bytes, 100);
        assert_eq!(stored.started_at, started);
    }

    #[test]
    fn snapshots_are_owner_scoped() {
        let ledger = ProgressLedger::new();
        ledger
            .insert_batch(vec![record("a", "u1"), record("b", "u2")])
            .unwrap();

        let mine = ledger.snapshot_all("u1");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].file_id, "a");

        // Cross-tenant lookup fails even though the record exists.
        let err = ledger.snapshot_one("b", "u1").unwrap_err();
        assert!(matches!(err, BatchError::NotFound(_)));
        assert!(ledger.snapshot_one("b", "u2").is_ok());
    }

    #[test]
    fn delete_is_idempotent() {
        let ledger = ProgressLedger::new();
        ledger.insert_batch(vec![record("a", "u1")]).unwrap();
        ledger.delete("a");
        ledger.delete("a");
        assert!(ledger.is_empty());
    }
}
