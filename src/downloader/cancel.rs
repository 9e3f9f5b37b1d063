//! Cancellation registry
//!
//! Maps `file_id -> CancellationToken`. Owned exclusively by the
//! orchestrator; workers only ever see their own token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct CancellationRegistry {
    inner: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, file_id: &str, token: CancellationToken) {
        debug!(file_id, "registering cancellation token");
        self.inner
            .lock()
            .unwrap()
            .insert(file_id.to_string(), token);
    }

    /// Trigger one download's token. Returns false when the key is unknown
    /// (never registered, or already finished and unregistered).
    pub fn trigger(&self, file_id: &str) -> bool {
        let map = self.inner.lock().unwrap();
        match map.get(file_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => {
                warn!(file_id, "no cancellation token registered");
                false
            }
        }
    }

    /// Trigger every registered token. A no-op with zero active downloads.
    pub fn trigger_all(&self) {
        let map = self.inner.lock().unwrap();
        for token in map.values() {
            token.cancel();
        }
    }

    /// Idempotent removal, called from the worker finalizer.
    pub fn unregister(&self, file_id: &str) {
        self.inner.lock().unwrap().remove(file_id);
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

    #[test]
    fn trigger_cancels_the_right_token() {
        let registry = CancellationRegistry::new();
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        registry.register("a", a.clone());
        registry.register("b", b.clone());

        assert!(registry.trigger("a"));
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
    }

    #[test]
    fn trigger_unknown_key_reports_not_found() {
        let registry = CancellationRegistry::new();
        assert!(!registry.trigger("ghost"));
    }

    #[test]
    fn trigger_all_on_empty_registry_is_a_noop() {
        let registry = CancellationRegistry::new();
        registry.trigger_all();
        assert!(registry.is_empty());
    }

    #[test]
    fn second_trigger_after_unregister_is_not_found() {
        let registry = CancellationRegistry::new();
        let token = CancellationToken::new();
        registry.register("a", token);
        assert!(registry.trigger("a"));
        registry.unregister("a");
        assert!(!registry.trigger("a"));
        registry.unregister("a");
    }
}
