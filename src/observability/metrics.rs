//! Metrics registry
//!
//! Counters only, monotonic, reset on process start. Relaxed atomics: the
//! values are exact once the writers have finished.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one timeline
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    batches_committed: AtomicU64,
    batches_rejected: AtomicU64,
    versions_inserted: AtomicU64,
    versions_closed: AtomicU64,
    duplicates_skipped: AtomicU64,
    queries_executed: AtomicU64,
    queries_rejected: AtomicU64,
    objects_removed: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Ingest

    pub fn increment_batches_committed(&self) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches_rejected(&self) {
        self.batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_versions_inserted(&self, count: u64) {
        self.versions_inserted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_versions_closed(&self, count: u64) {
        self.versions_closed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_duplicates_skipped(&self, count: u64) {
        self.duplicates_skipped.fetch_add(count, Ordering::Relaxed);
    }

    // Reads

    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Administration

    pub fn add_objects_removed(&self, count: u64) {
        self.objects_removed.fetch_add(count, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            batches_rejected: self.batches_rejected.load(Ordering::Relaxed),
            versions_inserted: self.versions_inserted.load(Ordering::Relaxed),
            versions_closed: self.versions_closed.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            objects_removed: self.objects_removed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub batches_committed: u64,
    pub batches_rejected: u64,
    pub versions_inserted: u64,
    pub versions_closed: u64,
    pub duplicates_skipped: u64,
    pub queries_executed: u64,
    pub queries_rejected: u64,
    pub objects_removed: u64,
}

impl MetricsSnapshot {
    /// Serializes the snapshot as one JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();
        registry.increment_batches_committed();
        registry.increment_batches_rejected();
        registry.add_versions_inserted(3);
        registry.add_versions_closed(2);
        registry.add_duplicates_skipped(4);
        registry.increment_queries_executed();
        registry.add_objects_removed(5);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.batches_committed, 1);
        assert_eq!(snapshot.batches_rejected, 1);
        assert_eq!(snapshot.versions_inserted, 3);
        assert_eq!(snapshot.versions_closed, 2);
        assert_eq!(snapshot.duplicates_skipped, 4);
        assert_eq!(snapshot.queries_executed, 1);
        assert_eq!(snapshot.queries_rejected, 0);
        assert_eq!(snapshot.objects_removed, 5);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.add_versions_inserted(12);
        let parsed: serde_json::Value =
            serde_json::from_str(&registry.snapshot().to_json()).unwrap();
        assert_eq!(parsed["versions_inserted"], 12);
        assert_eq!(parsed["batches_committed"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment_queries_executed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().queries_executed, 800);
    }
}
