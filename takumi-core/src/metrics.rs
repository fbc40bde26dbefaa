//! # Metrics and Monitoring
//!
//! Metrics collection for monitoring takumidb operations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    // Write metrics
    puts: AtomicU64,
    deletes: AtomicU64,
    wal_writes: AtomicU64,
    wal_bytes: AtomicU64,

    // Storage metrics
    memtable_flushes: AtomicU64,
    compactions: AtomicU64,
    files_retired: AtomicU64,

    // Checkpoint / export / import metrics
    checkpoints_created: AtomicU64,
    column_families_exported: AtomicU64,
    column_families_imported: AtomicU64,
    files_linked: AtomicU64,
    files_copied: AtomicU64,
    bytes_copied: AtomicU64,
    pins_deferred: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_put(&self) {
        self.inner.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.inner.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wal_write(&self, bytes: u64) {
        self.inner.wal_writes.fetch_add(1, Ordering::Relaxed);
        self.inner.wal_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.inner.memtable_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compaction(&self) {
        self.inner.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_retired(&self) {
        self.inner.files_retired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint(&self) {
        self.inner.checkpoints_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export(&self) {
        self.inner.column_families_exported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_import(&self) {
        self.inner.column_families_imported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_linked(&self) {
        self.inner.files_linked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_copied(&self, bytes: u64) {
        self.inner.files_copied.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_pin_deferred(&self) {
        self.inner.pins_deferred.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let i = &self.inner;
        MetricsSnapshot {
            puts: i.puts.load(Ordering::Relaxed),
            deletes: i.deletes.load(Ordering::Relaxed),
            wal_writes: i.wal_writes.load(Ordering::Relaxed),
            wal_bytes: i.wal_bytes.load(Ordering::Relaxed),
            memtable_flushes: i.memtable_flushes.load(Ordering::Relaxed),
            compactions: i.compactions.load(Ordering::Relaxed),
            files_retired: i.files_retired.load(Ordering::Relaxed),
            checkpoints_created: i.checkpoints_created.load(Ordering::Relaxed),
            column_families_exported: i.column_families_exported.load(Ordering::Relaxed),
            column_families_imported: i.column_families_imported.load(Ordering::Relaxed),
            files_linked: i.files_linked.load(Ordering::Relaxed),
            files_copied: i.files_copied.load(Ordering::Relaxed),
            bytes_copied: i.bytes_copied.load(Ordering::Relaxed),
            pins_deferred: i.pins_deferred.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub puts: u64,
    pub deletes: u64,
    pub wal_writes: u64,
    pub wal_bytes: u64,
    pub memtable_flushes: u64,
    pub compactions: u64,
    pub files_retired: u64,
    pub checkpoints_created: u64,
    pub column_families_exported: u64,
    pub column_families_imported: u64,
    pub files_linked: u64,
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub pins_deferred: u64,
}

impl crate::traits::StatsSource for Metrics {
    fn ticker(&self, name: &str) -> Option<u64> {
        let s = self.snapshot();
        let value = match name {
            "puts" => s.puts,
            "deletes" => s.deletes,
            "wal.writes" => s.wal_writes,
            "wal.bytes" => s.wal_bytes,
            "flushes" => s.memtable_flushes,
            "compactions" => s.compactions,
            "files.retired" => s.files_retired,
            "checkpoints" => s.checkpoints_created,
            "exports" => s.column_families_exported,
            "imports" => s.column_families_imported,
            "files.linked" => s.files_linked,
            "files.copied" => s.files_copied,
            "bytes.copied" => s.bytes_copied,
            "pins.deferred" => s.pins_deferred,
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StatsSource;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.record_put();
        metrics.record_put();
        metrics.record_checkpoint();
        metrics.record_file_copied(128);

        let snap = metrics.snapshot();
        assert_eq!(snap.puts, 2);
        assert_eq!(snap.checkpoints_created, 1);
        assert_eq!(snap.files_copied, 1);
        assert_eq!(snap.bytes_copied, 128);
    }

    #[test]
    fn test_stats_source() {
        let metrics = Metrics::new();
        metrics.record_export();
        assert_eq!(metrics.ticker("exports"), Some(1));
        assert_eq!(metrics.ticker("no-such-ticker"), None);
    }
}
