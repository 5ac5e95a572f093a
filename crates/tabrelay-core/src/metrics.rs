//! Pipeline counters.
//!
//! Plain atomic counters owned per engine instance and surfaced through
//! accessors and logs; there is no export surface.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    units_published: AtomicU64,
    units_consumed: AtomicU64,
    flushes: AtomicU64,
    rows_written: AtomicU64,
    errors: AtomicU64,
}

impl PipelineMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record units handed to the broker channel.
    pub fn record_published(&self, count: u64) {
        self.units_published.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one unit received from the broker channel.
    pub fn record_consumed(&self) {
        self.units_consumed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed flush.
    pub fn record_flush(&self, rows: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows, Ordering::Relaxed);
    }

    /// Record an error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Units handed to the broker channel.
    pub fn units_published(&self) -> u64 {
        self.units_published.load(Ordering::Relaxed)
    }

    /// Units received from the broker channel.
    pub fn units_consumed(&self) -> u64 {
        self.units_consumed.load(Ordering::Relaxed)
    }

    /// Completed flushes.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Rows written to storage.
    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::Relaxed)
    }

    /// Errors observed.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = PipelineMetrics::new();
        metrics.record_published(10);
        metrics.record_consumed();
        metrics.record_consumed();
        metrics.record_flush(5);
        metrics.record_error();

        assert_eq!(metrics.units_published(), 10);
        assert_eq!(metrics.units_consumed(), 2);
        assert_eq!(metrics.flushes(), 1);
        assert_eq!(metrics.rows_written(), 5);
        assert_eq!(metrics.errors(), 1);
    }
}
