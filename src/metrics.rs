// Conversion metrics
//
// Lock-free counters shared between the batch runner and the binary

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide conversion counters.
///
/// Updated from the batch worker thread and read on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Documents converted to PDF
    pub documents_converted: AtomicUsize,

    /// Documents that ended in a conversion failure
    pub documents_failed: AtomicUsize,

    /// Failures raised outside normal conversion error handling
    pub unexpected_errors: AtomicUsize,

    /// Batches run
    pub batches_run: AtomicUsize,

    /// Time spent converting, in milliseconds
    pub total_conversion_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            documents_converted: AtomicUsize::new(0),
            documents_failed: AtomicUsize::new(0),
            unexpected_errors: AtomicUsize::new(0),
            batches_run: AtomicUsize::new(0),
            total_conversion_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_converted(&self) {
        self.documents_converted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// An unexpected error also counts as a failed document.
    pub fn record_unexpected(&self) {
        self.unexpected_errors.fetch_add(1, Ordering::Relaxed);
        self.record_failed();
    }

    pub fn record_batch(&self) {
        self.batches_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conversion_time(&self, duration: Duration) {
        self.total_conversion_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Documents handled so far, successful or not.
    pub fn documents_processed(&self) -> usize {
        self.documents_converted.load(Ordering::Relaxed)
            + self.documents_failed.load(Ordering::Relaxed)
    }

    /// Average time per processed document in milliseconds
    pub fn avg_conversion_time_ms(&self) -> f64 {
        let total = self.total_conversion_time_ms.load(Ordering::Relaxed);
        let count = self.documents_processed();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Conversion Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Documents: {} converted, {} failed ({} unexpected) in {} batch(es)",
            self.documents_converted.load(Ordering::Relaxed),
            self.documents_failed.load(Ordering::Relaxed),
            self.unexpected_errors.load(Ordering::Relaxed),
            self.batches_run.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total conversion time: {:.2}s (avg: {:.2}ms per document)",
            self.total_conversion_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_conversion_time_ms()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = Metrics::new();
        assert_eq!(metrics.documents_converted.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.documents_failed.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.documents_processed(), 0);
    }

    #[test]
    fn test_unexpected_counts_as_failure() {
        let metrics = Metrics::new();

        metrics.record_converted();
        metrics.record_failed();
        metrics.record_unexpected();

        assert_eq!(metrics.documents_converted.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.documents_failed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.unexpected_errors.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.documents_processed(), 3);
    }

    #[test]
    fn test_average_time() {
        let metrics = Metrics::new();
        assert_eq!(metrics.avg_conversion_time_ms(), 0.0);

        metrics.record_converted();
        metrics.record_conversion_time(Duration::from_millis(100));
        metrics.record_failed();
        metrics.record_conversion_time(Duration::from_millis(300));

        assert_eq!(metrics.total_conversion_time_ms.load(Ordering::Relaxed), 400);
        assert_eq!(metrics.avg_conversion_time_ms(), 200.0);
    }

    #[test]
    fn test_shared_across_threads() {
        let metrics = std::sync::Arc::new(Metrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || metrics.record_converted())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.documents_converted.load(Ordering::Relaxed), 4);
    }
}
