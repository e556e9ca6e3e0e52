//! Sequential batch processing.
//!
//! Files are converted strictly one at a time, in the order given. Every
//! file yields exactly one entry in the [`BatchResult`], and nothing a single
//! file does (including a panic inside the engine) aborts the batch.

use crate::metrics::Metrics;
use crate::services::audit::{AuditSink, AuditStatus};
use crate::services::conversion::{ConversionOutcome, ConversionService};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use std::any::Any;
use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// File name plus detail: the PDF path on success, the error on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub file_name: String,
    pub detail: String,
}

/// Progress notification delivered after each file.
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress<'a> {
    /// Files handled so far, including this one (1-based).
    pub processed: usize,
    pub total: usize,
    pub success: bool,
    pub report: &'a FileReport,
}

/// What the caller should surface when exactly one file was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleFileOutcome {
    /// Open this PDF in the default viewer.
    Converted(Utf8PathBuf),
    /// Show this message.
    Failed(String),
}

/// Aggregate statistics of one batch run.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub elapsed: Duration,
    pub successes: Vec<FileReport>,
    pub failures: Vec<FileReport>,
}

impl BatchResult {
    fn begin() -> Self {
        Self {
            processed: 0,
            succeeded: 0,
            failed: 0,
            started_at: Local::now(),
            finished_at: None,
            elapsed: Duration::ZERO,
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Processed {} files: {} successful, {} failed",
            self.processed, self.succeeded, self.failed
        )
    }

    /// Deferred multi-line summary listing every file.
    pub fn report(&self) -> String {
        let mut out = self.summary();
        out.push('\n');

        let _ = writeln!(out, "\nSuccessful ({}):", self.succeeded);
        if self.successes.is_empty() {
            out.push_str("  No successful files\n");
        }
        for (idx, file) in self.successes.iter().enumerate() {
            let _ = writeln!(out, "  {}. {} -> {}", idx + 1, file.file_name, file.detail);
        }

        let _ = writeln!(out, "\nFailed ({}):", self.failed);
        if self.failures.is_empty() {
            out.push_str("  No failed files\n");
        }
        for (idx, file) in self.failures.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}: {}", idx + 1, file.file_name, file.detail);
        }

        out
    }

    /// `Some` only when the batch held exactly one file.
    pub fn single_file_outcome(&self) -> Option<SingleFileOutcome> {
        if self.processed != 1 {
            return None;
        }

        if let Some(success) = self.successes.first() {
            Some(SingleFileOutcome::Converted(Utf8PathBuf::from(&success.detail)))
        } else {
            self.failures
                .first()
                .map(|failure| SingleFileOutcome::Failed(failure.detail.clone()))
        }
    }
}

/// Drives a [`ConversionService`] over a list of files.
pub struct BatchRunner<A> {
    engine: ConversionService<A>,
    metrics: Arc<Metrics>,
}

impl<A: AuditSink> BatchRunner<A> {
    pub fn new(engine: ConversionService<A>, metrics: Arc<Metrics>) -> Self {
        Self { engine, metrics }
    }

    /// Process `paths` in order, calling `on_progress(processed, total)` after
    /// every file.
    pub fn run_batch<P>(&mut self, paths: &[Utf8PathBuf], mut on_progress: P) -> BatchResult
    where
        P: FnMut(usize, usize),
    {
        self.run_batch_observed(paths, |progress| {
            on_progress(progress.processed, progress.total)
        })
    }

    /// Like [`run_batch`](Self::run_batch), with the per-file report attached
    /// to each progress notification.
    pub fn run_batch_observed<F>(&mut self, paths: &[Utf8PathBuf], mut observer: F) -> BatchResult
    where
        F: FnMut(BatchProgress<'_>),
    {
        let total = paths.len();
        let clock = Instant::now();
        let mut result = BatchResult::begin();

        tracing::info!("Starting batch of {} file(s)", total);

        for path in paths {
            let file_clock = Instant::now();
            let (success, report) = self.process_one(path);
            self.metrics.record_conversion_time(file_clock.elapsed());

            result.processed += 1;
            if success {
                result.succeeded += 1;
                result.successes.push(report);
            } else {
                result.failed += 1;
                result.failures.push(report);
            }

            let report = if success {
                result.successes.last()
            } else {
                result.failures.last()
            };
            if let Some(report) = report {
                observer(BatchProgress {
                    processed: result.processed,
                    total,
                    success,
                    report,
                });
            }
        }

        result.elapsed = clock.elapsed();
        result.finished_at = Some(Local::now());
        self.metrics.record_batch();

        tracing::info!("{} in {:.2}s", result.summary(), result.elapsed.as_secs_f64());
        result
    }

    fn process_one(&mut self, path: &Utf8Path) -> (bool, FileReport) {
        let file_name = path.file_name().unwrap_or(path.as_str()).to_string();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.engine.process_file(path)));

        let detail = match outcome {
            Ok(Ok(outcome)) => {
                let success = outcome.is_success();
                if success {
                    self.metrics.record_converted();
                } else {
                    self.metrics.record_failed();
                }
                return (success, report_for(&file_name, &outcome));
            }
            Ok(Err(e)) => format!("Unexpected error: {:#}", e),
            Err(payload) => format!("Unexpected error: {}", panic_message(payload.as_ref())),
        };

        tracing::error!("Unexpected error processing {}: {}", file_name, detail);
        self.metrics.record_unexpected();
        self.engine
            .audit_mut()
            .log_outcome(&file_name, AuditStatus::Error, &detail);

        (false, FileReport { file_name, detail })
    }
}

fn report_for(file_name: &str, outcome: &ConversionOutcome) -> FileReport {
    FileReport {
        file_name: file_name.to_string(),
        detail: outcome.detail(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during conversion".to_string()
    }
}
