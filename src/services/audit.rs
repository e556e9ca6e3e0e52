//! Audit log of processed files.
//!
//! Every processed file produces one fixed-format record in a plain UTF-8 text
//! file. The file is bounded by a byte size cap and a record count cap; once
//! either is reached the next record goes to a new file named after the base
//! log file with a timestamp suffix.
//!
//! Rotation is modelled as a pure transition over [`LogState`]: the logger
//! observes the file on disk, asks [`LogState::prepare_write`] where the next
//! record belongs, writes it, then keeps the returned state.
//!
//! The record counter is only scanned from disk while it is zero. Records
//! appended by other processes afterwards are not seen, so the counter can
//! drift when several machines share one log directory.

use crate::models::Settings;
use crate::services::identity::Actor;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};

/// Label opening every record; also used to count records.
pub const RECORD_START_MARKER: &str = "Processed at:";

/// Name of the base audit log file inside the log directory.
pub const LOG_FILE_NAME: &str = "error_log.txt";

/// Detail written for successful records.
pub const SUCCESS_PLACEHOLDER: &str = "-";

const SEPARATOR_WIDTH: usize = 50;

/// Outcome recorded for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Success,
    Error,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Success => f.write_str("SUCCESS"),
            AuditStatus::Error => f.write_str("ERROR"),
        }
    }
}

/// Receiver of per-file outcomes.
///
/// Implementations must never fail the caller; write problems are reported
/// through diagnostics only.
#[cfg_attr(test, mockall::automock)]
pub trait AuditSink {
    fn log_outcome(&mut self, file_name: &str, status: AuditStatus, detail: &str);
}

/// One audit record.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub timestamp: DateTime<Local>,
    pub actor: Actor,
    pub status: AuditStatus,
    pub file_name: String,
    pub detail: String,
}

impl AuditEntry {
    /// Build an entry stamped with the current time.
    ///
    /// `file_name` is reduced to its base name.
    pub fn new(actor: &Actor, status: AuditStatus, file_name: &str, detail: &str) -> Self {
        let base_name = Utf8Path::new(file_name)
            .file_name()
            .unwrap_or(file_name)
            .to_string();
        let detail = if detail.trim().is_empty() {
            SUCCESS_PLACEHOLDER.to_string()
        } else {
            detail.to_string()
        };

        Self {
            timestamp: Local::now(),
            actor: actor.clone(),
            status,
            file_name: base_name,
            detail,
        }
    }

    /// Render the record block, separator and trailing blank line included.
    pub fn render(&self) -> String {
        format!(
            "{} {}\nUser: {}\nComputer: {}\nStatus: {}\nFile name: {}\nDetails: {}\n{}\n\n",
            RECORD_START_MARKER,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.actor.user,
            self.actor.host,
            self.status,
            self.file_name,
            self.detail,
            "=".repeat(SEPARATOR_WIDTH),
        )
    }
}

/// Size and record caps for one log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLimits {
    pub max_bytes: u64,
    pub max_records: u64,
}

impl LogLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_bytes: settings.log_max_bytes(),
            max_records: settings.log_max_lines,
        }
    }

    fn reached(&self, size_bytes: u64, records: u64) -> bool {
        size_bytes >= self.max_bytes || records >= self.max_records
    }
}

/// What the logger saw on disk before a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedLog {
    pub size_bytes: u64,
    /// Records found by scanning; only present when the state asked for a scan.
    pub scanned_records: Option<u64>,
}

/// Active log file and its in-memory record counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogState {
    base_path: Utf8PathBuf,
    pub path: Utf8PathBuf,
    pub record_count: u64,
}

impl LogState {
    pub fn new(base_path: Utf8PathBuf) -> Self {
        Self {
            path: base_path.clone(),
            base_path,
            record_count: 0,
        }
    }

    pub fn base_path(&self) -> &Utf8Path {
        &self.base_path
    }

    /// The counter is trusted once it is non-zero.
    pub fn needs_scan(&self) -> bool {
        self.record_count == 0
    }

    /// State to write the next record with.
    ///
    /// `observed` is `None` when the active file does not exist yet. When a cap
    /// is reached the returned state points at a fresh rotated file with a zero
    /// counter; `exists` is consulted so rotated names never collide.
    pub fn prepare_write(
        &self,
        observed: Option<ObservedLog>,
        limits: LogLimits,
        now: DateTime<Local>,
        exists: impl Fn(&Utf8Path) -> bool,
    ) -> LogState {
        let Some(observed) = observed else {
            return self.clone();
        };

        let records = if self.needs_scan() {
            observed.scanned_records.unwrap_or(0)
        } else {
            self.record_count
        };

        if limits.reached(observed.size_bytes, records) {
            LogState {
                base_path: self.base_path.clone(),
                path: rotated_path(&self.base_path, now, exists),
                record_count: 0,
            }
        } else {
            LogState {
                base_path: self.base_path.clone(),
                path: self.path.clone(),
                record_count: records,
            }
        }
    }

    /// State after one record has been appended.
    pub fn recorded(mut self) -> LogState {
        self.record_count += 1;
        self
    }
}

/// `<stem>_<YYYYMMDD_HHMMSS>[_n].<ext>` next to `base_path`.
pub fn rotated_path(
    base_path: &Utf8Path,
    now: DateTime<Local>,
    exists: impl Fn(&Utf8Path) -> bool,
) -> Utf8PathBuf {
    let dir = base_path.parent().unwrap_or_else(|| Utf8Path::new(""));
    let stem = base_path.file_stem().unwrap_or("error_log");
    let ext = base_path
        .extension()
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let stamp = now.format("%Y%m%d_%H%M%S");

    let candidate = dir.join(format!("{stem}_{stamp}{ext}"));
    if !exists(&candidate) {
        return candidate;
    }

    (1u32..)
        .map(|n| dir.join(format!("{stem}_{stamp}_{n}{ext}")))
        .find(|path| !exists(path))
        .unwrap_or(candidate)
}

/// Count record-start markers in a log file.
///
/// Lines are compared as bytes; text that is not valid UTF-8 is skipped over.
pub fn count_records(path: &Utf8Path) -> Result<u64> {
    let file = fs::File::open(path).with_context(|| format!("Failed to open log: {}", path))?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut count = 0;

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("Failed to read log: {}", path))?;
        if read == 0 {
            break;
        }
        if line.starts_with(RECORD_START_MARKER.as_bytes()) {
            count += 1;
        }
    }

    Ok(count)
}

/// Rotating audit logger.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    actor: Actor,
    limits: LogLimits,
    log_success: bool,
    state: LogState,
}

impl AuditLogger {
    /// Create a logger for the configured (or default) log directory.
    pub fn new(settings: &Settings, actor: Actor) -> Self {
        let log_dir = settings.resolved_log_directory();
        let logger = Self {
            actor,
            limits: LogLimits::from_settings(settings),
            log_success: settings.log_successful_files,
            state: LogState::new(log_dir.join(LOG_FILE_NAME)),
        };

        tracing::info!("Audit log file: {}", logger.state.path);
        logger
    }

    pub fn active_log_path(&self) -> &Utf8Path {
        &self.state.path
    }

    pub fn log_state(&self) -> &LogState {
        &self.state
    }

    pub fn limits(&self) -> LogLimits {
        self.limits
    }

    pub fn logs_successes(&self) -> bool {
        self.log_success
    }

    pub fn update_limits(&mut self, max_size_mb: f64, max_lines: u64, log_success: bool) {
        self.limits = LogLimits {
            max_bytes: (max_size_mb * 1024.0 * 1024.0) as u64,
            max_records: max_lines,
        };
        self.log_success = log_success;
    }

    /// Point the logger at a new directory; the record counter starts over.
    pub fn set_log_directory(&mut self, log_dir: &Utf8Path) {
        let base_path = log_dir.join(LOG_FILE_NAME);
        if base_path != *self.state.base_path() {
            self.state = LogState::new(base_path);
            tracing::info!("Log file path updated to: {}", self.state.path);
        }
    }

    /// Apply limits, success flag and log directory from settings.
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.limits = LogLimits::from_settings(settings);
        self.log_success = settings.log_successful_files;
        self.set_log_directory(&settings.resolved_log_directory());
    }

    /// Append a record, rotating first when a cap has been reached.
    ///
    /// Returns `Ok(false)` when a success record was skipped because success
    /// logging is disabled.
    pub fn write_entry(&mut self, entry: &AuditEntry) -> Result<bool> {
        if entry.status == AuditStatus::Success && !self.log_success {
            return Ok(false);
        }

        let observed = self.observe()?;
        let next = self
            .state
            .prepare_write(observed, self.limits, entry.timestamp, |p| p.exists());
        if next.path != self.state.path {
            tracing::info!("Rotating audit log to {}", next.path);
        }

        if let Some(parent) = next.path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&next.path)
            .with_context(|| format!("Failed to open log: {}", next.path))?;
        file.write_all(entry.render().as_bytes())
            .with_context(|| format!("Failed to write log: {}", next.path))?;

        self.state = next.recorded();
        Ok(true)
    }

    /// Content of the active log file, if there is one.
    pub fn read_active_log(&self) -> Option<String> {
        if !self.state.path.exists() {
            return None;
        }

        match fs::read(&self.state.path) {
            Ok(content) => Some(String::from_utf8_lossy(&content).into_owned()),
            Err(e) => {
                tracing::warn!("Error reading log file {}: {}", self.state.path, e);
                None
            }
        }
    }

    fn observe(&self) -> Result<Option<ObservedLog>> {
        let path = &self.state.path;
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to stat log: {}", path)),
        };

        let scanned_records = if self.state.needs_scan() {
            Some(count_records(path)?)
        } else {
            None
        };

        Ok(Some(ObservedLog {
            size_bytes: metadata.len(),
            scanned_records,
        }))
    }
}

impl AuditSink for AuditLogger {
    fn log_outcome(&mut self, file_name: &str, status: AuditStatus, detail: &str) {
        let entry = AuditEntry::new(&self.actor, status, file_name, detail);
        if let Err(e) = self.write_entry(&entry) {
            tracing::error!("Failed to write audit record for {}: {:#}", entry.file_name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    fn limits(max_bytes: u64, max_records: u64) -> LogLimits {
        LogLimits {
            max_bytes,
            max_records,
        }
    }

    #[test]
    fn test_render_record_block() {
        let actor = Actor::new("anna", "ws-01");
        let mut entry = AuditEntry::new(&actor, AuditStatus::Error, "/in/bad.xml", "broken");
        entry.timestamp = fixed_time();

        let rendered = entry.render();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines[0], "Processed at: 2025-03-14 09:26:53");
        assert_eq!(lines[1], "User: anna");
        assert_eq!(lines[2], "Computer: ws-01");
        assert_eq!(lines[3], "Status: ERROR");
        assert_eq!(lines[4], "File name: bad.xml");
        assert_eq!(lines[5], "Details: broken");
        assert_eq!(lines[6], "=".repeat(50));
        assert!(rendered.ends_with("\n\n"));
    }

    #[test]
    fn test_success_detail_placeholder() {
        let entry = AuditEntry::new(&Actor::new("a", "b"), AuditStatus::Success, "ok.xml", "");
        assert_eq!(entry.detail, "-");
    }

    #[test]
    fn test_rotated_path_inserts_timestamp() {
        let base = Utf8Path::new("/logs/error_log.txt");
        let rotated = rotated_path(base, fixed_time(), |_| false);
        assert_eq!(rotated, Utf8PathBuf::from("/logs/error_log_20250314_092653.txt"));
    }

    #[test]
    fn test_rotated_path_avoids_existing_files() {
        let base = Utf8Path::new("/logs/error_log.txt");
        let taken = Utf8PathBuf::from("/logs/error_log_20250314_092653.txt");
        let rotated = rotated_path(base, fixed_time(), |p| p == taken.as_path());
        assert_eq!(rotated, Utf8PathBuf::from("/logs/error_log_20250314_092653_1.txt"));
    }

    #[test]
    fn test_missing_file_keeps_state() {
        let state = LogState::new(Utf8PathBuf::from("/logs/error_log.txt"));
        let next = state.prepare_write(None, limits(10, 1), fixed_time(), |_| false);
        assert_eq!(next, state);
    }

    #[test]
    fn test_scan_result_used_only_when_counter_is_zero() {
        let state = LogState::new(Utf8PathBuf::from("/logs/error_log.txt"));
        let observed = ObservedLog {
            size_bytes: 100,
            scanned_records: Some(4),
        };
        let next = state.prepare_write(Some(observed), limits(1_000, 10), fixed_time(), |_| false);
        assert_eq!(next.record_count, 4);

        let trusted = LogState {
            record_count: 2,
            ..state
        };
        let next = trusted.prepare_write(Some(observed), limits(1_000, 10), fixed_time(), |_| false);
        assert_eq!(next.record_count, 2);
    }

    #[test]
    fn test_size_cap_rotates_and_resets_counter() {
        let state = LogState {
            record_count: 3,
            ..LogState::new(Utf8PathBuf::from("/logs/error_log.txt"))
        };
        let observed = ObservedLog {
            size_bytes: 2_048,
            scanned_records: None,
        };

        let next = state.prepare_write(Some(observed), limits(2_048, 100), fixed_time(), |_| false);
        assert_eq!(next.path, Utf8PathBuf::from("/logs/error_log_20250314_092653.txt"));
        assert_eq!(next.record_count, 0);
        assert_eq!(next.base_path(), state.base_path());
    }

    #[test]
    fn test_mock_sink_records_calls() {
        let mut sink = MockAuditSink::new();
        sink.expect_log_outcome()
            .withf(|name, status, _| name == "a.xml" && *status == AuditStatus::Error)
            .times(1)
            .return_const(());

        sink.log_outcome("a.xml", AuditStatus::Error, "boom");
    }

    proptest! {
        #[test]
        fn prop_below_caps_never_rotates(
            size in 0u64..1_000,
            count in 1u64..50,
            writes in 1usize..20,
        ) {
            let limits = limits(1_000, 100);
            let mut state = LogState {
                record_count: count,
                ..LogState::new(Utf8PathBuf::from("/logs/error_log.txt"))
            };
            let original = state.path.clone();

            for _ in 0..writes {
                if state.record_count >= limits.max_records {
                    break;
                }
                let observed = ObservedLog { size_bytes: size, scanned_records: None };
                state = state
                    .prepare_write(Some(observed), limits, fixed_time(), |_| false)
                    .recorded();
                prop_assert_eq!(&state.path, &original);
            }
        }

        #[test]
        fn prop_crossing_record_cap_rotates_once(max_records in 1u64..20) {
            let limits = limits(u64::MAX, max_records);
            let state = LogState {
                record_count: max_records,
                ..LogState::new(Utf8PathBuf::from("/logs/error_log.txt"))
            };
            let observed = ObservedLog { size_bytes: 10, scanned_records: None };

            let rotated = state.prepare_write(Some(observed), limits, fixed_time(), |_| false);
            prop_assert_ne!(&rotated.path, &state.path);
            prop_assert_eq!(rotated.record_count, 0);

            let after = rotated.clone().recorded();
            let again = after.prepare_write(Some(observed), limits, fixed_time(), |_| false);
            if max_records > 1 {
                prop_assert_eq!(&again.path, &rotated.path);
            }
        }
    }
}
