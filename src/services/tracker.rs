//! Advisory directory usage tracking.
//!
//! Each tracked directory gets a hidden `.dirtracker` file holding one
//! `user,host,unix_seconds` line per tracking event. Tracking never blocks
//! anyone: it appends the caller's line and reports who else touched the
//! directory within the last hour. Concurrent writers may interleave lines;
//! nothing here is a lock.

use crate::models::{SettingKey, Settings};
use crate::services::identity::Actor;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use indexmap::IndexMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::time::Duration;

/// Name of the marker file inside a tracked directory.
pub const MARKER_FILE_NAME: &str = ".dirtracker";

/// Entries younger than this count as current users.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Result of tracking a directory.
///
/// `ok` is always `true`; the message is informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackReport {
    pub ok: bool,
    pub message: Option<String>,
    /// Other actors seen within the freshness window.
    pub current_users: Vec<Actor>,
}

impl TrackReport {
    fn quiet() -> Self {
        Self {
            ok: true,
            message: None,
            current_users: Vec::new(),
        }
    }
}

/// One line of a marker file.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEntry {
    pub actor: Actor,
    pub timestamp: f64,
}

impl UsageEntry {
    /// Parse `user,host,unix_seconds`; malformed lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim().splitn(3, ',');
        let user = parts.next()?;
        let host = parts.next()?;
        let timestamp = parts.next()?.trim().parse::<f64>().ok()?;

        Some(Self {
            actor: Actor::new(user, host),
            timestamp,
        })
    }

    pub fn render(&self) -> String {
        format!("{},{},{}\n", self.actor.user, self.actor.host, self.timestamp)
    }

    fn is_fresh(&self, now: f64) -> bool {
        now - self.timestamp < FRESHNESS_WINDOW.as_secs_f64()
    }
}

fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Tracks which directories this process has registered in.
#[derive(Debug)]
pub struct DirectoryTracker {
    actor: Actor,
    tracked: IndexMap<Utf8PathBuf, Utf8PathBuf>,
}

impl DirectoryTracker {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            tracked: IndexMap::new(),
        }
    }

    /// Directories registered during this session, in registration order.
    pub fn tracked_directories(&self) -> impl Iterator<Item = &Utf8Path> {
        self.tracked.keys().map(|dir| dir.as_path())
    }

    /// Register the caller in `directory` and report other current users.
    pub fn track(&mut self, directory: &Utf8Path) -> TrackReport {
        if directory.as_str().trim().is_empty() || !directory.is_dir() {
            return TrackReport::quiet();
        }

        let marker = directory.join(MARKER_FILE_NAME);
        let now = unix_now();

        let current_users = match read_entries(&marker) {
            Ok(entries) => entries
                .into_iter()
                .filter(|entry| entry.is_fresh(now))
                .map(|entry| entry.actor)
                .collect(),
            Err(e) => {
                tracing::warn!("Error reading tracker file {}: {:#}", marker, e);
                Vec::new()
            }
        };

        let entry = UsageEntry {
            actor: self.actor.clone(),
            timestamp: now,
        };
        if let Err(e) = append_entry(&marker, &entry) {
            tracing::error!("Error updating tracker file {}: {:#}", marker, e);
            return TrackReport {
                ok: true,
                message: Some(format!(
                    "Failed to update usage information for directory '{}': {:#}",
                    directory, e
                )),
                current_users,
            };
        }

        self.tracked.insert(directory.to_path_buf(), marker);

        let message = if current_users.is_empty() {
            None
        } else {
            let names: Vec<String> = current_users.iter().map(|a| a.to_string()).collect();
            Some(format!(
                "Directory '{}' is also in use by: {}",
                directory,
                names.join(", ")
            ))
        };

        TrackReport {
            ok: true,
            message,
            current_users,
        }
    }

    /// Delete the marker file of a directory this session registered in.
    ///
    /// The whole file goes, including other users' entries. Returns `false`
    /// only when deletion failed.
    pub fn release(&mut self, directory: &Utf8Path) -> bool {
        let Some(marker) = self.tracked.get(directory).cloned() else {
            return true;
        };

        if marker.exists() {
            if let Err(e) = fs::remove_file(&marker) {
                tracing::error!("Error releasing tracker {}: {}", marker, e);
                return false;
            }
        }

        self.tracked.shift_remove(directory);
        true
    }

    /// Release every directory registered during this session.
    pub fn release_all(&mut self) {
        let directories: Vec<Utf8PathBuf> = self.tracked.keys().cloned().collect();
        for directory in directories {
            self.release(&directory);
        }
    }

    /// Startup check of the input, output and failed directories.
    ///
    /// A directory shared with an earlier role is only tracked once.
    pub fn track_configured(&mut self, settings: &Settings) -> Vec<(SettingKey, TrackReport)> {
        let mut seen: Vec<Utf8PathBuf> = Vec::new();
        let mut reports = Vec::new();

        for key in [
            SettingKey::InputDirectory,
            SettingKey::OutputDirectory,
            SettingKey::FailedDirectory,
        ] {
            let Some(dir) = settings.directory(key) else {
                continue;
            };
            if seen.iter().any(|s| s == dir) {
                continue;
            }
            seen.push(dir.to_path_buf());
            reports.push((key, self.track(dir)));
        }

        reports
    }

    /// Apply a settings change.
    ///
    /// Directories that are no longer configured in any role are released;
    /// newly configured ones are tracked. Returns the reports of newly tracked
    /// directories.
    pub fn reconcile(&mut self, old: &Settings, new: &Settings) -> Vec<(SettingKey, TrackReport)> {
        const ROLES: [SettingKey; 4] = [
            SettingKey::InputDirectory,
            SettingKey::OutputDirectory,
            SettingKey::FailedDirectory,
            SettingKey::LogDirectory,
        ];

        let new_dirs: Vec<&Utf8Path> = ROLES.iter().filter_map(|k| new.directory(*k)).collect();

        for key in ROLES {
            if let Some(dir) = old.directory(key) {
                if !new_dirs.contains(&dir) {
                    self.release(dir);
                }
            }
        }

        let mut reports = Vec::new();
        let mut seen: Vec<&Utf8Path> = Vec::new();
        for key in ROLES {
            let Some(dir) = new.directory(key) else {
                continue;
            };
            let changed = old.directory(key) != Some(dir);
            if changed && !seen.contains(&dir) && !self.tracked.contains_key(dir) {
                reports.push((key, self.track(dir)));
            }
            seen.push(dir);
        }

        reports
    }
}

fn read_entries(marker: &Utf8Path) -> Result<Vec<UsageEntry>> {
    if !marker.exists() {
        return Ok(Vec::new());
    }

    let content =
        fs::read_to_string(marker).with_context(|| format!("Failed to read {}", marker))?;
    Ok(content.lines().filter_map(UsageEntry::parse).collect())
}

fn append_entry(marker: &Utf8Path, entry: &UsageEntry) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(marker)
        .with_context(|| format!("Failed to open {}", marker))?;
    file.write_all(entry.render().as_bytes())
        .with_context(|| format!("Failed to write {}", marker))?;
    Ok(())
}
