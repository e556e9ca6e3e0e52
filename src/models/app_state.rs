use crate::models::{SettingKey, Settings};
use crate::services::batch::FileReport;
use camino::{Utf8Path, Utf8PathBuf};

/// Session state of the converter.
///
/// Holds the queue of files waiting to be converted, progress of the running
/// batch and the results collected so far.
///
/// # Thread Safety
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Mutate it through the manager so that change events are emitted:
/// - [`read()`](crate::state::StateManager::read) for read-only access
/// - [`update()`](crate::state::StateManager::update) for mutations
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Configured directories
    pub input_directory: Option<Utf8PathBuf>,
    pub output_directory: Option<Utf8PathBuf>,
    pub failed_directory: Option<Utf8PathBuf>,
    pub log_directory: Option<Utf8PathBuf>,

    // Files waiting for the next batch
    pub queued_files: Vec<Utf8PathBuf>,

    // Runtime state
    pub is_processing: bool,
    pub current_file: Option<String>,
    pub status_message: String,

    // Progress state
    pub progress: usize,
    pub total_files: usize,

    // Results of the current or last batch
    pub succeeded_files: Vec<FileReport>,
    pub failed_files: Vec<FileReport>,
}

impl AppState {
    /// Copy the directory settings into the session.
    pub fn apply_settings(&mut self, settings: &Settings) {
        let dir = |key| settings.directory(key).map(Utf8Path::to_path_buf);
        self.input_directory = dir(SettingKey::InputDirectory);
        self.output_directory = dir(SettingKey::OutputDirectory);
        self.failed_directory = dir(SettingKey::FailedDirectory);
        self.log_directory = dir(SettingKey::LogDirectory);
    }

    /// Returns (succeeded, failed, total).
    pub fn batch_stats(&self) -> (usize, usize, usize) {
        (
            self.succeeded_files.len(),
            self.failed_files.len(),
            self.total_files,
        )
    }

    /// Progress as a percentage of the running batch.
    pub fn progress_percent(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            self.progress as f64 / self.total_files as f64 * 100.0
        }
    }

    /// Clear progress and results before a new batch.
    pub fn reset_batch_state(&mut self) {
        self.is_processing = false;
        self.current_file = None;
        self.progress = 0;
        self.total_files = 0;
        self.succeeded_files.clear();
        self.failed_files.clear();
    }

    /// Record the outcome of one file and advance progress.
    pub fn add_result(&mut self, report: FileReport, success: bool) {
        self.current_file = Some(report.file_name.clone());
        if success {
            self.succeeded_files.push(report);
        } else {
            self.failed_files.push(report);
        }
        self.progress += 1;
    }
}
