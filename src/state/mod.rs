// State management module
//
// Wraps AppState in Arc<RwLock<T>> and broadcasts change events so the
// driving task can follow a batch running on a worker thread.

use crate::input;
use crate::models::{AppState, Settings};
use crate::services::batch::FileReport;
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Files were added to or removed from the queue
    QueueChanged {
        queued: usize,
    },

    /// A batch has started
    ProcessingStarted {
        total_files: usize,
    },

    /// Progress of the running batch
    ProgressUpdated {
        current: usize,
        total: usize,
        current_file: Option<String>,
    },

    /// One file finished
    FileProcessed {
        file_name: String,
        success: bool,
        detail: String,
    },

    /// The batch has finished
    ProcessingFinished {
        succeeded: usize,
        failed: usize,
    },

    /// Configured directories changed
    DirectoriesChanged,

    /// Status line text changed
    StatusChanged {
        message: String,
    },

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// Lock poisoning is recovered from: the state stays usable after a panic in
/// another thread.
pub struct StateManager {
    state: Arc<RwLock<AppState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Apply `update_fn`, then emit an event for every detected change.
    ///
    /// Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        drop(state);

        for change in &changes {
            self.emit(change.clone());
        }

        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, change: StateChange) {
        // No subscribers is fine.
        let _ = self.state_tx.send(change);
    }

    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.input_directory != new.input_directory
            || old.output_directory != new.output_directory
            || old.failed_directory != new.failed_directory
            || old.log_directory != new.log_directory
        {
            changes.push(StateChange::DirectoriesChanged);
        }

        if old.queued_files != new.queued_files {
            changes.push(StateChange::QueueChanged {
                queued: new.queued_files.len(),
            });
        }

        if old.is_processing != new.is_processing {
            if new.is_processing {
                changes.push(StateChange::ProcessingStarted {
                    total_files: new.total_files,
                });
            } else {
                changes.push(StateChange::ProcessingFinished {
                    succeeded: new.succeeded_files.len(),
                    failed: new.failed_files.len(),
                });
            }
        }

        if old.progress != new.progress
            || old.total_files != new.total_files
            || old.current_file != new.current_file
        {
            changes.push(StateChange::ProgressUpdated {
                current: new.progress,
                total: new.total_files,
                current_file: new.current_file.clone(),
            });
        }

        if old.status_message != new.status_message {
            changes.push(StateChange::StatusChanged {
                message: new.status_message.clone(),
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Populate the configured directories from settings
    pub fn load_from_settings(&self, settings: &Settings) -> Vec<StateChange> {
        self.update(|state| {
            state.apply_settings(settings);
            tracing::info!(
                "Loaded settings: input={:?}, output={:?}, failed={:?}, log={:?}",
                state.input_directory,
                state.output_directory,
                state.failed_directory,
                state.log_directory
            );
        })
    }

    /// Add XML files to the queue.
    ///
    /// Non-XML paths and files already queued are ignored. Nothing is queued
    /// while a batch is running. Returns the number of files added.
    pub fn queue_files<I>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = Utf8PathBuf>,
    {
        let mut added = 0;
        self.update(|state| {
            if state.is_processing {
                tracing::warn!("Cannot add files while processing");
                return;
            }
            let accepted = input::accept_xml_files(paths, &state.queued_files);
            added = accepted.len();
            state.queued_files.extend(accepted);
        });
        added
    }

    pub fn clear_queue(&self) -> Vec<StateChange> {
        self.update(|state| {
            if !state.is_processing {
                state.queued_files.clear();
            }
        })
    }

    /// Move the queue into a new batch.
    ///
    /// Returns the files to process, or `None` when a batch is already
    /// running or the queue is empty.
    pub fn start_processing(&self) -> Option<Vec<Utf8PathBuf>> {
        let mut files = None;
        self.update(|state| {
            if state.is_processing || state.queued_files.is_empty() {
                return;
            }
            state.reset_batch_state();
            let queued = std::mem::take(&mut state.queued_files);
            state.total_files = queued.len();
            state.is_processing = true;
            state.status_message = format!("Processing: 0/{} files", queued.len());
            files = Some(queued);
        });
        files
    }

    /// Record progress reported by the batch runner
    pub fn update_progress(&self, current: usize, total: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.progress = current;
            state.total_files = total;
            state.status_message = format!("Processing: {}/{} files", current, total);
        })
    }

    /// Record the outcome of one file
    pub fn record_file_result(&self, report: FileReport, success: bool) -> Vec<StateChange> {
        let event = StateChange::FileProcessed {
            file_name: report.file_name.clone(),
            success,
            detail: report.detail.clone(),
        };

        let mut changes = self.update(|state| state.add_result(report, success));

        self.emit(event.clone());
        changes.push(event);
        changes
    }

    /// Mark the batch as finished with a summary status line
    pub fn finish_processing(&self, summary: impl Into<String>) -> Vec<StateChange> {
        let summary = summary.into();
        self.update(|state| {
            state.is_processing = false;
            state.current_file = None;
            state.status_message = summary;
        })
    }

    pub fn set_status(&self, message: impl Into<String>) -> Vec<StateChange> {
        let message = message.into();
        self.update(|state| state.status_message = message)
    }

    /// Clear progress, results and the queue
    pub fn reset_batch_state(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.reset_batch_state();
            state.queued_files.clear();
        });

        self.emit(StateChange::StateReset);
        changes.push(StateChange::StateReset);
        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
