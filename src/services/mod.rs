//! Services module - the conversion pipeline.
//!
//! Everything here is synchronous and framework-agnostic except the
//! [`viewer`], which launches an external process. The binary drives these
//! services from a blocking worker and reports progress through
//! [`StateManager`](crate::state::StateManager).
//!
//! # Components
//!
//! - [`ConversionService`]: extracts the Base64 PDF embedded in one PEPPOL/UBL
//!   document, writes it next to the configured output, records the outcome
//!   and relocates the source.
//! - [`BatchRunner`]: runs the engine over many files sequentially and
//!   aggregates a [`BatchResult`].
//! - [`AuditLogger`]: append-only outcome log with size/record rotation.
//! - [`DirectoryTracker`]: advisory "who else is using this directory" notices.
//! - [`relocate`](relocate::relocate): move with copy fallback.

pub mod audit;
pub mod batch;
pub mod conversion;
pub mod identity;
pub mod relocate;
pub mod tracker;
pub mod viewer;

pub use audit::{AuditEntry, AuditLogger, AuditSink, AuditStatus, LogLimits, LogState};
pub use batch::{BatchProgress, BatchResult, BatchRunner, FileReport, SingleFileOutcome};
pub use conversion::{ConversionError, ConversionOutcome, ConversionService};
pub use identity::Actor;
pub use relocate::Relocation;
pub use tracker::{DirectoryTracker, TrackReport};
pub use viewer::open_in_default_viewer;
