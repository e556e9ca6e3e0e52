//! Moving processed source documents.
//!
//! A source document is moved with a rename. If the rename fails (another
//! device, permissions, a file held open elsewhere) it is copied instead and
//! the original stays where it was. If the copy fails too, the failure is
//! logged and reported to the caller, which never changes a file's outcome.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

/// What happened to a source file.
#[derive(Debug)]
pub enum Relocation {
    /// The file now lives at the destination.
    Moved(Utf8PathBuf),
    /// The rename failed; a copy was written and the source left in place.
    Copied {
        destination: Utf8PathBuf,
        move_error: io::Error,
    },
    /// The source was already at the destination.
    AlreadyInPlace(Utf8PathBuf),
    /// The source no longer exists.
    SourceMissing,
    /// Neither rename nor copy succeeded; the source is untouched.
    Failed {
        move_error: io::Error,
        copy_error: io::Error,
    },
    /// The destination directory could not be created; nothing was attempted.
    DirectoryUnavailable {
        directory: Utf8PathBuf,
        source: io::Error,
    },
}

impl Relocation {
    /// Location of the file at the destination, if it got there.
    pub fn destination(&self) -> Option<&Utf8Path> {
        match self {
            Relocation::Moved(path) | Relocation::AlreadyInPlace(path) => Some(path),
            Relocation::Copied { destination, .. } => Some(destination),
            Relocation::SourceMissing
            | Relocation::Failed { .. }
            | Relocation::DirectoryUnavailable { .. } => None,
        }
    }
}

/// Move `source` into `dest_dir`, keeping its file name.
///
/// An existing file of the same name in `dest_dir` is replaced.
pub fn relocate(source: &Utf8Path, dest_dir: &Utf8Path) -> Relocation {
    relocate_with(source, dest_dir, |from, to| fs::rename(from, to))
}

fn relocate_with<F>(source: &Utf8Path, dest_dir: &Utf8Path, rename: F) -> Relocation
where
    F: FnOnce(&Utf8Path, &Utf8Path) -> io::Result<()>,
{
    if !source.exists() {
        tracing::warn!("Original file no longer exists at: {}", source);
        return Relocation::SourceMissing;
    }

    let Some(file_name) = source.file_name() else {
        tracing::warn!("Cannot relocate path without a file name: {}", source);
        return Relocation::SourceMissing;
    };
    let destination = dest_dir.join(file_name);

    if is_same_file(source, &destination) {
        tracing::debug!("File already in place: {}", destination);
        return Relocation::AlreadyInPlace(destination);
    }

    if destination.exists() {
        tracing::warn!("Target file already exists, will be overwritten: {}", destination);
    }

    let move_error = match rename(source, &destination) {
        Ok(()) => {
            tracing::info!("Moved {} to {}", source, destination);
            return Relocation::Moved(destination);
        }
        Err(e) => e,
    };
    tracing::warn!("Failed to move {}: {}", source, move_error);

    match fs::copy(source, &destination) {
        Ok(_) => {
            tracing::info!("Copied {} to {} (move failed)", source, destination);
            Relocation::Copied {
                destination,
                move_error,
            }
        }
        Err(copy_error) => {
            tracing::error!(
                "Failed to copy {} as fallback: {}; file left in place",
                source,
                copy_error
            );
            Relocation::Failed {
                move_error,
                copy_error,
            }
        }
    }
}

fn is_same_file(a: &Utf8Path, b: &Utf8Path) -> bool {
    match (a.canonicalize_utf8(), b.canonicalize_utf8()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
