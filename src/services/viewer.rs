//! Opening produced PDFs in the platform's default viewer.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::process::Stdio;
use tokio::process::Command;

/// Launcher command and arguments for the current platform.
pub fn viewer_command(pdf_path: &Utf8Path) -> (&'static str, Vec<String>) {
    let path = pdf_path.to_string();
    if cfg!(target_os = "windows") {
        // `start` treats the first quoted argument as a window title.
        ("cmd", vec!["/C".into(), "start".into(), String::new(), path])
    } else if cfg!(target_os = "macos") {
        ("open", vec![path])
    } else {
        ("xdg-open", vec![path])
    }
}

/// Hand `pdf_path` to the default viewer without waiting for it to close.
pub async fn open_in_default_viewer(pdf_path: &Utf8Path) -> Result<()> {
    if !pdf_path.is_file() {
        anyhow::bail!("PDF not found: {}", pdf_path);
    }

    tracing::info!("Attempting to open PDF: {}", pdf_path);

    let (program, args) = viewer_command(pdf_path);
    let mut cmd = Command::new(program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to launch {} for {}", program, pdf_path))?;

    // Reap the launcher in the background; the viewer itself outlives it.
    tokio::spawn(async move {
        if let Err(e) = child.wait().await {
            tracing::debug!("Viewer launcher did not exit cleanly: {}", e);
        }
    });

    tracing::info!("Successfully opened PDF: {}", pdf_path);
    Ok(())
}
