//! PEPPOL PDF - command-line driver
//!
//! Converts PEPPOL/UBL XML documents into the PDF files they embed.
//!
//! # Usage
//!
//! ```text
//! peppolpdf [OPTIONS] [FILE.xml ...]
//!
//!   --drop <PAYLOAD>       add files from a drag-and-drop payload
//!   --set <KEY>=<VALUE>    change a setting (repeatable) and save
//!   --config-dir <DIR>     settings directory (default "PeppolPdf Data")
//!   --show-log             print the active audit log
//!   --no-open              do not open the PDF after a single-file run
//!   --debug                verbose diagnostic logging
//! ```
//!
//! Without files the XML documents in the configured input directory are
//! processed.
//!
//! # Execution Flow
//!
//! 1. Initialize diagnostic logging
//! 2. Load settings and apply any `--set` changes
//! 3. Register in the configured directories and print usage notices
//! 4. Queue the requested files and run the batch on a blocking worker
//! 5. Single file: open the PDF or print the error; otherwise print the report
//! 6. Release directory markers and log metrics

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use peppolpdf::input::{parse_drop_payload, xml_files_in};
use peppolpdf::logging::{self, LOG_PREFIX};
use peppolpdf::services::batch::SingleFileOutcome;
use peppolpdf::services::open_in_default_viewer;
use peppolpdf::{
    APP_NAME, Actor, AuditLogger, BatchRunner, ConfigManager, ConversionService,
    DirectoryTracker, Metrics, SettingKey, SettingsForm, StateChange, StateManager, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

const DEFAULT_CONFIG_DIR: &str = "PeppolPdf Data";

/// peppolpdf - extract embedded PDFs from PEPPOL/UBL XML documents
#[derive(Parser, Debug)]
#[command(name = "peppolpdf")]
#[command(version, about, long_about = None)]
struct Cli {
    /// XML documents to convert
    files: Vec<Utf8PathBuf>,

    /// Add files from a drag-and-drop payload
    #[arg(long, value_name = "PAYLOAD")]
    drop: Vec<String>,

    /// Change a setting and save it (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_setting)]
    settings: Vec<(SettingKey, String)>,

    /// Settings directory
    #[arg(long, default_value = DEFAULT_CONFIG_DIR)]
    config_dir: Utf8PathBuf,

    /// Print the active audit log
    #[arg(long)]
    show_log: bool,

    /// Do not open the PDF after a single-file run
    #[arg(long)]
    no_open: bool,

    /// Verbose diagnostic logging
    #[arg(long)]
    debug: bool,
}

fn parse_setting(pair: &str) -> Result<(SettingKey, String), String> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{pair}'"))?;
    let key = key
        .trim()
        .parse::<SettingKey>()
        .map_err(|k| format!("unknown setting '{k}'"))?;
    Ok((key, value.to_string()))
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let _log_guard = logging::setup_logging_with_console("logs", LOG_PREFIX, args.debug, true)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("peppolpdf-worker")
        .build()
        .context("Failed to build tokio runtime")?;

    let state_manager = Arc::new(StateManager::new());
    let metrics = Arc::new(Metrics::new());

    let mut config_manager = ConfigManager::new(args.config_dir.clone())?;

    let actor = Actor::current().clone();
    let mut tracker = DirectoryTracker::new(actor.clone());
    for (key, report) in tracker.track_configured(config_manager.settings()) {
        if let Some(message) = report.message {
            println!("Notice ({}): {}", key, message);
        }
    }

    if !args.settings.is_empty() {
        let old = config_manager.settings().clone();
        let mut form = SettingsForm::from(&old);
        for (key, value) in &args.settings {
            form.set_field(*key, value).map_err(anyhow::Error::msg)?;
        }
        let new = config_manager
            .save_form(&form)
            .context("Settings were not saved")?;
        println!("Settings saved to {}", config_manager.config_path());

        for (key, report) in tracker.reconcile(&old, &new) {
            if let Some(message) = report.message {
                println!("Notice ({}): {}", key, message);
            }
        }
    }

    let settings = config_manager.settings().clone();
    state_manager.load_from_settings(&settings);
    let audit = AuditLogger::new(&settings, actor);

    if args.show_log {
        match audit.read_active_log() {
            Some(content) => print!("{}", content),
            None => println!("No log entries found"),
        }
    }

    let mut candidates = args.files.clone();
    for payload in &args.drop {
        candidates.extend(parse_drop_payload(payload));
    }
    if candidates.is_empty() && args.drop.is_empty() && !args.show_log {
        if let Some(input_dir) = settings.directory(SettingKey::InputDirectory) {
            candidates = xml_files_in(input_dir)
                .with_context(|| format!("Failed to list {}", input_dir))?;
        }
    }
    state_manager.queue_files(candidates);

    let outcome = match state_manager.start_processing() {
        Some(files) => {
            let runner = BatchRunner::new(ConversionService::new(settings, audit), metrics.clone());
            Some(runtime.block_on(run_batch(state_manager.clone(), runner, files))?)
        }
        None => {
            if !args.show_log && args.settings.is_empty() {
                println!("No XML files to process");
            }
            None
        }
    };

    if let Some(result) = outcome {
        match result.single_file_outcome() {
            Some(SingleFileOutcome::Converted(pdf_path)) => {
                println!("File processed successfully: {}", pdf_path);
                if !args.no_open {
                    if let Err(e) = runtime.block_on(open_in_default_viewer(&pdf_path)) {
                        tracing::error!("Failed to open PDF: {:#}", e);
                    }
                }
            }
            Some(SingleFileOutcome::Failed(message)) => {
                eprintln!("Failed to process file: {}", message);
            }
            None => print!("{}", result.report()),
        }
    }

    tracker.release_all();
    metrics.log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");

    Ok(())
}

/// Run the batch on a blocking worker while this task prints progress.
async fn run_batch(
    state_manager: Arc<StateManager>,
    mut runner: BatchRunner<AuditLogger>,
    files: Vec<Utf8PathBuf>,
) -> Result<peppolpdf::BatchResult> {
    let mut rx = state_manager.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(StateChange::FileProcessed {
                    file_name,
                    success,
                    detail,
                }) => {
                    let mark = if success { "ok" } else { "FAILED" };
                    eprintln!("[{}] {}: {}", mark, file_name, detail);
                }
                Ok(StateChange::StatusChanged { message }) => eprintln!("{}", message),
                Ok(StateChange::ProcessingFinished { .. }) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Progress printer skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let worker_state = state_manager.clone();
    let result = tokio::task::spawn_blocking(move || {
        runner.run_batch_observed(&files, |progress| {
            worker_state.record_file_result(progress.report.clone(), progress.success);
            worker_state.update_progress(progress.processed, progress.total);
        })
    })
    .await
    .context("Batch worker failed")?;

    state_manager.finish_processing(result.summary());
    if let Err(e) = printer.await {
        tracing::debug!("Progress printer ended abnormally: {}", e);
    }

    Ok(result)
}
