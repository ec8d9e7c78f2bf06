//! evlo-ingest - ingest EVTX files into the local event store.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use evlo::config::{self, Config};
use evlo::db::{default_database_path, Database};
use evlo::logging::init_logging;
use evlo::{EvloError, InMemoryStore, Orchestrator, Upload, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "evlo-ingest", version, about = "Ingest Windows Event Log (.evtx) files")]
struct Cli {
    /// JSON configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// EVTX files to ingest, in order.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match config::load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(2);
            }
        },
        None => Config::default(),
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    match run(&cli, &config).await {
        Ok(0) => {}
        Ok(failed) => {
            error!(failed, "Some files failed to ingest");
            process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "evlo-ingest failed");
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Ingests every file and returns how many failed.
async fn run(cli: &Cli, config: &Config) -> Result<usize, EvloError> {
    let db_path = config
        .database
        .path
        .clone()
        .or_else(default_database_path)
        .ok_or_else(|| evlo::ConfigError::Validation {
            message: "database.path is not set and no home directory was found".to_string(),
        })?;
    let db = Database::open(&db_path)?;
    let pool = WorkerPool::new(config.worker_count)?;
    let store = Arc::new(InMemoryStore::new(config.progress.max_entries));
    let orchestrator = Orchestrator::from_config(config, db, pool, store)?;

    info!(files = cli.files.len(), db = %db_path.display(), "Starting ingestion");

    let mut failed = 0;
    for path in &cli.files {
        let outcome = match Upload::from_path(path).await {
            Ok(upload) => orchestrator.ingest(upload).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(report) => println!(
                "{}\tCOMPLETED\tlog_file={}\tevents={}\tdropped={}\tbytes={}",
                path.display(),
                report.log_file.id,
                report.events_persisted,
                report.records_dropped,
                report.bytes
            ),
            Err(e) => {
                failed += 1;
                println!(
                    "{}\tFAILED\t{:?}\t{}",
                    path.display(),
                    e.failure_class(),
                    e.user_message()
                );
            }
        }
    }

    Ok(failed)
}
