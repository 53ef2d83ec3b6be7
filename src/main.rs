use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use event_pull::config::{Config, StorageBackend};
use event_pull::storage::{InMemoryStorage, SqliteStorage, Storage};
use event_pull::{logging, metrics, JobOutcome, PulledEventJob};

#[derive(Parser)]
#[command(name = "event_pull")]
#[command(about = "Reconcile pulled external events into venues and events")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pulled-event jobs for payload files (use '-' for stdin)
    Process {
        /// JSON files holding one payload object or an array of payloads
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show a stored event and its revision history
    Show {
        /// External event id
        remote_id: i64,
    },
}

fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryStorage::new()),
        StorageBackend::Sqlite => {
            let path = &config.storage.sqlite_path;
            Arc::new(
                SqliteStorage::open(path)
                    .with_context(|| format!("opening SQLite store at {}", path.display()))?,
            )
        }
    };
    Ok(storage)
}

fn read_payloads(file: &Path) -> anyhow::Result<Vec<Value>> {
    let raw = if file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?
    };

    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing JSON in {}", file.display()))?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

async fn run_process(job: &PulledEventJob, files: &[PathBuf]) -> anyhow::Result<usize> {
    let mut failures = 0;
    for file in files {
        info!("Processing payloads from {}", file.display());
        for (index, payload) in read_payloads(file)?.iter().enumerate() {
            match job.handle(payload).await? {
                JobOutcome::Success(report) => {
                    println!(
                        "{}[{}]: success event={} venue={} revision={}{}{}",
                        file.display(),
                        index,
                        report.event_id,
                        report.venue_id,
                        report.revision,
                        if report.event_created { " (new event)" } else { "" },
                        if report.venue_created { " (new venue)" } else { "" },
                    );
                }
                JobOutcome::Failure { kind, reason } => {
                    failures += 1;
                    println!(
                        "{}[{}]: failure kind={} retryable={} reason={}",
                        file.display(),
                        index,
                        kind,
                        kind.is_retryable(),
                        reason
                    );
                }
            }
        }
    }
    Ok(failures)
}

async fn run_show(storage: &dyn Storage, remote_id: i64) -> anyhow::Result<()> {
    let events = storage.find_events_by_external_id(remote_id).await?;
    let Some(event) = events.into_iter().next() else {
        bail!("no event with external id {}", remote_id);
    };
    let Some(event_id) = event.id else {
        bail!("stored event {} has no id", remote_id);
    };

    let venue = storage.get_venue_by_id(event.venue_id).await?;
    println!("{}", serde_json::to_string_pretty(&event)?);
    if let Some(venue) = venue {
        println!("venue: {} (external id {})", venue.name, venue.external_venue_id);
    }

    for revision in storage.get_event_revisions(event_id).await? {
        println!(
            "revision {} recorded {}: {} (title was {:?})",
            revision.revision,
            revision.recorded_at.to_rfc3339(),
            revision.log_message,
            revision.snapshot.title
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();
    let config = Config::load()?;
    logging::init_logging(&config.logging);
    if config.metrics.enabled {
        metrics::init_metrics(config.metrics.port);
    }

    let storage = open_storage(&config)?;
    info!(backend = ?config.storage.backend, "Storage ready");

    match cli.command {
        Commands::Process { files } => {
            let job = PulledEventJob::new(storage, &config.reconcile);
            let failures = run_process(&job, &files).await?;
            if failures > 0 {
                error!("{} payload(s) failed", failures);
                std::process::exit(1);
            }
        }
        Commands::Show { remote_id } => run_show(storage.as_ref(), remote_id).await?,
    }
    Ok(())
}
