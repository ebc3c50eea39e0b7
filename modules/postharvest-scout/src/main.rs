use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use download_client::DownloadClient;
use postharvest_archive::{Archive, FileKvStore, KvStore, PgKvStore, QueueWorker};
use postharvest_common::Config;
use postharvest_scout::{export_records, HarvestSettings, Harvester, SnapshotPage};

#[derive(Parser)]
#[command(name = "postharvest", about = "Capture feed posts and their media into a local archive")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a capture session over a saved page until scrolling stalls out
    Harvest {
        snapshot: PathBuf,
        /// Skip viewer-name detection
        #[arg(long)]
        no_detect: bool,
    },
    /// Write stored posts as JSON, with the viewer's name redacted
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show record count and download progress
    Progress,
    /// Reset failed downloads and download them again
    Retry,
    /// Remove every record and queued download
    Clear,
    /// Set the name redacted from exports; empty clears it
    SetName { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("postharvest=info".parse()?);
    if cli.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::from_env()?;
    config.log_redacted();

    let kv = open_store(&config).await?;
    let transfer = Arc::new(DownloadClient::new(&config.download_dir, config.download_timeout)?);

    match cli.command {
        Command::Harvest { snapshot, no_detect } => {
            let html = tokio::fs::read_to_string(&snapshot)
                .await
                .with_context(|| format!("Could not read snapshot {}", snapshot.display()))?;
            let page = Arc::new(SnapshotPage::new(&html));
            let harvester = Harvester::open(page, kv, transfer, snapshot_settings()).await?;

            if let Some(name) = &config.viewer_name_override {
                if harvester.archive().names.manual_override().await?.is_none() {
                    harvester.set_manual_name(name).await?;
                }
            }
            if !no_detect {
                harvester.detect_name().await?;
            }

            harvester.set_active(true);
            let end = harvester.wait().await;
            info!(?end, records = harvester.count(), "Session ended");

            drain_downloads(harvester.worker()).await;
            println!("{}", serde_json::to_string_pretty(&harvester.status().await)?);
        }
        Command::Export { out } => {
            let archive = Archive::open(kv).await?;
            let name = archive.names.effective_name().await?;
            let records = export_records(archive.records.records(), name.as_deref());
            let path = out.unwrap_or_else(|| {
                PathBuf::from(format!("posts-{}.json", chrono::Utc::now().format("%Y-%m-%d")))
            });
            tokio::fs::write(&path, serde_json::to_vec_pretty(&records)?)
                .await
                .with_context(|| format!("Could not write {}", path.display()))?;
            info!(records = records.len(), path = %path.display(), "Export written");
        }
        Command::Progress => {
            let archive = Archive::open(kv).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "records": archive.records.len(),
                    "downloads": archive.queue.progress(),
                }))?
            );
        }
        Command::Retry => {
            let archive = Archive::open(kv).await?;
            let worker = QueueWorker::new(archive.queue.clone(), archive.records.clone(), transfer);
            let reset = archive.queue.retry_all().await?;
            info!(reset, "Retrying failed downloads");
            drain_downloads(&worker).await;
            println!("{}", serde_json::to_string_pretty(&archive.queue.progress())?);
        }
        Command::Clear => {
            Archive::open(kv).await?.clear_all().await?;
        }
        Command::SetName { name } => {
            let archive = Archive::open(kv).await?;
            archive.names.set_manual_override(&name).await?;
            info!(cleared = name.trim().is_empty(), "Manual name updated");
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn KvStore>> {
    match &config.database_url {
        Some(url) => {
            info!("Using Postgres key-value store");
            Ok(Arc::new(PgKvStore::connect(url).await?))
        }
        None => {
            tokio::fs::create_dir_all(&config.data_dir)
                .await
                .with_context(|| format!("Could not create {}", config.data_dir.display()))?;
            Ok(Arc::new(FileKvStore::new(&config.data_dir)))
        }
    }
}

/// A static snapshot never grows, so short ticks and no retries let the
/// session end as soon as every post has been seen.
fn snapshot_settings() -> HarvestSettings {
    HarvestSettings::builder()
        .debounce(Duration::from_millis(50))
        .periodic_scan(Duration::from_millis(200))
        .expansion_settle(Duration::ZERO)
        .reexpansion_delay(Duration::from_millis(100))
        .scroll_tick(Duration::from_millis(100))
        .max_stalls(3)
        .max_retries(0)
        .build()
}

/// Run the worker until no download is pending or in flight.
async fn drain_downloads(worker: &Arc<QueueWorker>) {
    loop {
        let report = worker.drain().await;
        if report.done + report.failed > 0 {
            info!(done = report.done, failed = report.failed, "Downloads drained");
        }
        if !worker.is_busy() && !worker.queue().has_pending() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
