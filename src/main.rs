use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facefind::drive::DriveClient;
use facefind::vision::VisionClient;
use facefind::{config, credentials, storage, ContainerLocator, MatchPipeline, MatchReport};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "facefind")]
#[command(
    version,
    about = "Find the photos in a shared album that show the face in a reference photo"
)]
struct Cli {
    /// Access token for the photo storage and vision APIs
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search an album for photos of the person in a reference photo
    Find {
        /// Reference photo containing one face
        #[arg(short, long)]
        photo: PathBuf,
        /// Album id or share link
        #[arg(short, long)]
        album: String,
        /// Match threshold (lower is stricter)
        #[arg(long)]
        threshold: Option<f32>,
        /// Photos compared at the same time
        #[arg(long)]
        concurrency: Option<usize>,
        /// Listing page size
        #[arg(long)]
        page_size: Option<u32>,
        /// Directory matched photos are written to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the albums the token can see
    Albums,
    /// Open config file in editor
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(None)?;

    match cli.command {
        Commands::Find {
            photo,
            album,
            threshold,
            concurrency,
            page_size,
            output,
        } => {
            if let Some(threshold) = threshold {
                cfg.threshold = threshold;
            }
            if let Some(concurrency) = concurrency {
                cfg.max_concurrency = concurrency;
            }
            if let Some(page_size) = page_size {
                cfg.page_size = page_size;
            }
            if output.is_some() {
                cfg.output_dir = output;
            }
            find(&cfg, cli.token.as_deref(), &photo, &album).await
        }
        Commands::Albums => albums(&cfg, cli.token.as_deref()).await,
        Commands::Config => open_config(),
    }
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("facefind/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}

async fn find(cfg: &config::Config, token: Option<&str>, photo: &Path, album: &str) -> Result<()> {
    if !cfg.threshold.is_finite() || cfg.threshold <= 0.0 {
        anyhow::bail!("threshold must be a positive number, got {}", cfg.threshold);
    }
    let token = credentials::access_token(token, cfg.access_token.as_deref())?;
    let container: ContainerLocator = album
        .parse()
        .with_context(|| format!("Invalid album: {}", album))?;
    let reference = storage::load_reference_photo(photo)?;

    let client = http_client()?;
    let drive = DriveClient::new(client.clone(), &cfg.drive_endpoint, token.clone());
    let vision = VisionClient::new(client, &cfg.vision_endpoint, token);

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let pipeline = MatchPipeline::new(Arc::new(drive), Arc::new(vision), cfg.pipeline_options())
        .with_progress_observer(tx);

    let progress = tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            info!("{}", entry);
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing photos already in progress...");
            ctrl_c.cancel();
        }
    });

    info!("Searching album {} for {}", container, photo.display());
    let report = pipeline.run(&reference, &container, cancel).await;
    drop(pipeline);
    let _ = progress.await;
    let report = report.context("Failed to use the reference photo")?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let saved = storage::save_matches(&cfg.output_dir(), &run_id, &report.matches)
        .context("Failed to save matched photos")?;
    summarize(&report);
    for path in &saved {
        info!("  {}", path.display());
    }
    Ok(())
}

fn summarize(report: &MatchReport) {
    info!(
        "✓ {} matching photo(s) out of {} compared",
        report.matches.len(),
        report.results.len()
    );
    for failure in &report.failures {
        debug!("{}: {}", failure.image, failure.error);
    }
    for (kind, count) in report.failure_counts() {
        warn!("{} photo(s) skipped: {}", count, kind);
    }
    if let Some(partial) = &report.partial {
        warn!("Album listing incomplete: {}", partial);
    }
    if report.cancelled {
        warn!("Search was cancelled before every photo was compared");
    }
}

async fn albums(cfg: &config::Config, token: Option<&str>) -> Result<()> {
    let token = credentials::access_token(token, cfg.access_token.as_deref())?;
    let drive = DriveClient::new(http_client()?, &cfg.drive_endpoint, token);

    let folders = drive
        .list_folders()
        .await
        .context("Failed to list albums")?;
    if folders.is_empty() {
        info!("No albums found");
    }
    for folder in folders {
        println!("{}\t{}", folder.id, folder.name);
    }
    Ok(())
}

fn open_config() -> Result<()> {
    let config_path = config::CONFIG_PATH.as_path();
    if !config_path.exists() {
        config::save_config(&config::Config::default(), None)
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
