//! Clipbot CLI entry point.

use std::str::FromStr as _;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing_subscriber::EnvFilter;

use clipbot::cleanup::CleanupManager;
use clipbot::config::Config;
use clipbot::pipeline::{HttpFetcher, MessageProcessor};
use clipbot::reddit::RedditClient;
use clipbot::scheduler::Scheduler;
use clipbot::store::UploadLogStore;
use clipbot::transform::WorkerTransformer;
use clipbot::upload::{HostRegistry, UploadDestination, catbox::CatboxClient, imgur::ImgurClient};

#[derive(Parser)]
#[command(name = "clipbot")]
#[command(about = "A mention-driven media editing bot")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting clipbot...");

    let config = if let Some(config_path) = cli.config {
        Config::load_from_path(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        Config::load().context("failed to load configuration")?
    };
    let config = Arc::new(config);

    tracing::info!(data_dir = %config.data_dir.display(), "Configuration loaded");

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .context("failed to create data directory")?;
    tokio::fs::create_dir_all(config.scratch_dir())
        .await
        .context("failed to create scratch directory")?;

    let options = SqliteConnectOptions::from_str(&format!(
        "sqlite://{}",
        config.sqlite_path().display()
    ))
    .context("invalid database path")?
    .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to open database")?;
    let store = Arc::new(UploadLogStore::new(pool));
    store
        .initialize()
        .await
        .context("failed to initialize database schema")?;

    tracing::info!("Database ready");

    let api = Arc::new(
        RedditClient::new(config.reddit.clone()).context("failed to build Reddit client")?,
    );

    let http = reqwest::Client::builder()
        .user_agent(config.reddit.user_agent.clone())
        .build()
        .context("failed to build HTTP client")?;

    let mut hosts = HostRegistry::new();
    hosts.register(Arc::new(CatboxClient::new(
        http.clone(),
        config.upload.catbox_userhash.clone(),
    )));
    if let Some(client_id) = config.upload.imgur_client_id.clone() {
        hosts.register(Arc::new(ImgurClient::new(http.clone(), client_id)));
    }

    // validate() already checked the name parses; the registry check
    // additionally catches a destination missing its credentials.
    let destination = UploadDestination::parse(&config.upload.destination)
        .context("unknown upload destination")?;
    let primary_host = hosts
        .get(destination)
        .context("configured upload destination has no registered client")?
        .clone();

    let processor = MessageProcessor::new(
        api.clone(),
        Arc::new(WorkerTransformer::new(config.transform.worker_bin.clone())),
        Arc::new(HttpFetcher::new(http)),
        primary_host,
        store.clone(),
        config.clone(),
    );
    let cleanup = CleanupManager::new(api, hosts, store, config.filters);
    let scheduler = Scheduler::new(processor, cleanup, config.scheduler);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!(handle = %config.handle(), "Clipbot started");
    scheduler.run(shutdown_rx).await?;

    tracing::info!("Clipbot stopped");
    Ok(())
}
