//! grib2pf service.
//!
//! Keeps images and placefiles current for every configured feed:
//! - Polls upstream listings and directories for new data
//! - Runs at most one render per feed, replacing stale ones
//! - Publishes outputs atomically
//! - Exposes Prometheus counters

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use freshness::{HttpFetcher, TextFetcher};
use grib2pf::{load_feed_configs, FeedRunner, JobStatus, ProcessRenderEngine, RenderEngine};

#[derive(Parser, Debug)]
#[command(name = "grib2pf")]
#[command(about = "Generate GRIB images and placefiles for Supercell-Wx")]
struct Args {
    /// Configuration directory (contains feeds/*.yaml)
    #[arg(long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Run only this feed (default: all configured)
    #[arg(short, long)]
    feed: Option<String>,

    /// Poll every feed once, wait for the resulting renders and exit
    #[arg(long)]
    once: bool,

    /// Render engine executable
    #[arg(long, env = "RENDER_COMMAND", default_value = "grib2pf-render")]
    render_command: PathBuf,

    /// Extra argument passed to the render engine (repeatable)
    #[arg(long = "render-arg", allow_hyphen_values = true)]
    render_args: Vec<String>,

    /// Seconds one render may run before the engine is killed
    #[arg(long, env = "RENDER_TIMEOUT_SECS", default_value_t = 600)]
    render_timeout_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Port for the Prometheus metrics listener (disabled when absent)
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(port) = args.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port = port, "Prometheus metrics listener started");
    }

    info!(config_dir = %args.config_dir.display(), "Starting grib2pf");

    let mut configs = load_feed_configs(&args.config_dir)?;
    if let Some(feed) = &args.feed {
        configs.retain(|c| &c.id == feed);
        if configs.is_empty() {
            bail!("Feed '{}' is not configured or is disabled", feed);
        }
    }

    let fetcher: Arc<dyn TextFetcher> = Arc::new(
        HttpFetcher::new(Duration::from_secs(30)).context("Failed to create HTTP client")?,
    );
    let engine: Arc<dyn RenderEngine> = Arc::new(
        ProcessRenderEngine::new(&args.render_command)
            .with_args(args.render_args.clone())
            .with_job_timeout(Duration::from_secs(args.render_timeout_secs)),
    );

    let mut runners = Vec::new();
    for config in &configs {
        match FeedRunner::from_config(config, engine.clone(), fetcher.clone()).await {
            Ok(runner) => runners.push(runner),
            Err(e) => {
                error!(feed = %config.id, error = %format!("{:#}", e), "Feed could not be started");
            }
        }
    }

    if runners.is_empty() {
        bail!("No feed could be started");
    }

    if args.once {
        info!(feeds = runners.len(), "Running single poll cycle");

        let outcomes = join_all(runners.iter_mut().map(|runner| runner.run_once())).await;
        let failed = outcomes
            .iter()
            .flatten()
            .filter(|o| o.status == JobStatus::Failed)
            .count();
        if failed > 0 {
            warn!(failed = failed, "Some generations failed");
        }
    } else {
        info!(feeds = runners.len(), "Starting continuous polling");

        let shutdown = CancellationToken::new();

        // Handle Ctrl+C
        let shutdown_signal = shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
            shutdown_signal.cancel();
        });

        let handles: Vec<_> = runners
            .into_iter()
            .map(|runner| tokio::spawn(runner.run(shutdown.clone())))
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Feed task ended abnormally");
            }
        }
    }

    info!("grib2pf stopped");
    Ok(())
}
