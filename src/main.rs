//! datas3t — metadata and coordination service for append-only
//! numeric-keyed datasets backed by S3-compatible object storage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use datas3t::api;
use datas3t::catalog::sqlite::SqliteCatalog;
use datas3t::catalog::Catalog;
use datas3t::config::Config;
use datas3t::deletion_worker;
use datas3t::multipart::MultipartCoordinator;
use datas3t::restore;
use datas3t::s3_client::S3Client;
use datas3t::state::AppState;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

fn version_long() -> &'static str {
    static V: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    V.get_or_init(|| format!("{} (built {})", env!("CARGO_PKG_VERSION"), env!("DATAS3T_BUILD_TIME")))
}

/// datas3t — metadata/coordination service for S3-backed append-only datasets
#[derive(Parser, Debug)]
#[command(name = "datas3t")]
#[command(version = version_long())]
#[command(author, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| std::env::var("DATAS3T_LOG_LEVEL").map(EnvFilter::new))
        .unwrap_or_else(|_| {
            if cli.verbose {
                EnvFilter::new("datas3t=trace,tower_http=trace")
            } else {
                EnvFilter::new("datas3t=debug,tower_http=debug")
            }
        });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = if let Some(ref path) = cli.config {
        Config::from_file(path)?
    } else {
        Config::load()
    };
    if let Some(ref addr) = cli.listen {
        config.listen_addr = addr.parse()?;
    }

    info!("Starting datas3t v{} (built {})", env!("CARGO_PKG_VERSION"), env!("DATAS3T_BUILD_TIME"));
    info!("  Listen address: {}", config.listen_addr);
    info!("  Database: {}", config.database_url);
    info!("  S3 bucket: {}", config.s3.bucket);
    if let Some(ep) = &config.s3.endpoint {
        info!("  S3 endpoint: {ep}");
    }
    if config.s3.access_key_id.is_none() {
        warn!("  S3 credentials: not set in config, falling back to the default AWS credential chain");
    }

    let catalog: Arc<dyn Catalog> = Arc::new(SqliteCatalog::connect(&config.database_url).await?);
    let s3 = Arc::new(S3Client::new(&config.s3).await);

    let restore_completed = Arc::new(AtomicBool::new(false));
    match restore::restore_if_empty(&*catalog, &s3).await {
        Ok(ran) => {
            if ran {
                info!("restore: catalog was empty, rebuilt from S3");
            }
            restore_completed.store(true, Ordering::Relaxed);
        }
        Err(e) => {
            warn!(error = %e, "restore failed; starting with an empty catalog, will retry on next boot");
        }
    }

    let multipart = Arc::new(MultipartCoordinator::new(config.uploads_dir.clone(), config.multipart_upload_ttl));
    spawn_periodic(Duration::from_secs(60 * 60), {
        let multipart = multipart.clone();
        move || multipart.sweep_stale()
    });

    let deletion_worker_alive = Arc::new(AtomicBool::new(true));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn({
        let catalog = catalog.clone();
        let s3 = s3.clone();
        let config = config.deletion_worker.clone();
        let alive = deletion_worker_alive.clone();
        async move {
            deletion_worker::run(&*catalog, &s3, &config, shutdown_rx).await;
            alive.store(false, Ordering::Relaxed);
        }
    });

    let state = AppState {
        catalog,
        s3,
        multipart,
        uploads_dir: config.uploads_dir.clone(),
        compaction_grace: config.compaction_grace,
        restore_completed,
        deletion_worker_alive,
    };

    let app = api::router(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("datas3t listening on http://{}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    info!("Server shutdown complete");
    Ok(())
}

/// Spawn a background task that runs `f` every `interval` (spec §4.6's
/// staleness sweep).
fn spawn_periodic(interval: Duration, f: impl Fn() + Send + 'static) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tick.tick().await;
            f();
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => warn!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
