use anyhow::{Context, Result};
use clap::Parser;
use devbyte_sync::config::{AppConfig, CliConfig, FileConfig};
use devbyte_sync::metrics;
use devbyte_sync::refresh::{DevByteRepositoryProvider, DevByteService, RefreshDataWorker};
use devbyte_sync::work::{create_work_manager, SdkLevel, SqliteWorkStore, StaticDeviceMonitor};
use devbyte_sync::Application;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_PLAYLIST_URL: &str = "https://android-kotlin-fun-mars-server.appspot.com/devbytes";

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the work and video databases.
    #[clap(value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. Values in it override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// URL of the DevByte playlist.
    #[clap(long, default_value = DEFAULT_PLAYLIST_URL)]
    pub playlist_url: String,

    /// Timeout in seconds for playlist requests.
    #[clap(long, default_value_t = 30)]
    pub request_timeout_sec: u64,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Platform API level used to decide which constraints are available.
    #[clap(long, default_value_t = 34)]
    pub sdk_level: u32,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            playlist_url: self.playlist_url.clone(),
            request_timeout_sec: self.request_timeout_sec,
            metrics_port: self.metrics_port,
            sdk_level: self.sdk_level,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    info!(
        "Starting devbyte-sync {}-{}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Opening work database at {:?}...", config.work_db_path());
    let store = Arc::new(SqliteWorkStore::new(config.work_db_path())?);
    let device_monitor = Arc::new(StaticDeviceMonitor::new(config.device));

    let shutdown_token = CancellationToken::new();
    let (mut scheduler, work_manager) = create_work_manager(
        store,
        device_monitor,
        config.work.clone(),
        shutdown_token.clone(),
    );

    let service = DevByteService::new(config.playlist_url.clone(), config.request_timeout_sec)?;
    let provider = Arc::new(DevByteRepositoryProvider::new(
        config.videos_db_path(),
        service,
    ));
    scheduler
        .register_worker(Arc::new(RefreshDataWorker::new(provider)))
        .await;

    let application = Application::new(
        work_manager,
        Arc::new(SdkLevel(config.sdk_level)),
        config.backoff,
    );
    application.on_create();

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::run_metrics_server(metrics_port).await {
            error!("Metrics server stopped: {:#}", e);
        }
    });
    info!("Metrics available at port {}!", metrics_port);

    let mut scheduler_task = tokio::spawn(async move { scheduler.run().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        result = &mut scheduler_task => {
            if let Err(e) = result {
                error!("Work scheduler task failed: {}", e);
            }
            return Ok(());
        }
    }

    shutdown_token.cancel();
    if let Err(e) = scheduler_task.await {
        error!("Work scheduler task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}
