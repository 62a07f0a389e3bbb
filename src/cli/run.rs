use crate::analysis::{identity_from_config, AnalysisInvoker, VisitorTracker};
use crate::clients::{
    object_store_from_config, HttpVideoStreamClient, HttpVisionClient, ObjectStore, VideoStreamService, VisionService,
};
use crate::config::load_config;
use crate::config::types::Config;
use crate::pipeline::{
    run_batch, run_processor, run_push, run_stream, BatchRun, BatchSummary, Persister, ProcessorRun, PushRun,
    PushSource, PushSummary, RunError, StreamRun,
};
use crate::source::{FfmpegFrameSampler, StreamLimits};
use crate::storage::duckdb::DuckDbKvStore;
use crate::storage::{CursorStore, KvStore};
use crate::web::run_server;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

fn require_config_path(config_path: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    config_path.ok_or_else(|| {
        "config not found. Searched ~/.config/footfall/config.yml and /etc/footfall/config.yml. \
         Use --config <path> to specify a config file, or run 'footfall config init' to generate one."
            .into()
    })
}

/// Poll the configured video stream until Ctrl+C
pub async fn stream(
    config_path: Option<PathBuf>,
    start_timestamp: Option<DateTime<Utc>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config_path(config_path)?;
    run_stream_mode(&config_path, start_timestamp).await.map_err(|e| e.into())
}

/// Drive the configured stream processor until Ctrl+C
pub async fn processor(
    config_path: Option<PathBuf>,
    start_timestamp: Option<DateTime<Utc>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config_path(config_path)?;
    run_processor_mode(&config_path, start_timestamp).await.map_err(|e| e.into())
}

/// Process every configured directory once
pub async fn batch(config_path: Option<PathBuf>) -> Result<BatchSummary, Box<dyn std::error::Error>> {
    let config_path = require_config_path(config_path)?;
    run_batch_mode(&config_path).await.map_err(|e| e.into())
}

/// Upload one video into a stream
pub async fn push(
    config_path: Option<PathBuf>,
    stream: Option<String>,
    source: PushSource,
) -> Result<PushSummary, Box<dyn std::error::Error>> {
    let config_path = require_config_path(config_path)?;
    run_push_mode(&config_path, stream, source).await.map_err(|e| e.into())
}

/// Serve only the health endpoint until Ctrl+C
pub async fn serve(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config_path(config_path)?;
    let config = load_config(&config_path)?;
    let web_config = config.require_web()?.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(async move { run_server(web_config, shutdown_rx).await.map_err(|e| e.to_string()) });

    signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    server.await?.map_err(RunError::WebServer)?;
    Ok(())
}

fn load(config_path: &Path) -> Result<Config, RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    Ok(load_config(config_path)?)
}

async fn open_storage(config: &Config) -> Result<(Arc<dyn KvStore>, Persister), RunError> {
    info!(path = %config.storage.path.display(), "Initializing storage");
    let store: Arc<dyn KvStore> = Arc::new(DuckDbKvStore::new(&config.storage.path)?);
    store.init_schema().await?;

    let tables = &config.storage.tables;
    let cursors = CursorStore::new(store.clone(), tables.cursors.clone());
    let persister = Persister::new(store.clone(), tables.analytics.clone(), cursors);
    Ok((store, persister))
}

/// Flip the shutdown flag on Ctrl+C
fn watch_ctrl_c() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, finishing current unit");
            let _ = tx.send(true);
        }
    });
    (shutdown_tx, shutdown_rx)
}

/// Start the health server next to a loop when `web` is configured
fn spawn_health_server(config: &Config, shutdown_rx: &watch::Receiver<bool>) -> Option<JoinHandle<()>> {
    let web_config = config.web.clone()?;
    let shutdown_rx = shutdown_rx.clone();
    info!("Starting health server on {}", web_config.listen);
    Some(tokio::spawn(async move {
        if let Err(e) = run_server(web_config, shutdown_rx).await {
            error!(error = %e, "Health server error");
        }
    }))
}

async fn stop_health_server(handle: Option<JoinHandle<()>>, shutdown_tx: &watch::Sender<bool>) {
    let Some(handle) = handle else {
        return;
    };
    let _ = shutdown_tx.send(true);
    if let Err(e) = handle.await {
        error!(error = %e, "Health server join error");
    }
}

fn video_client(config: &Config) -> Result<Arc<dyn VideoStreamService>, RunError> {
    Ok(Arc::new(HttpVideoStreamClient::new(config.require_video_service()?)?))
}

fn vision_client(config: &Config) -> Result<Arc<dyn VisionService>, RunError> {
    Ok(Arc::new(HttpVisionClient::new(&config.services.vision)?))
}

async fn run_stream_mode(config_path: &Path, start_timestamp: Option<DateTime<Utc>>) -> Result<(), RunError> {
    let config = load(config_path)?;
    let stream_config = config.require_stream()?.clone();
    let (_store, persister) = open_storage(&config).await?;

    let run = StreamRun {
        source_id: stream_config.name.clone(),
        video: video_client(&config)?,
        invoker: AnalysisInvoker::new(vision_client(&config)?, stream_config.analysis.clone()),
        persister,
        limits: StreamLimits {
            list_limit: stream_config.list_limit,
            read_limit: stream_config.read_limit,
        },
        start_timestamp: start_timestamp.or(stream_config.start_timestamp),
        poll_interval: stream_config.poll_interval,
    };

    let (shutdown_tx, shutdown_rx) = watch_ctrl_c();
    let health = spawn_health_server(&config, &shutdown_rx);

    info!(stream = %stream_config.name, "Stream loop started, press Ctrl+C to shutdown");
    let result = run_stream(run, shutdown_rx).await;
    stop_health_server(health, &shutdown_tx).await;

    result?;
    info!("Shutdown complete");
    Ok(())
}

async fn run_processor_mode(config_path: &Path, start_timestamp: Option<DateTime<Utc>>) -> Result<(), RunError> {
    let config = load(config_path)?;
    let processor_config = config.require_processor()?.clone();
    let (_store, persister) = open_storage(&config).await?;

    let run = ProcessorRun {
        source_id: processor_config.name.clone(),
        stream: processor_config.stream.clone(),
        vision: vision_client(&config)?,
        persister,
        start_timestamp: start_timestamp.or(processor_config.start_timestamp),
        poll_interval: processor_config.poll_interval,
    };

    let (shutdown_tx, shutdown_rx) = watch_ctrl_c();
    let health = spawn_health_server(&config, &shutdown_rx);

    info!(processor = %processor_config.name, "Processor loop started, press Ctrl+C to shutdown");
    let result = run_processor(run, shutdown_rx).await;
    stop_health_server(health, &shutdown_tx).await;

    result?;
    info!("Shutdown complete");
    Ok(())
}

async fn run_push_mode(
    config_path: &Path,
    stream: Option<String>,
    source: PushSource,
) -> Result<PushSummary, RunError> {
    let config = load(config_path)?;
    let stream = match stream {
        Some(stream) => stream,
        None => config.require_stream()?.name.clone(),
    };
    let settings = config.push_settings();

    let run = PushRun {
        stream,
        video: video_client(&config)?,
        objects: object_stores(&config)?,
        chunk_size: settings.chunk_size,
        chunk_pause: settings.chunk_pause,
    };

    let (_shutdown_tx, shutdown_rx) = watch_ctrl_c();
    info!(stream = %run.stream, source = ?source, "Push started");
    run_push(run, source, shutdown_rx).await
}

fn object_stores(config: &Config) -> Result<Option<Arc<dyn ObjectStore>>, RunError> {
    Ok(config
        .services
        .objects
        .as_ref()
        .map(object_store_from_config)
        .transpose()?)
}

async fn run_batch_mode(config_path: &Path) -> Result<BatchSummary, RunError> {
    let config = load(config_path)?;
    let batch_config = config.require_batch()?.clone();
    let (store, persister) = open_storage(&config).await?;

    let objects = object_stores(&config)?;

    let run = BatchRun {
        sources: batch_config.sources.clone(),
        sample_interval: batch_config.sample_interval,
        sampler: Arc::new(FfmpegFrameSampler::default()),
        objects,
        invoker: AnalysisInvoker::new(vision_client(&config)?, batch_config.analysis.clone()),
        persister,
        visitors: VisitorTracker::new(
            store,
            config.storage.tables.visitors.clone(),
            batch_config.dwell_per_unit(),
        ),
        identity: identity_from_config(batch_config.visitor_identity),
    };

    let (_shutdown_tx, shutdown_rx) = watch_ctrl_c();
    info!(sources = batch_config.sources.len(), "Batch run started");
    run_batch(run, shutdown_rx).await
}
