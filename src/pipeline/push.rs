//! Uploading recorded video into a stream, one chunk per request.

use super::runner::{pause, shutdown_requested, RunError};
use crate::clients::{ClientError, MediaEndpoint, MediaPurpose, ObjectStore, StreamHandle, VideoStreamService};
use crate::config::ConfigError;
use crate::source::SourceError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where the uploaded media comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushSource {
    File(PathBuf),
    /// Downloaded to a temporary file first, removed once uploaded
    Object { bucket: String, key: String },
}

pub struct PushRun {
    pub stream: String,
    pub video: Arc<dyn VideoStreamService>,
    pub objects: Option<Arc<dyn ObjectStore>>,
    pub chunk_size: usize,
    pub chunk_pause: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    pub chunks: u64,
    pub bytes: u64,
    /// Shutdown stopped the upload before the end of the media
    pub interrupted: bool,
}

/// Upload `source` into the stream. A failed chunk aborts the upload.
pub async fn run_push(run: PushRun, source: PushSource, shutdown: watch::Receiver<bool>) -> Result<PushSummary, RunError> {
    if let PushSource::Object { .. } = &source {
        object_store(&run)?;
    }

    let setup = |source: ClientError| SourceError::Setup {
        stream: run.stream.clone(),
        source,
    };
    let stream = run.video.describe_stream(&run.stream).await.map_err(setup)?;
    let endpoint = run
        .video
        .get_media_endpoint(&stream, MediaPurpose::PutMedia)
        .await
        .map_err(setup)?;
    info!(stream = %stream.name, endpoint = %endpoint.url, "Resolved put-media endpoint");

    let summary = match &source {
        PushSource::File(path) => upload_file(&run, &stream, &endpoint, path, shutdown).await?,
        PushSource::Object { bucket, key } => {
            let staged = std::env::temp_dir().join(format!("footfall-push-{}", Uuid::new_v4()));
            object_store(&run)?.download_object(bucket, key, &staged).await?;
            let result = upload_file(&run, &stream, &endpoint, &staged, shutdown).await;
            if let Err(e) = tokio::fs::remove_file(&staged).await {
                warn!(path = %staged.display(), error = %e, "Failed to remove staged object");
            }
            result?
        }
    };

    if summary.interrupted {
        warn!(stream = %stream.name, chunks = summary.chunks, bytes = summary.bytes, "Upload interrupted by shutdown");
    } else {
        info!(stream = %stream.name, chunks = summary.chunks, bytes = summary.bytes, "Upload complete");
    }
    Ok(summary)
}

fn object_store(run: &PushRun) -> Result<&Arc<dyn ObjectStore>, ConfigError> {
    run.objects
        .as_ref()
        .ok_or_else(|| ConfigError::Validation("'services.objects' is required to push an object".to_string()))
}

async fn upload_file(
    run: &PushRun,
    stream: &StreamHandle,
    endpoint: &MediaEndpoint,
    path: &Path,
    mut shutdown: watch::Receiver<bool>,
) -> Result<PushSummary, RunError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut summary = PushSummary::default();

    loop {
        if shutdown_requested(&shutdown) {
            summary.interrupted = true;
            break;
        }

        let mut chunk = Vec::with_capacity(run.chunk_size);
        (&mut file).take(run.chunk_size as u64).read_to_end(&mut chunk).await?;
        if chunk.is_empty() {
            break;
        }

        let len = chunk.len() as u64;
        run.video.put_media(endpoint, stream, chunk).await?;
        summary.chunks += 1;
        summary.bytes += len;
        debug!(stream = %stream.name, chunk = summary.chunks, bytes = len, "Chunk uploaded");

        if len < run.chunk_size as u64 {
            break;
        }
        if pause(&mut shutdown, run.chunk_pause).await {
            summary.interrupted = true;
            break;
        }
    }

    Ok(summary)
}
