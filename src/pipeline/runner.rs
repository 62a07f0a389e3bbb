use super::persist::{PersistError, Persister};
use crate::analysis::{
    AnalysisError, AnalysisInvoker, AnalyticsRecord, StreamProcessorSession, VisitorIdentity, VisitorTracker,
};
use crate::clients::{ClientError, Fragment, ObjectStore, VideoStreamService, VisionService};
use crate::config::types::{DirectorySourceConfig, MediaKind};
use crate::config::ConfigError;
use crate::source::{
    checkpoint_key, sample_offsets, DirectoryEnumerator, FrameError, FrameSampler, ResumeDirective, SourceError,
    StreamEnumerator, StreamLimits,
};
use crate::storage::{Cursor, CursorError, FragmentNumber, StorageError};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Errors that stop a run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("cursor error: {0}")]
    Cursor(#[from] CursorError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("web server error: {0}")]
    WebServer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Nothing to process, waiting for the next poll
    Idle,
    Processing,
}

/// Result of handling one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Persisted,
    /// Retried on the next pass; the cursor did not move
    Transient,
    /// Skipped for good; never recorded in the cursor
    Permanent,
}

impl UnitOutcome {
    fn failure(permanent: bool) -> Self {
        if permanent {
            UnitOutcome::Permanent
        } else {
            UnitOutcome::Transient
        }
    }
}

/// Counters of a polling loop, returned once it shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub persisted: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
}

impl LoopSummary {
    fn count(&mut self, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Persisted => self.persisted += 1,
            UnitOutcome::Transient => self.transient_failures += 1,
            UnitOutcome::Permanent => self.permanent_failures += 1,
        }
    }
}

/// Result of a batch run over every configured directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed_files: u64,
    pub processed_units: u64,
    pub failed_files: u64,
}

struct StateMachine<'a> {
    source_id: &'a str,
    state: LoopState,
}

impl<'a> StateMachine<'a> {
    fn new(source_id: &'a str) -> Self {
        Self {
            source_id,
            state: LoopState::Idle,
        }
    }

    fn enter(&mut self, next: LoopState) {
        if self.state != next {
            debug!(source_id = self.source_id, from = ?self.state, to = ?next, "State transition");
            self.state = next;
        }
    }
}

pub(super) fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep for `interval` unless shutdown is signalled first. Returns true when the loop should stop.
pub(super) async fn pause(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => shutdown_requested(shutdown),
        changed = shutdown.changed() => changed.is_err() || shutdown_requested(shutdown),
    }
}

/// Everything the stream loop needs
pub struct StreamRun {
    /// Stream name; also the cursor's source id
    pub source_id: String,
    pub video: Arc<dyn VideoStreamService>,
    pub invoker: AnalysisInvoker,
    pub persister: Persister,
    pub limits: StreamLimits,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub poll_interval: Duration,
}

/// Poll a video stream until shutdown, analysing and persisting each new fragment.
pub async fn run_stream(run: StreamRun, mut shutdown: watch::Receiver<bool>) -> Result<LoopSummary, RunError> {
    let stored = run.persister.cursors().load(&run.source_id).await?;
    let directive = ResumeDirective::select(run.start_timestamp, stored.as_ref());
    info!(source_id = %run.source_id, directive = ?directive, "Starting stream loop");

    let mut enumerator = StreamEnumerator::open(run.video.clone(), &run.source_id, directive, run.limits).await?;
    let mut state = StateMachine::new(&run.source_id);
    let mut summary = LoopSummary::default();

    while !shutdown_requested(&shutdown) {
        match enumerator.fragment_and_data().await {
            Ok(Some(fragment)) => {
                state.enter(LoopState::Processing);
                let outcome = process_fragment(&run, &fragment).await;
                summary.count(outcome);
                match outcome {
                    UnitOutcome::Persisted => enumerator.mark_processed(&fragment.number),
                    UnitOutcome::Transient => enumerator.retry_later(fragment),
                    UnitOutcome::Permanent => enumerator.skip(&fragment.number),
                }
            }
            Ok(None) => {
                state.enter(LoopState::Idle);
            }
            Err(e) => {
                state.enter(LoopState::Idle);
                warn!(source_id = %run.source_id, error = %e, "Failed to read stream, retrying");
            }
        }

        if pause(&mut shutdown, run.poll_interval).await {
            break;
        }
    }

    info!(
        source_id = %run.source_id,
        persisted = summary.persisted,
        transient = summary.transient_failures,
        permanent = summary.permanent_failures,
        "Stream loop stopped"
    );
    Ok(summary)
}

async fn process_fragment(run: &StreamRun, fragment: &Fragment) -> UnitOutcome {
    debug!(
        source_id = %run.source_id,
        fragment = %fragment.number,
        bytes = fragment.payload.len(),
        "Analysing fragment"
    );

    let faces = match run.invoker.analyze(&fragment.payload).await {
        Ok(faces) => faces,
        Err(e) => {
            let outcome = UnitOutcome::failure(e.is_permanent());
            match outcome {
                UnitOutcome::Permanent => {
                    error!(source_id = %run.source_id, fragment = %fragment.number, error = %e, "Analysis failed permanently")
                }
                _ => warn!(source_id = %run.source_id, fragment = %fragment.number, error = %e, "Analysis failed, will retry"),
            }
            return outcome;
        }
    };

    let timestamp = fragment.producer_timestamp.unwrap_or_else(Utc::now);
    let record = AnalyticsRecord::new(&run.source_id, fragment.number.as_str(), timestamp, &faces)
        .with_video_id(&run.source_id);
    let cursor = Cursor::fragment(&run.source_id, fragment.number.clone(), fragment.producer_timestamp);

    match run.persister.commit(&record, &run.source_id, &cursor).await {
        Ok(()) => {
            info!(
                source_id = %run.source_id,
                fragment = %fragment.number,
                impressions = record.foot_impressions,
                "Fragment processed"
            );
            UnitOutcome::Persisted
        }
        Err(e) => {
            warn!(source_id = %run.source_id, fragment = %fragment.number, error = %e, "Failed to persist, will retry");
            UnitOutcome::Transient
        }
    }
}

/// Everything the stream-processor loop needs
pub struct ProcessorRun {
    /// Processor name; also the cursor's source id
    pub source_id: String,
    /// Stream the processor reads, recorded as the video id
    pub stream: String,
    pub vision: Arc<dyn VisionService>,
    pub persister: Persister,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub poll_interval: Duration,
}

/// Start a named stream processor and persist its results until shutdown. Each
/// fetch whose progress marker lies strictly after the cursor is one unit.
pub async fn run_processor(run: ProcessorRun, mut shutdown: watch::Receiver<bool>) -> Result<LoopSummary, RunError> {
    let stored = run.persister.cursors().load(&run.source_id).await?;
    let directive = ResumeDirective::select(run.start_timestamp, stored.as_ref());
    let mut last: Option<FragmentNumber> = match &directive {
        ResumeDirective::AfterFragment(number) => Some(number.clone()),
        _ => None,
    };

    let session = StreamProcessorSession::start(run.vision.clone(), &run.source_id, &directive).await?;
    let mut state = StateMachine::new(&run.source_id);
    let mut summary = LoopSummary::default();

    while !shutdown_requested(&shutdown) {
        match session.poll().await {
            Ok(Some(results)) => match results.progress {
                Some(progress) if last.as_ref().map_or(true, |l| progress > *l) => {
                    state.enter(LoopState::Processing);
                    let record = AnalyticsRecord::new(&run.source_id, progress.as_str(), Utc::now(), &results.faces)
                        .with_video_id(&run.stream);
                    let cursor = Cursor::fragment(&run.source_id, progress.clone(), None);

                    match run.persister.commit(&record, &run.source_id, &cursor).await {
                        Ok(()) => {
                            info!(
                                source_id = %run.source_id,
                                progress = %progress,
                                impressions = record.foot_impressions,
                                "Processor results persisted"
                            );
                            last = Some(progress);
                            summary.count(UnitOutcome::Persisted);
                        }
                        Err(e) => {
                            warn!(source_id = %run.source_id, error = %e, "Failed to persist processor results");
                            summary.count(UnitOutcome::Transient);
                        }
                    }
                }
                progress => {
                    state.enter(LoopState::Idle);
                    debug!(
                        source_id = %run.source_id,
                        progress = ?progress,
                        faces = results.faces.len(),
                        "No results after the cursor"
                    );
                }
            },
            Ok(None) => state.enter(LoopState::Idle),
            Err(e) => {
                state.enter(LoopState::Idle);
                if e.is_permanent() {
                    error!(source_id = %run.source_id, error = %e, "Stream processor failed");
                    summary.count(UnitOutcome::Permanent);
                } else {
                    warn!(source_id = %run.source_id, error = %e, "Failed to poll stream processor");
                    summary.count(UnitOutcome::Transient);
                }
            }
        }

        if pause(&mut shutdown, run.poll_interval).await {
            break;
        }
    }

    info!(source_id = %run.source_id, persisted = summary.persisted, "Processor loop stopped");
    Ok(summary)
}

/// Everything the batch loop needs
pub struct BatchRun {
    pub sources: BTreeMap<String, DirectorySourceConfig>,
    pub sample_interval: Duration,
    pub sampler: Arc<dyn FrameSampler>,
    pub objects: Option<Arc<dyn ObjectStore>>,
    pub invoker: AnalysisInvoker,
    pub persister: Persister,
    pub visitors: VisitorTracker,
    pub identity: Arc<dyn VisitorIdentity>,
}

#[derive(Debug, Error)]
enum FileError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("interrupted by shutdown")]
    Interrupted,
}

impl FileError {
    fn outcome(&self) -> UnitOutcome {
        match self {
            FileError::Frame(e) => UnitOutcome::failure(e.is_permanent()),
            FileError::Analysis(e) => UnitOutcome::failure(e.is_permanent()),
            _ => UnitOutcome::Transient,
        }
    }
}

/// Process every unprocessed file of every configured directory, then return.
pub async fn run_batch(run: BatchRun, shutdown: watch::Receiver<bool>) -> Result<BatchSummary, RunError> {
    let mut summary = BatchSummary::default();

    for (source_id, source) in &run.sources {
        if shutdown_requested(&shutdown) {
            break;
        }
        run_directory(&run, source_id, source, &shutdown, &mut summary).await?;
    }

    info!(
        processed_files = summary.processed_files,
        processed_units = summary.processed_units,
        failed_files = summary.failed_files,
        "Batch run complete"
    );
    Ok(summary)
}

async fn run_directory(
    run: &BatchRun,
    source_id: &str,
    source: &DirectorySourceConfig,
    shutdown: &watch::Receiver<bool>,
    summary: &mut BatchSummary,
) -> Result<(), RunError> {
    prefetch_objects(run, source_id, source).await;

    let stored = run.persister.cursors().load(source_id).await?;
    let mut processed = match stored.as_ref().map(|c| c.processed_files()) {
        Some(Some(files)) => files.clone(),
        Some(None) => {
            warn!(source_id, "Stored cursor is not a file checkpoint, starting fresh");
            BTreeSet::new()
        }
        None => BTreeSet::new(),
    };

    let enumerator = DirectoryEnumerator::new(&source.path, source.extensions());
    let pending = match enumerator.pending(&processed) {
        Ok(pending) => pending,
        Err(e) => {
            error!(source_id, error = %e, "Cannot list source directory, skipping source");
            return Ok(());
        }
    };
    info!(source_id, path = %source.path.display(), files = pending.len(), "Processing directory");

    let mut state = StateMachine::new(source_id);
    for path in pending {
        if shutdown_requested(shutdown) {
            info!(source_id, "Shutdown requested, stopping batch");
            break;
        }
        state.enter(LoopState::Processing);

        let result = match source.kind {
            MediaKind::Video => process_video(run, source_id, &path, shutdown).await,
            MediaKind::Image => process_image(run, source_id, &path).await,
        };

        match result {
            Ok(units) => {
                processed.insert(checkpoint_key(&path));
                run.persister
                    .advance(source_id, &Cursor::files(source_id, processed.clone()))
                    .await
                    .map_err(|e| match e {
                        PersistError::Cursor(e) => RunError::Cursor(e),
                        PersistError::Record(e) => RunError::Storage(e),
                    })?;
                summary.processed_files += 1;
                summary.processed_units += units;
                info!(source_id, path = %path.display(), units, "File processed");
            }
            Err(FileError::Interrupted) => {
                info!(source_id, path = %path.display(), "File interrupted by shutdown, will resume next run");
                break;
            }
            Err(e) => {
                summary.failed_files += 1;
                match e.outcome() {
                    UnitOutcome::Permanent => {
                        error!(source_id, path = %path.display(), error = %e, "File cannot be processed, skipping")
                    }
                    _ => warn!(source_id, path = %path.display(), error = %e, "File failed, will retry next run"),
                }
            }
        }
    }
    state.enter(LoopState::Idle);

    Ok(())
}

async fn prefetch_objects(run: &BatchRun, source_id: &str, source: &DirectorySourceConfig) {
    if source.objects.is_empty() {
        return;
    }
    let Some(store) = &run.objects else {
        warn!(source_id, "Objects configured but no object store available, skipping download");
        return;
    };

    for object in &source.objects {
        let local = source.path.join(object.file_name());
        if local.exists() {
            debug!(source_id, key = %object.key, "Object already downloaded");
            continue;
        }
        if let Err(e) = store.download_object(&object.bucket, &object.key, &local).await {
            warn!(source_id, bucket = %object.bucket, key = %object.key, error = %e, "Failed to download object");
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

async fn process_video(
    run: &BatchRun,
    source_id: &str,
    path: &Path,
    shutdown: &watch::Receiver<bool>,
) -> Result<u64, FileError> {
    let probe = run.sampler.probe(path).await?;
    let offsets = sample_offsets(&probe, run.sample_interval)?;
    debug!(
        source_id,
        path = %path.display(),
        fps = probe.fps,
        duration_secs = probe.duration_secs,
        samples = offsets.len(),
        "Sampling video"
    );

    let video_id = file_name(path);
    let mut units = 0;
    for offset in offsets {
        if shutdown_requested(shutdown) {
            return Err(FileError::Interrupted);
        }
        let frame = run.sampler.extract_frame(path, offset).await?;
        let unit_id = format!("{}#t={:.3}", checkpoint_key(path), offset);
        analyze_unit(run, source_id, &unit_id, &video_id, &frame).await?;
        units += 1;
    }
    if units == 0 {
        return Err(FrameError::InvalidVideo("no frames were sampled".to_string()).into());
    }
    Ok(units)
}

async fn process_image(run: &BatchRun, source_id: &str, path: &Path) -> Result<u64, FileError> {
    let image = tokio::fs::read(path).await?;
    analyze_unit(run, source_id, &checkpoint_key(path), &file_name(path), &image).await?;
    Ok(1)
}

async fn analyze_unit(
    run: &BatchRun,
    source_id: &str,
    unit_id: &str,
    video_id: &str,
    media: &[u8],
) -> Result<(), FileError> {
    let faces = run.invoker.analyze(media).await?;
    let now = Utc::now();

    let visitor_id = run.identity.identify(&faces);
    let visit = run.visitors.next_visit(&visitor_id, now).await?;

    let record = AnalyticsRecord::new(source_id, unit_id, now, &faces)
        .with_video_id(video_id)
        .with_visit(&visitor_id, visit.visit_count, visit.dwell_time);
    run.persister.write_record(&record).await?;
    // Saved only after the record write succeeds
    run.visitors.save(&visit).await?;

    debug!(source_id, unit_id, faces = faces.len(), visitor_id = %visitor_id, "Unit analysed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        assert_eq!(UnitOutcome::failure(true), UnitOutcome::Permanent);
        assert_eq!(UnitOutcome::failure(false), UnitOutcome::Transient);

        let probe = FileError::Frame(FrameError::InvalidVideo("no video stream".to_string()));
        assert_eq!(probe.outcome(), UnitOutcome::Permanent);

        let io = FileError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.outcome(), UnitOutcome::Transient);
    }

    #[test]
    fn test_loop_summary_counts() {
        let mut summary = LoopSummary::default();
        summary.count(UnitOutcome::Persisted);
        summary.count(UnitOutcome::Persisted);
        summary.count(UnitOutcome::Transient);
        assert_eq!(
            summary,
            LoopSummary {
                persisted: 2,
                transient_failures: 1,
                permanent_failures: 0
            }
        );
    }

    #[tokio::test]
    async fn test_pause_stops_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        assert!(pause(&mut rx, Duration::from_secs(3600)).await);
    }

    #[tokio::test]
    async fn test_pause_elapses() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(!pause(&mut rx, Duration::from_millis(1)).await);
    }
}
