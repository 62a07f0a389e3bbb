//! Hand-written fakes of the external services, shared by the pipeline tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use footfall::analysis::FaceDetail;
use footfall::clients::{
    ClientError, DetectionStatus, Fragment, FragmentInfo, JobId, MediaEndpoint, MediaPurpose, ProcessorResults,
    ProcessorStatus, StreamHandle, VideoStreamService, VisionService,
};
use footfall::pipeline::Persister;
use footfall::source::{FrameError, FrameSampler, ResumeDirective, VideoProbe};
use footfall::storage::duckdb::DuckDbKvStore;
use footfall::storage::{CursorStore, Item, ItemKey, KvStore, StorageError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ClientResult<T> = Result<T, ClientError>;

pub fn fragment(number: &str, producer_timestamp: Option<DateTime<Utc>>) -> Fragment {
    Fragment {
        number: number.into(),
        producer_timestamp,
        payload: format!("fragment-{}", number).into_bytes(),
    }
}

/// Video service over a fixed list of fragments. Reads after a fragment are
/// inclusive of it, so callers must do their own "strictly after" filtering.
#[derive(Default)]
pub struct FakeVideo {
    pub fragments: Mutex<Vec<Fragment>>,
    pub reads: Mutex<Vec<ResumeDirective>>,
    pub listings: AtomicUsize,
    pub fail_describe: bool,
    pub endpoints: Mutex<Vec<MediaPurpose>>,
    pub uploads: Mutex<Vec<Vec<u8>>>,
}

impl FakeVideo {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self {
            fragments: Mutex::new(fragments),
            ..Default::default()
        }
    }

    pub fn first_read(&self) -> Option<ResumeDirective> {
        self.reads.lock().unwrap().first().cloned()
    }

    pub fn uploaded(&self) -> Vec<u8> {
        self.uploads.lock().unwrap().concat()
    }
}

fn unknown_stream(name: &str) -> ClientError {
    ClientError::Service {
        status: 404,
        message: format!("stream {} not found", name),
    }
}

#[async_trait]
impl VideoStreamService for FakeVideo {
    async fn describe_stream(&self, name: &str) -> ClientResult<StreamHandle> {
        if self.fail_describe {
            return Err(unknown_stream(name));
        }
        Ok(StreamHandle {
            name: name.to_string(),
            arn: format!("arn:video:{}", name),
        })
    }

    async fn get_media_endpoint(&self, _stream: &StreamHandle, purpose: MediaPurpose) -> ClientResult<MediaEndpoint> {
        self.endpoints.lock().unwrap().push(purpose);
        Ok(MediaEndpoint {
            url: "http://media.local".to_string(),
        })
    }

    async fn read_fragments(
        &self,
        _endpoint: &MediaEndpoint,
        _stream: &StreamHandle,
        directive: &ResumeDirective,
        max: usize,
    ) -> ClientResult<Vec<Fragment>> {
        self.reads.lock().unwrap().push(directive.clone());
        let fragments = self.fragments.lock().unwrap();
        Ok(fragments
            .iter()
            .filter(|f| match directive {
                ResumeDirective::Now => true,
                ResumeDirective::AfterFragment(number) => f.number >= *number,
                ResumeDirective::ProducerTimestamp(ts) => f.producer_timestamp.map_or(true, |p| p >= *ts),
            })
            .take(max)
            .cloned()
            .collect())
    }

    async fn list_recent_fragments(&self, _stream: &StreamHandle, limit: usize) -> ClientResult<Vec<FragmentInfo>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        let fragments = self.fragments.lock().unwrap();
        Ok(fragments
            .iter()
            .rev()
            .take(limit)
            .map(|f| FragmentInfo {
                number: f.number.clone(),
                producer_timestamp: f.producer_timestamp,
            })
            .collect())
    }

    async fn put_media(&self, _endpoint: &MediaEndpoint, _stream: &StreamHandle, chunk: Vec<u8>) -> ClientResult<()> {
        self.uploads.lock().unwrap().push(chunk);
        Ok(())
    }
}

/// A live stream: every listing makes the next queued fragment arrive, and
/// reading from "now" returns only the newest fragment.
#[derive(Default)]
pub struct LiveVideo {
    pub arrivals: Mutex<VecDeque<Fragment>>,
    pub fragments: Mutex<Vec<Fragment>>,
    pub reads: Mutex<Vec<ResumeDirective>>,
}

impl LiveVideo {
    pub fn new(arrivals: Vec<Fragment>) -> Self {
        Self {
            arrivals: Mutex::new(arrivals.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl VideoStreamService for LiveVideo {
    async fn describe_stream(&self, name: &str) -> ClientResult<StreamHandle> {
        Ok(StreamHandle {
            name: name.to_string(),
            arn: format!("arn:video:{}", name),
        })
    }

    async fn get_media_endpoint(&self, _stream: &StreamHandle, _purpose: MediaPurpose) -> ClientResult<MediaEndpoint> {
        Ok(MediaEndpoint {
            url: "http://media.local".to_string(),
        })
    }

    async fn read_fragments(
        &self,
        _endpoint: &MediaEndpoint,
        _stream: &StreamHandle,
        directive: &ResumeDirective,
        max: usize,
    ) -> ClientResult<Vec<Fragment>> {
        self.reads.lock().unwrap().push(directive.clone());
        let fragments = self.fragments.lock().unwrap();
        Ok(match directive {
            ResumeDirective::Now => fragments.last().cloned().into_iter().collect(),
            ResumeDirective::AfterFragment(number) => fragments
                .iter()
                .filter(|f| f.number >= *number)
                .take(max)
                .cloned()
                .collect(),
            ResumeDirective::ProducerTimestamp(ts) => fragments
                .iter()
                .filter(|f| f.producer_timestamp.map_or(true, |p| p >= *ts))
                .take(max)
                .cloned()
                .collect(),
        })
    }

    async fn list_recent_fragments(&self, _stream: &StreamHandle, limit: usize) -> ClientResult<Vec<FragmentInfo>> {
        let mut fragments = self.fragments.lock().unwrap();
        if let Some(next) = self.arrivals.lock().unwrap().pop_front() {
            fragments.push(next);
        }
        Ok(fragments
            .iter()
            .rev()
            .take(limit)
            .map(|f| FragmentInfo {
                number: f.number.clone(),
                producer_timestamp: f.producer_timestamp,
            })
            .collect())
    }

    async fn put_media(&self, _endpoint: &MediaEndpoint, _stream: &StreamHandle, _chunk: Vec<u8>) -> ClientResult<()> {
        Ok(())
    }
}

/// Vision service answering every request with the same faces
#[derive(Default)]
pub struct FakeVision {
    pub faces: Vec<FaceDetail>,
    pub calls: AtomicUsize,
    /// Number of upcoming detection calls that fail with a 503
    pub transient_failures: AtomicUsize,
    /// Fetched one per poll while the processor reports RUNNING
    pub processor_results: Mutex<VecDeque<ProcessorResults>>,
    pub processor_failed: bool,
    pub started_with: Mutex<Option<ResumeDirective>>,
    /// Payloads whose detection jobs end in FAILED
    pub failing_media: Mutex<HashSet<Vec<u8>>>,
    pub submitted: Mutex<Vec<Vec<u8>>>,
}

impl FakeVision {
    pub fn with_faces(faces: Vec<FaceDetail>) -> Self {
        Self {
            faces,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self) -> ClientResult<Vec<FaceDetail>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(ClientError::Service {
                status: 503,
                message: "throttled".to_string(),
            });
        }
        Ok(self.faces.clone())
    }
}

#[async_trait]
impl VisionService for FakeVision {
    async fn detect_faces(&self, _image: &[u8]) -> ClientResult<Vec<FaceDetail>> {
        self.answer()
    }

    async fn submit_detection(&self, media: &[u8]) -> ClientResult<JobId> {
        self.answer()?;
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(media.to_vec());
        Ok(JobId(format!("job-{}", submitted.len() - 1)))
    }

    async fn poll_detection(&self, job: &JobId) -> ClientResult<DetectionStatus> {
        let index: usize = job.0.trim_start_matches("job-").parse().unwrap();
        let media = self.submitted.lock().unwrap()[index].clone();
        if self.failing_media.lock().unwrap().contains(&media) {
            return Ok(DetectionStatus::Failed("unsupported codec".to_string()));
        }
        Ok(DetectionStatus::Succeeded(self.faces.clone()))
    }

    async fn start_stream_processor(&self, _name: &str, directive: &ResumeDirective) -> ClientResult<()> {
        *self.started_with.lock().unwrap() = Some(directive.clone());
        Ok(())
    }

    async fn describe_stream_processor(&self, _name: &str) -> ClientResult<ProcessorStatus> {
        if self.processor_failed {
            return Ok(ProcessorStatus::Failed);
        }
        if self.processor_results.lock().unwrap().is_empty() {
            Ok(ProcessorStatus::Starting)
        } else {
            Ok(ProcessorStatus::Running)
        }
    }

    async fn fetch_stream_results(&self, _name: &str) -> ClientResult<ProcessorResults> {
        Ok(self
            .processor_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

/// Every video is 25s at 30fps. Files whose name starts with "bad" have no
/// video stream, files starting with "empty" report a zero duration.
#[derive(Default)]
pub struct FakeSampler {
    pub extracted: AtomicUsize,
}

#[async_trait]
impl FrameSampler for FakeSampler {
    async fn probe(&self, path: &Path) -> Result<VideoProbe, FrameError> {
        let name = path.file_name().unwrap().to_string_lossy();
        if name.starts_with("bad") {
            return Err(FrameError::InvalidVideo("no video stream found".to_string()));
        }
        let duration_secs = if name.starts_with("empty") { 0.0 } else { 25.0 };
        Ok(VideoProbe {
            duration_secs,
            fps: 30.0,
        })
    }

    async fn extract_frame(&self, _path: &Path, offset_secs: f64) -> Result<Vec<u8>, FrameError> {
        self.extracted.fetch_add(1, Ordering::SeqCst);
        Ok(format!("frame@{}", offset_secs).into_bytes())
    }
}

/// DuckDB store that counts writes per table and can refuse writes to one table
pub struct TestStore {
    inner: DuckDbKvStore,
    pub refused_table: Option<&'static str>,
    puts: Mutex<HashMap<String, usize>>,
}

impl TestStore {
    pub async fn new() -> Arc<Self> {
        Self::refusing(None).await
    }

    pub async fn refusing(refused_table: Option<&'static str>) -> Arc<Self> {
        let inner = DuckDbKvStore::in_memory().unwrap();
        inner.init_schema().await.unwrap();
        Arc::new(Self {
            inner,
            refused_table,
            puts: Mutex::new(HashMap::new()),
        })
    }

    pub fn puts(&self, table: &str) -> usize {
        self.puts.lock().unwrap().get(table).copied().unwrap_or(0)
    }
}

#[async_trait]
impl KvStore for TestStore {
    async fn init_schema(&self) -> Result<(), StorageError> {
        self.inner.init_schema().await
    }

    async fn get_item(&self, table: &str, key: &ItemKey) -> Result<Option<Item>, StorageError> {
        self.inner.get_item(table, key).await
    }

    async fn put_item(&self, table: &str, key: &ItemKey, body: &serde_json::Value) -> Result<(), StorageError> {
        if self.refused_table == Some(table) {
            return Err(StorageError::Database("disk full".to_string()));
        }
        self.inner.put_item(table, key, body).await?;
        *self.puts.lock().unwrap().entry(table.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn query(&self, table: &str, partition: &str) -> Result<Vec<Item>, StorageError> {
        self.inner.query(table, partition).await
    }
}

pub fn persister(store: Arc<TestStore>) -> Persister {
    let store: Arc<dyn KvStore> = store;
    Persister::new(store.clone(), "analytics", CursorStore::new(store, "cursors"))
}

/// Poll `condition` every 10ms for up to 5s
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}
