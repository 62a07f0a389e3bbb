/// Uploading local files and stored objects into a stream through the fake video service
mod common;

use common::FakeVideo;
use footfall::clients::{LocalObjectStore, MediaPurpose, ObjectStore};
use footfall::pipeline::{run_push, PushRun, PushSource, PushSummary, RunError};
use footfall::source::SourceError;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

fn push_run(video: Arc<FakeVideo>, objects: Option<Arc<dyn ObjectStore>>) -> PushRun {
    PushRun {
        stream: "video-stream-1".to_string(),
        video,
        objects,
        chunk_size: 4,
        chunk_pause: Duration::ZERO,
    }
}

async fn push_once(run: PushRun, source: PushSource) -> Result<PushSummary, RunError> {
    let (_tx, rx) = watch::channel(false);
    run_push(run, source, rx).await
}

#[tokio::test]
async fn test_push_local_file_in_chunks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("video1.mkv");
    fs::write(&path, b"0123456789").unwrap();

    let video = Arc::new(FakeVideo::default());
    let summary = push_once(push_run(video.clone(), None), PushSource::File(path))
        .await
        .unwrap();

    assert_eq!(
        summary,
        PushSummary {
            chunks: 3,
            bytes: 10,
            interrupted: false
        }
    );
    assert_eq!(*video.endpoints.lock().unwrap(), vec![MediaPurpose::PutMedia]);
    let sizes: Vec<usize> = video.uploads.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(video.uploaded(), b"0123456789");
}

#[tokio::test]
async fn test_push_exact_multiple_of_chunk_size() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("video1.mkv");
    fs::write(&path, b"01234567").unwrap();

    let video = Arc::new(FakeVideo::default());
    let summary = push_once(push_run(video.clone(), None), PushSource::File(path))
        .await
        .unwrap();

    assert_eq!(summary.chunks, 2);
    assert_eq!(video.uploaded(), b"01234567");
}

#[tokio::test]
async fn test_push_object_from_store() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("booth-videos/day1")).unwrap();
    fs::write(root.path().join("booth-videos/day1/video1.mkv"), b"remote-bytes").unwrap();

    let video = Arc::new(FakeVideo::default());
    let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(root.path().to_path_buf()));
    let source = PushSource::Object {
        bucket: "booth-videos".to_string(),
        key: "day1/video1.mkv".to_string(),
    };

    let summary = push_once(push_run(video.clone(), Some(objects)), source).await.unwrap();
    assert_eq!(summary.bytes, 12);
    assert_eq!(video.uploaded(), b"remote-bytes");
}

#[tokio::test]
async fn test_push_object_requires_object_store() {
    let video = Arc::new(FakeVideo::default());
    let source = PushSource::Object {
        bucket: "booth-videos".to_string(),
        key: "video1.mkv".to_string(),
    };

    let err = push_once(push_run(video.clone(), None), source).await.unwrap_err();
    assert!(matches!(err, RunError::Config(_)));
    assert!(video.endpoints.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_push_to_unknown_stream() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("video1.mkv");
    fs::write(&path, b"0123").unwrap();

    let video = Arc::new(FakeVideo {
        fail_describe: true,
        ..Default::default()
    });
    let err = push_once(push_run(video.clone(), None), PushSource::File(path))
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Source(SourceError::Setup { .. })));
    assert!(video.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_push_missing_file() {
    let dir = TempDir::new().unwrap();
    let video = Arc::new(FakeVideo::default());

    let err = push_once(push_run(video, None), PushSource::File(dir.path().join("absent.mkv")))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Io(_)));
}

#[tokio::test]
async fn test_push_stops_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("video1.mkv");
    fs::write(&path, b"0123456789").unwrap();

    let video = Arc::new(FakeVideo::default());
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let summary = run_push(push_run(video.clone(), None), PushSource::File(path), rx)
        .await
        .unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.chunks, 0);
    assert!(video.uploads.lock().unwrap().is_empty());
}
