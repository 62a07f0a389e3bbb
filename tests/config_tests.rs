use footfall::config::types::{AnalysisMode, MediaKind, ObjectStoreConfig, VisitorIdentityKind};
use footfall::config::{generate::generate_starter_config, load_config, ConfigError};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.yml");
    fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn test_generated_config_is_valid() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, &generate_starter_config());

    let config = load_config(&config_path).expect("Generated config should be valid");

    assert_eq!(config.storage.tables.cursors, "StreamMetadataTable");
    assert_eq!(config.storage.tables.analytics, "BoothAnalyticsTable");

    let stream = config.require_stream().unwrap();
    assert_eq!(stream.name, "video-stream-1");
    assert_eq!(stream.list_limit, 5);
    assert_eq!(stream.poll_interval, Duration::from_secs(5));
    assert_eq!(stream.analysis.mode, AnalysisMode::FireAndPoll);

    let batch = config.require_batch().unwrap();
    assert_eq!(batch.sources["videos"].kind, MediaKind::Video);
    assert_eq!(batch.sources["images"].extensions(), vec!["jpg".to_string()]);
    assert_eq!(batch.visitor_identity, VisitorIdentityKind::Random);
    assert_eq!(batch.dwell_per_unit(), Duration::from_secs(10));
    assert_eq!(batch.analysis.mode, AnalysisMode::Synchronous);

    assert!(matches!(
        config.services.objects,
        Some(ObjectStoreConfig::Http { .. })
    ));
    assert_eq!(config.require_web().unwrap().listen, "0.0.0.0:5000");
}

#[test]
fn test_minimal_batch_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
storage:
  path: /tmp/footfall-test.duckdb
services:
  vision:
    url: http://localhost:9000
batch:
  sources:
    clips:
      path: /data/clips
      kind: video
"#,
    );

    let config = load_config(&config_path).unwrap();
    assert!(config.stream.is_none());
    assert!(config.require_stream().is_err());
    assert!(config.require_video_service().is_err());

    let batch = config.require_batch().unwrap();
    assert_eq!(batch.sample_interval, Duration::from_secs(10));
    assert_eq!(batch.sources["clips"].extensions(), vec!["mkv".to_string()]);
    assert_eq!(config.storage.tables.visitors, "visitors");
}

#[test]
fn test_env_vars_are_expanded() {
    std::env::set_var("FOOTFALL_TEST_VISION_URL", "http://vision.internal:8080");

    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
storage:
  path: /tmp/footfall-test.duckdb
services:
  vision:
    url: $env{FOOTFALL_TEST_VISION_URL}
    timeout: 5s
"#,
    );

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.services.vision.url, "http://vision.internal:8080");
    assert_eq!(config.services.vision.timeout, Duration::from_secs(5));
}

#[test]
fn test_unset_env_var_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
storage:
  path: /tmp/footfall-test.duckdb
services:
  vision:
    url: $env{FOOTFALL_TEST_SURELY_UNSET_VAR}
"#,
    );

    let err = load_config(&config_path).unwrap_err();
    assert!(err.to_string().contains("FOOTFALL_TEST_SURELY_UNSET_VAR"));
}

#[test]
fn test_objects_require_object_store() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
storage:
  path: /tmp/footfall-test.duckdb
services:
  vision:
    url: http://localhost:9000
batch:
  sources:
    clips:
      path: /data/clips
      kind: video
      objects:
        - bucket: booth-videos
          key: video1.mkv
"#,
    );

    match load_config(&config_path).unwrap_err() {
        ConfigError::Validation(message) => assert!(message.contains("services.objects")),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = load_config(&temp_dir.path().join("absent.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
