use super::parse::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub services: ServicesConfig,
    #[serde(default)]
    pub stream: Option<StreamConfig>,
    #[serde(default)]
    pub processor: Option<ProcessorConfig>,
    #[serde(default)]
    pub batch: Option<BatchConfig>,
    #[serde(default)]
    pub push: Option<PushConfig>,
    #[serde(default)]
    pub web: Option<WebConfig>,
}

impl Config {
    pub fn require_stream(&self) -> Result<&StreamConfig, ConfigError> {
        self.stream
            .as_ref()
            .ok_or_else(|| ConfigError::Validation("'stream' section is required for stream mode".to_string()))
    }

    pub fn require_processor(&self) -> Result<&ProcessorConfig, ConfigError> {
        self.processor.as_ref().ok_or_else(|| {
            ConfigError::Validation("'processor' section is required for processor mode".to_string())
        })
    }

    pub fn require_batch(&self) -> Result<&BatchConfig, ConfigError> {
        self.batch
            .as_ref()
            .ok_or_else(|| ConfigError::Validation("'batch' section is required for batch mode".to_string()))
    }

    pub fn require_video_service(&self) -> Result<&ServiceEndpoint, ConfigError> {
        self.services.video.as_ref().ok_or_else(|| {
            ConfigError::Validation("'services.video' is required to read video streams".to_string())
        })
    }

    /// Upload settings, falling back to defaults when `push` is absent
    pub fn push_settings(&self) -> PushConfig {
        self.push.clone().unwrap_or_default()
    }

    pub fn require_web(&self) -> Result<&WebConfig, ConfigError> {
        self.web
            .as_ref()
            .ok_or_else(|| ConfigError::Validation("'web' section is required to serve health checks".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub tables: TableNames,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNames {
    #[serde(default = "default_cursor_table")]
    pub cursors: String,
    #[serde(default = "default_analytics_table")]
    pub analytics: String,
    #[serde(default = "default_visitor_table")]
    pub visitors: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            cursors: default_cursor_table(),
            analytics: default_analytics_table(),
            visitors: default_visitor_table(),
        }
    }
}

fn default_cursor_table() -> String {
    "cursors".to_string()
}

fn default_analytics_table() -> String {
    "analytics".to_string()
}

fn default_visitor_table() -> String {
    "visitors".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub video: Option<ServiceEndpoint>,
    pub vision: ServiceEndpoint,
    #[serde(default)]
    pub objects: Option<ObjectStoreConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub url: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ObjectStoreConfig {
    Http {
        url: String,
        #[serde(with = "humantime_serde", default = "default_timeout")]
        timeout: Duration,
    },
    Local {
        root: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    /// Overrides any stored cursor when set
    #[serde(default)]
    pub start_timestamp: Option<DateTime<Utc>>,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    #[serde(default = "default_read_limit")]
    pub read_limit: usize,
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    #[serde(default = "default_stream_analysis")]
    pub analysis: AnalysisConfig,
}

fn default_list_limit() -> usize {
    5
}

fn default_read_limit() -> usize {
    10
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_mode")]
    pub mode: AnalysisMode,
    /// Interval between job status polls in fire-and-poll mode
    #[serde(with = "humantime_serde", default = "default_job_poll_interval")]
    pub poll_interval: Duration,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

fn default_analysis_mode() -> AnalysisMode {
    AnalysisMode::FireAndPoll
}

fn default_job_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_max_polls() -> u32 {
    30
}

fn default_stream_analysis() -> AnalysisConfig {
    AnalysisConfig {
        mode: AnalysisMode::FireAndPoll,
        poll_interval: default_job_poll_interval(),
        max_polls: default_max_polls(),
    }
}

fn default_batch_analysis() -> AnalysisConfig {
    AnalysisConfig {
        mode: AnalysisMode::Synchronous,
        poll_interval: default_job_poll_interval(),
        max_polls: default_max_polls(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Synchronous,
    FireAndPoll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub name: String,
    /// Stream the processor reads from; also the cursor's source id
    pub stream: String,
    #[serde(default)]
    pub start_timestamp: Option<DateTime<Utc>>,
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub sources: BTreeMap<String, DirectorySourceConfig>,
    /// One video frame is sampled per interval
    #[serde(with = "humantime_serde", default = "default_sample_interval")]
    pub sample_interval: Duration,
    /// Dwell time credited to a visitor per analysed unit; defaults to `sample_interval`
    #[serde(with = "humantime_serde", default)]
    pub dwell_per_unit: Option<Duration>,
    #[serde(default)]
    pub visitor_identity: VisitorIdentityKind,
    #[serde(default = "default_batch_analysis")]
    pub analysis: AnalysisConfig,
}

impl BatchConfig {
    pub fn dwell_per_unit(&self) -> Duration {
        self.dwell_per_unit.unwrap_or(self.sample_interval)
    }
}

fn default_sample_interval() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitorIdentityKind {
    /// Fresh identifier per analysed unit
    #[default]
    Random,
    /// Identifier derived from the face id reported by the vision service
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySourceConfig {
    pub path: PathBuf,
    pub kind: MediaKind,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    /// Objects downloaded into `path` before the directory is listed
    #[serde(default)]
    pub objects: Vec<ObjectRef>,
}

impl DirectorySourceConfig {
    pub fn extensions(&self) -> Vec<String> {
        match &self.extensions {
            Some(exts) => exts
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            None => self.kind.default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    pub fn default_extensions(self) -> Vec<String> {
        match self {
            MediaKind::Video => vec!["mkv".to_string()],
            MediaKind::Image => vec!["jpg".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    /// Name of the local file the object is downloaded to: the key's last segment
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    /// Bytes sent per upload request
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(with = "humantime_serde", default = "default_chunk_pause")]
    pub chunk_pause: Duration,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_pause: default_chunk_pause(),
        }
    }
}

fn default_chunk_size() -> usize {
    1024 * 1024
}

fn default_chunk_pause() -> Duration {
    Duration::from_millis(100)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub listen: String,
}
