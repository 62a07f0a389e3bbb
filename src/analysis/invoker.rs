use super::face::FaceDetail;
use crate::clients::{ClientError, DetectionStatus, JobId, ProcessorResults, ProcessorStatus, VisionService};
use crate::config::types::{AnalysisConfig, AnalysisMode};
use crate::source::ResumeDirective;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("vision service call failed: {0}")]
    Client(#[from] ClientError),

    #[error("detection job {job} failed: {reason}")]
    JobFailed { job: JobId, reason: String },

    #[error("detection job {job} still in progress after {polls} polls")]
    PollLimit { job: JobId, polls: u32 },

    #[error("stream processor '{name}' reported FAILED")]
    ProcessorFailed { name: String },
}

impl AnalysisError {
    /// Whether retrying the same unit can never succeed
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AnalysisError::JobFailed { .. } | AnalysisError::ProcessorFailed { .. }
        )
    }
}

/// Sends one unit's bytes to the vision service in the configured mode
#[derive(Clone)]
pub struct AnalysisInvoker {
    vision: Arc<dyn VisionService>,
    config: AnalysisConfig,
}

impl AnalysisInvoker {
    pub fn new(vision: Arc<dyn VisionService>, config: AnalysisConfig) -> Self {
        Self { vision, config }
    }

    pub fn mode(&self) -> AnalysisMode {
        self.config.mode
    }

    pub async fn analyze(&self, media: &[u8]) -> Result<Vec<FaceDetail>, AnalysisError> {
        match self.config.mode {
            AnalysisMode::Synchronous => Ok(self.vision.detect_faces(media).await?),
            AnalysisMode::FireAndPoll => self.submit_and_poll(media).await,
        }
    }

    async fn submit_and_poll(&self, media: &[u8]) -> Result<Vec<FaceDetail>, AnalysisError> {
        let job = self.vision.submit_detection(media).await?;
        tracing::debug!(job = %job, bytes = media.len(), "Detection job submitted");

        let max_polls = self.config.max_polls.max(1);
        for attempt in 1..=max_polls {
            match self.vision.poll_detection(&job).await? {
                DetectionStatus::Succeeded(faces) => {
                    tracing::debug!(job = %job, faces = faces.len(), attempt, "Detection job succeeded");
                    return Ok(faces);
                }
                DetectionStatus::Failed(reason) => {
                    return Err(AnalysisError::JobFailed { job, reason });
                }
                DetectionStatus::InProgress => {
                    if attempt < max_polls {
                        tokio::time::sleep(self.config.poll_interval).await;
                    }
                }
            }
        }

        Err(AnalysisError::PollLimit {
            job,
            polls: max_polls,
        })
    }
}

/// A named stream processor running inside the vision service
#[derive(Clone)]
pub struct StreamProcessorSession {
    vision: Arc<dyn VisionService>,
    name: String,
}

impl StreamProcessorSession {
    /// Start the processor reading from `directive`
    pub async fn start(
        vision: Arc<dyn VisionService>,
        name: impl Into<String>,
        directive: &ResumeDirective,
    ) -> Result<Self, AnalysisError> {
        let name = name.into();
        vision.start_stream_processor(&name, directive).await?;
        tracing::info!(processor = %name, directive = ?directive, "Stream processor started");
        Ok(Self { vision, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Results produced since the last fetch, or `None` while the processor is
    /// not running yet.
    pub async fn poll(&self) -> Result<Option<ProcessorResults>, AnalysisError> {
        match self.vision.describe_stream_processor(&self.name).await? {
            ProcessorStatus::Running => Ok(Some(self.vision.fetch_stream_results(&self.name).await?)),
            ProcessorStatus::Failed => Err(AnalysisError::ProcessorFailed {
                name: self.name.clone(),
            }),
            status => {
                tracing::info!(processor = %self.name, status = ?status, "Stream processor not running, waiting");
                Ok(None)
            }
        }
    }
}
