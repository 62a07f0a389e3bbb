pub mod objects;
pub mod video;
pub mod vision;

use crate::source::stream::ResumeDirective;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub use objects::{object_store_from_config, HttpObjectStore, LocalObjectStore, ObjectStore};
pub use video::{
    Fragment, FragmentInfo, HttpVideoStreamClient, MediaEndpoint, MediaPurpose, StreamHandle, VideoStreamService,
};
pub use vision::{DetectionStatus, HttpVisionClient, JobId, ProcessorResults, ProcessorStatus, VisionService};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("service returned error status {status}: {message}")]
    Service { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Turn a non-2xx response into `ClientError::Service`
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(ClientError::Service {
        status: response.status().as_u16(),
        message: response.text().await.unwrap_or_default(),
    })
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Start selector sent to the video and vision gateways
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartSelector {
    pub start_selector_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_fragment_number: Option<String>,
}

impl From<&ResumeDirective> for StartSelector {
    fn from(directive: &ResumeDirective) -> Self {
        match directive {
            ResumeDirective::Now => StartSelector {
                start_selector_type: "NOW",
                start_timestamp: None,
                after_fragment_number: None,
            },
            ResumeDirective::ProducerTimestamp(ts) => StartSelector {
                start_selector_type: "PRODUCER_TIMESTAMP",
                start_timestamp: Some(ts.timestamp_millis() as f64 / 1000.0),
                after_fragment_number: None,
            },
            ResumeDirective::AfterFragment(number) => StartSelector {
                start_selector_type: "FRAGMENT_NUMBER",
                start_timestamp: None,
                after_fragment_number: Some(number.to_string()),
            },
        }
    }
}
