use super::{build_http_client, check_status, join_url, Result, StartSelector};
use crate::analysis::face::{AgeRange, EmotionScore, FaceDetail};
use crate::config::types::ServiceEndpoint;
use crate::source::stream::ResumeDirective;
use crate::storage::FragmentNumber;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a submitted detection job
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionStatus {
    InProgress,
    Succeeded(Vec<FaceDetail>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorStatus {
    Starting,
    Running,
    Stopped,
    Failed,
    Other(String),
}

impl ProcessorStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "STARTING" => ProcessorStatus::Starting,
            "RUNNING" => ProcessorStatus::Running,
            "STOPPED" | "STOPPING" => ProcessorStatus::Stopped,
            "FAILED" => ProcessorStatus::Failed,
            other => ProcessorStatus::Other(other.to_string()),
        }
    }
}

/// Faces a stream processor has produced since the last fetch, with how far it got
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorResults {
    pub faces: Vec<FaceDetail>,
    pub progress: Option<FragmentNumber>,
}

#[async_trait]
pub trait VisionService: Send + Sync {
    /// Analyse one image and wait for the result
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<FaceDetail>>;

    async fn submit_detection(&self, media: &[u8]) -> Result<JobId>;

    async fn poll_detection(&self, job: &JobId) -> Result<DetectionStatus>;

    async fn start_stream_processor(&self, name: &str, directive: &ResumeDirective) -> Result<()>;

    async fn describe_stream_processor(&self, name: &str) -> Result<ProcessorStatus>;

    async fn fetch_stream_results(&self, name: &str) -> Result<ProcessorResults>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FaceWire {
    #[serde(default)]
    age_range: Option<AgeRangeWire>,
    #[serde(default)]
    gender: Option<LabelWire>,
    #[serde(default)]
    emotions: Vec<EmotionWire>,
    #[serde(default)]
    face_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgeRangeWire {
    low: u32,
    high: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LabelWire {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmotionWire {
    #[serde(rename = "Type")]
    label: Option<String>,
    #[serde(default)]
    confidence: f32,
}

impl FaceWire {
    fn into_face(self, timestamp_ms: Option<i64>) -> FaceDetail {
        FaceDetail {
            age_range: self.age_range.map(|a| AgeRange {
                low: a.low,
                high: a.high,
            }),
            gender: self.gender.map(|g| g.value),
            emotions: self
                .emotions
                .into_iter()
                .filter_map(|e| {
                    e.label.map(|label| EmotionScore {
                        label,
                        confidence: e.confidence,
                    })
                })
                .collect(),
            face_id: self.face_id,
            timestamp_ms,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectFacesResponse {
    #[serde(default)]
    face_details: Vec<FaceWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartDetectionResponse {
    job_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct JobRequest<'a> {
    job_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetDetectionResponse {
    job_status: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    faces: Vec<TimedFaceWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TimedFaceWire {
    #[serde(default)]
    timestamp: Option<i64>,
    face: FaceWire,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessorRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartProcessorRequest<'a> {
    name: &'a str,
    start_selector: StartSelector,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeProcessorResponse {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessorResultsResponse {
    #[serde(default)]
    results: Vec<ProcessorFrameWire>,
    #[serde(default)]
    last_fragment_number: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessorFrameWire {
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    faces: Vec<FaceWire>,
}

impl From<ProcessorResultsResponse> for ProcessorResults {
    fn from(response: ProcessorResultsResponse) -> Self {
        let faces = response
            .results
            .into_iter()
            .flat_map(|frame| {
                let ts = frame.timestamp;
                frame.faces.into_iter().map(move |f| f.into_face(ts))
            })
            .collect();

        ProcessorResults {
            faces,
            progress: response.last_fragment_number.map(FragmentNumber::new),
        }
    }
}

/// JSON-over-HTTP client for the face analysis gateway
#[derive(Debug)]
pub struct HttpVisionClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpVisionClient {
    pub fn new(config: &ServiceEndpoint) -> Result<Self> {
        Ok(Self {
            base_url: config.url.clone(),
            client: build_http_client(config.timeout)?,
        })
    }

    async fn post_json<Req: Serialize + ?Sized, Resp: DeserializeOwned>(&self, path: &str, body: &Req) -> Result<Resp> {
        let url = join_url(&self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn post_bytes<Resp: DeserializeOwned>(&self, path: &str, bytes: &[u8]) -> Result<Resp> {
        let url = join_url(&self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VisionService for HttpVisionClient {
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<FaceDetail>> {
        let response: DetectFacesResponse = self.post_bytes("detectFaces", image).await?;
        Ok(response
            .face_details
            .into_iter()
            .map(|f| f.into_face(None))
            .collect())
    }

    async fn submit_detection(&self, media: &[u8]) -> Result<JobId> {
        let response: StartDetectionResponse = self.post_bytes("startFaceDetection", media).await?;
        Ok(JobId(response.job_id))
    }

    async fn poll_detection(&self, job: &JobId) -> Result<DetectionStatus> {
        let response: GetDetectionResponse = self
            .post_json("getFaceDetection", &JobRequest { job_id: &job.0 })
            .await?;
        Ok(detection_status(response))
    }

    async fn start_stream_processor(&self, name: &str, directive: &ResumeDirective) -> Result<()> {
        let _: serde_json::Value = self
            .post_json(
                "startStreamProcessor",
                &StartProcessorRequest {
                    name,
                    start_selector: StartSelector::from(directive),
                },
            )
            .await?;
        Ok(())
    }

    async fn describe_stream_processor(&self, name: &str) -> Result<ProcessorStatus> {
        let response: DescribeProcessorResponse = self
            .post_json("describeStreamProcessor", &ProcessorRequest { name })
            .await?;
        Ok(ProcessorStatus::parse(&response.status))
    }

    async fn fetch_stream_results(&self, name: &str) -> Result<ProcessorResults> {
        let response: ProcessorResultsResponse = self
            .post_json("getStreamProcessorResults", &ProcessorRequest { name })
            .await?;
        Ok(response.into())
    }
}

fn detection_status(response: GetDetectionResponse) -> DetectionStatus {
    match response.job_status.as_str() {
        "SUCCEEDED" => DetectionStatus::Succeeded(
            response
                .faces
                .into_iter()
                .map(|f| f.face.into_face(f.timestamp))
                .collect(),
        ),
        "FAILED" => DetectionStatus::Failed(
            response
                .status_message
                .unwrap_or_else(|| "job failed without a message".to_string()),
        ),
        _ => DetectionStatus::InProgress,
    }
}
