use super::{build_http_client, check_status, join_url, ClientError, Result, StartSelector};
use crate::config::types::ServiceEndpoint;
use crate::source::stream::ResumeDirective;
use crate::storage::FragmentNumber;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A resolved stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub name: String,
    pub arn: String,
}

/// Data-plane endpoint for reading or writing a stream's media
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEndpoint {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPurpose {
    GetMedia,
    GetMediaForFragmentList,
    PutMedia,
}

impl MediaPurpose {
    pub fn api_name(self) -> &'static str {
        match self {
            MediaPurpose::GetMedia => "GET_MEDIA",
            MediaPurpose::GetMediaForFragmentList => "GET_MEDIA_FOR_FRAGMENT_LIST",
            MediaPurpose::PutMedia => "PUT_MEDIA",
        }
    }
}

/// Fragment metadata without payload
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentInfo {
    pub number: FragmentNumber,
    pub producer_timestamp: Option<DateTime<Utc>>,
}

/// One fragment of video with its payload
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub number: FragmentNumber,
    pub producer_timestamp: Option<DateTime<Utc>>,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait VideoStreamService: Send + Sync {
    async fn describe_stream(&self, name: &str) -> Result<StreamHandle>;

    async fn get_media_endpoint(&self, stream: &StreamHandle, purpose: MediaPurpose) -> Result<MediaEndpoint>;

    /// Fragments from the directive's position, in arrival order
    async fn read_fragments(
        &self,
        endpoint: &MediaEndpoint,
        stream: &StreamHandle,
        directive: &ResumeDirective,
        max: usize,
    ) -> Result<Vec<Fragment>>;

    async fn list_recent_fragments(&self, stream: &StreamHandle, limit: usize) -> Result<Vec<FragmentInfo>>;

    /// Append one chunk of raw media to the stream through a `PutMedia` endpoint
    async fn put_media(&self, endpoint: &MediaEndpoint, stream: &StreamHandle, chunk: Vec<u8>) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStreamRequest<'a> {
    stream_name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStreamResponse {
    stream_info: StreamInfoWire,
}

#[derive(Deserialize)]
struct StreamInfoWire {
    #[serde(rename = "StreamName")]
    stream_name: String,
    #[serde(rename = "StreamARN")]
    stream_arn: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DataEndpointRequest<'a> {
    stream_name: &'a str,
    #[serde(rename = "APIName")]
    api_name: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DataEndpointResponse {
    data_endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetMediaRequest<'a> {
    stream_name: &'a str,
    start_selector: StartSelector,
    max_fragments: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetFragmentRequest<'a> {
    stream_name: &'a str,
    fragment_number: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListFragmentsRequest<'a> {
    stream_name: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FragmentsResponse {
    #[serde(default)]
    fragments: Vec<FragmentWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FragmentWire {
    fragment_number: String,
    /// Epoch milliseconds
    #[serde(default)]
    producer_timestamp: Option<i64>,
}

impl From<FragmentWire> for FragmentInfo {
    fn from(wire: FragmentWire) -> Self {
        FragmentInfo {
            number: FragmentNumber::new(wire.fragment_number),
            producer_timestamp: wire.producer_timestamp.and_then(DateTime::from_timestamp_millis),
        }
    }
}

/// JSON-over-HTTP client for the video stream gateway
#[derive(Debug)]
pub struct HttpVideoStreamClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpVideoStreamClient {
    pub fn new(config: &ServiceEndpoint) -> Result<Self> {
        Ok(Self {
            base_url: config.url.clone(),
            client: build_http_client(config.timeout)?,
        })
    }

    async fn post_json<Req: Serialize + ?Sized, Resp: DeserializeOwned>(
        &self,
        url: String,
        body: &Req,
    ) -> Result<Resp> {
        let response = self.client.post(&url).json(body).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn fetch_payload(&self, endpoint: &MediaEndpoint, stream: &StreamHandle, number: &str) -> Result<Vec<u8>> {
        let url = join_url(&endpoint.url, "getMediaForFragment");
        let request = GetFragmentRequest {
            stream_name: &stream.name,
            fragment_number: number,
        };
        let response = self.client.post(&url).json(&request).send().await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl VideoStreamService for HttpVideoStreamClient {
    async fn describe_stream(&self, name: &str) -> Result<StreamHandle> {
        let response: DescribeStreamResponse = self
            .post_json(
                join_url(&self.base_url, "describeStream"),
                &DescribeStreamRequest { stream_name: name },
            )
            .await?;

        if response.stream_info.stream_arn.is_empty() {
            return Err(ClientError::InvalidResponse(format!("stream '{}' has no ARN", name)));
        }

        Ok(StreamHandle {
            name: response.stream_info.stream_name,
            arn: response.stream_info.stream_arn,
        })
    }

    async fn get_media_endpoint(&self, stream: &StreamHandle, purpose: MediaPurpose) -> Result<MediaEndpoint> {
        let response: DataEndpointResponse = self
            .post_json(
                join_url(&self.base_url, "getDataEndpoint"),
                &DataEndpointRequest {
                    stream_name: &stream.name,
                    api_name: purpose.api_name(),
                },
            )
            .await?;

        Ok(MediaEndpoint {
            url: response.data_endpoint,
        })
    }

    async fn read_fragments(
        &self,
        endpoint: &MediaEndpoint,
        stream: &StreamHandle,
        directive: &ResumeDirective,
        max: usize,
    ) -> Result<Vec<Fragment>> {
        let listing: FragmentsResponse = self
            .post_json(
                join_url(&endpoint.url, "getMedia"),
                &GetMediaRequest {
                    stream_name: &stream.name,
                    start_selector: StartSelector::from(directive),
                    max_fragments: max,
                },
            )
            .await?;

        let mut fragments = Vec::with_capacity(listing.fragments.len());
        for wire in listing.fragments {
            let payload = self.fetch_payload(endpoint, stream, &wire.fragment_number).await?;
            let info = FragmentInfo::from(wire);
            fragments.push(Fragment {
                number: info.number,
                producer_timestamp: info.producer_timestamp,
                payload,
            });
        }

        Ok(fragments)
    }

    async fn list_recent_fragments(&self, stream: &StreamHandle, limit: usize) -> Result<Vec<FragmentInfo>> {
        let response: FragmentsResponse = self
            .post_json(
                join_url(&self.base_url, "listFragments"),
                &ListFragmentsRequest {
                    stream_name: &stream.name,
                    max_results: limit,
                },
            )
            .await?;

        Ok(response.fragments.into_iter().map(FragmentInfo::from).collect())
    }

    async fn put_media(&self, endpoint: &MediaEndpoint, stream: &StreamHandle, chunk: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .put(join_url(&endpoint.url, "putMedia"))
            .query(&[("StreamName", stream.name.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(chunk)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
