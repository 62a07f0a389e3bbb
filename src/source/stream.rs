use super::SourceError;
use crate::clients::{Fragment, MediaEndpoint, MediaPurpose, StreamHandle, VideoStreamService};
use crate::storage::{Cursor, FragmentNumber};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;

/// Where the next read of a stream starts
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeDirective {
    Now,
    ProducerTimestamp(DateTime<Utc>),
    /// Strictly after this fragment
    AfterFragment(FragmentNumber),
}

impl ResumeDirective {
    /// An explicit timestamp wins over a stored fragment cursor, which wins over "now".
    pub fn select(explicit_timestamp: Option<DateTime<Utc>>, stored: Option<&Cursor>) -> Self {
        if let Some(ts) = explicit_timestamp {
            return ResumeDirective::ProducerTimestamp(ts);
        }
        match stored.and_then(Cursor::fragment_number) {
            Some(number) => ResumeDirective::AfterFragment(number.clone()),
            None => ResumeDirective::Now,
        }
    }
}

/// Limits applied to each poll of the stream
#[derive(Debug, Clone, Copy)]
pub struct StreamLimits {
    /// Fragments requested from `list_recent_fragments`
    pub list_limit: usize,
    /// Fragments requested per read
    pub read_limit: usize,
}

/// Yields fragments of one stream in arrival order, never one at or before
/// the last processed fragment.
pub struct StreamEnumerator {
    video: Arc<dyn VideoStreamService>,
    stream: StreamHandle,
    endpoint: MediaEndpoint,
    directive: ResumeDirective,
    last_processed: Option<FragmentNumber>,
    pending: VecDeque<Fragment>,
    limits: StreamLimits,
}

impl StreamEnumerator {
    /// Resolve the stream and its media endpoint. Failure here is fatal to the run.
    pub async fn open(
        video: Arc<dyn VideoStreamService>,
        stream_name: &str,
        directive: ResumeDirective,
        limits: StreamLimits,
    ) -> Result<Self, SourceError> {
        let stream = video
            .describe_stream(stream_name)
            .await
            .map_err(|source| SourceError::Setup {
                stream: stream_name.to_string(),
                source,
            })?;
        tracing::info!(stream = %stream.name, arn = %stream.arn, "Resolved stream");

        let endpoint = video
            .get_media_endpoint(&stream, MediaPurpose::GetMedia)
            .await
            .map_err(|source| SourceError::Setup {
                stream: stream_name.to_string(),
                source,
            })?;
        tracing::info!(stream = %stream.name, endpoint = %endpoint.url, "Resolved media endpoint");

        let last_processed = match &directive {
            ResumeDirective::AfterFragment(number) => Some(number.clone()),
            _ => None,
        };

        Ok(Self {
            video,
            stream,
            endpoint,
            directive,
            last_processed,
            pending: VecDeque::new(),
            limits,
        })
    }

    pub fn stream(&self) -> &StreamHandle {
        &self.stream
    }

    pub fn directive(&self) -> &ResumeDirective {
        &self.directive
    }

    pub fn last_processed(&self) -> Option<&FragmentNumber> {
        self.last_processed.as_ref()
    }

    /// Next fragment to process, or `None` when the stream has nothing new yet.
    pub async fn fragment_and_data(&mut self) -> Result<Option<Fragment>, SourceError> {
        if let Some(fragment) = self.pending.pop_front() {
            return Ok(Some(fragment));
        }

        let recent = self
            .video
            .list_recent_fragments(&self.stream, self.limits.list_limit)
            .await?;
        if recent.is_empty() {
            tracing::debug!(stream = %self.stream.name, "No fragments found");
            return Ok(None);
        }

        tracing::debug!(stream = %self.stream.name, directive = ?self.directive, "Reading fragments");
        let fragments = self
            .video
            .read_fragments(&self.endpoint, &self.stream, &self.directive, self.limits.read_limit)
            .await?;

        let last = self.last_processed.clone();
        self.pending.extend(
            fragments
                .into_iter()
                .filter(|f| last.as_ref().map_or(true, |last| f.number > *last)),
        );

        Ok(self.pending.pop_front())
    }

    /// Record that `number` was persisted; the next read starts strictly after it.
    pub fn mark_processed(&mut self, number: &FragmentNumber) {
        self.move_past(number);
    }

    /// Move past a fragment that can never succeed, without it counting as persisted.
    pub fn skip(&mut self, number: &FragmentNumber) {
        tracing::warn!(stream = %self.stream.name, fragment = %number, "Skipping fragment");
        self.move_past(number);
    }

    /// Hand back a fragment that failed transiently; it is the next one yielded.
    pub fn retry_later(&mut self, fragment: Fragment) {
        tracing::debug!(stream = %self.stream.name, fragment = %fragment.number, "Fragment queued for retry");
        self.pending.push_front(fragment);
    }

    fn move_past(&mut self, number: &FragmentNumber) {
        if self.last_processed.as_ref().map_or(true, |last| number > last) {
            self.last_processed = Some(number.clone());
            self.directive = ResumeDirective::AfterFragment(number.clone());
        }
        let last = number.clone();
        self.pending.retain(|f| f.number > last);
    }
}
