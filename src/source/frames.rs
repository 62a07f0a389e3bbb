//! Frame sampling from recorded video files via ffprobe/ffmpeg.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffprobe output could not be parsed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ffprobe failed for {path}: {stderr}")]
    ProbeFailed { path: PathBuf, stderr: String },

    #[error("ffmpeg could not extract a frame at {offset_secs:.3}s from {path}: {stderr}")]
    ExtractFailed {
        path: PathBuf,
        offset_secs: f64,
        stderr: String,
    },

    #[error("invalid video: {0}")]
    InvalidVideo(String),
}

impl FrameError {
    /// Whether retrying the same file can never succeed
    pub fn is_permanent(&self) -> bool {
        !matches!(self, FrameError::Io(_))
    }
}

/// Duration and frame rate of a video file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    pub duration_secs: f64,
    pub fps: f64,
}

#[async_trait]
pub trait FrameSampler: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<VideoProbe, FrameError>;

    /// Encoded JPEG of the frame at `offset_secs`
    async fn extract_frame(&self, path: &Path, offset_secs: f64) -> Result<Vec<u8>, FrameError>;
}

/// Offsets (seconds) of every sampled frame: one frame every `round(fps) * interval`
/// frames, starting with the first. Never empty for a video that can be sampled.
pub fn sample_offsets(probe: &VideoProbe, interval: Duration) -> Result<Vec<f64>, FrameError> {
    let fps = probe.fps.round();
    if !fps.is_finite() || fps < 1.0 {
        return Err(FrameError::InvalidVideo(format!(
            "unusable frame rate {}",
            probe.fps
        )));
    }
    if !probe.duration_secs.is_finite() || probe.duration_secs <= 0.0 {
        return Err(FrameError::InvalidVideo(format!(
            "unusable duration {}",
            probe.duration_secs
        )));
    }

    let interval_secs = interval.as_secs().max(1);
    let step = fps as u64 * interval_secs;
    // A clip shorter than one frame period still has its first frame
    let total_frames = ((probe.duration_secs * probe.fps).floor() as u64).max(1);

    Ok((0..total_frames)
        .step_by(step as usize)
        .map(|index| index as f64 / probe.fps)
        .collect())
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

fn parse_duration(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

fn parse_probe(raw: &[u8]) -> Result<VideoProbe, FrameError> {
    let probe: FfprobeOutput = serde_json::from_slice(raw)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| FrameError::InvalidVideo("no video stream found".to_string()))?;

    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .filter(|f| *f > 0.0)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| FrameError::InvalidVideo("no frame rate reported".to_string()))?;

    let duration_secs = parse_duration(probe.format.duration.as_deref())
        .or_else(|| parse_duration(video.duration.as_deref()))
        .ok_or_else(|| FrameError::InvalidVideo("no duration reported".to_string()))?;

    Ok(VideoProbe { duration_secs, fps })
}

/// Samples frames by shelling out to `ffprobe` and `ffmpeg`
#[derive(Debug, Clone)]
pub struct FfmpegFrameSampler {
    ffprobe: PathBuf,
    ffmpeg: PathBuf,
}

impl Default for FfmpegFrameSampler {
    fn default() -> Self {
        Self {
            ffprobe: PathBuf::from("ffprobe"),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegFrameSampler {
    pub fn new(ffprobe: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
        }
    }
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler {
    async fn probe(&self, path: &Path) -> Result<VideoProbe, FrameError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(FrameError::ProbeFailed {
                path: path.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_probe(&output.stdout)
    }

    async fn extract_frame(&self, path: &Path, offset_secs: f64) -> Result<Vec<u8>, FrameError> {
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss", &format!("{:.3}", offset_secs), "-i"])
            .arg(path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "mjpeg", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(FrameError::ExtractFailed {
                path: path.to_path_buf(),
                offset_secs,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}
