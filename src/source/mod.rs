pub mod directory;
pub mod frames;
pub mod stream;

use crate::clients::ClientError;
use std::path::PathBuf;
use thiserror::Error;

pub use directory::{checkpoint_key, DirectoryEnumerator};
pub use frames::{sample_offsets, FfmpegFrameSampler, FrameError, FrameSampler, VideoProbe};
pub use stream::{ResumeDirective, StreamEnumerator, StreamLimits};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot resolve stream '{stream}': {source}")]
    Setup { stream: String, source: ClientError },

    #[error("stream read failed: {0}")]
    Read(#[from] ClientError),

    #[error("cannot read directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
}
