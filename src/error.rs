use std::path::PathBuf;

use thiserror::Error;

use crate::media::StreamKind;

#[derive(Error, Debug)]
pub enum SiftError {
    #[error("Probe of {} failed: {cause}. {hint}", path.display())]
    Probe {
        path: PathBuf,
        cause: String,
        hint: &'static str,
    },

    #[error("Stream {index} has kind '{kind}', which cannot be extracted")]
    UnsupportedStreamType { index: u32, kind: StreamKind },

    #[error(
        "Extraction of stream {stream_index} from {} failed\n  command: {command}\n  stderr: {stderr_tail}",
        source_path.display()
    )]
    Extraction {
        source_path: PathBuf,
        stream_index: u32,
        command: String,
        stderr_tail: String,
    },

    #[error("Subtitle post-processing of {} failed: {reason}", path.display())]
    PostProcess { path: PathBuf, reason: String },

    #[error("Failed to remove temp entry {}: {source}", path.display())]
    Sweep {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream {index} not found in {}", path.display())]
    StreamNotFound { path: PathBuf, index: u32 },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation exceeded its deadline")]
    DeadlineExceeded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SiftError {
    /// True for errors raised by a cancel token rather than by the work itself.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SiftError::Cancelled | SiftError::DeadlineExceeded)
    }
}

pub type Result<T> = std::result::Result<T, SiftError>;
