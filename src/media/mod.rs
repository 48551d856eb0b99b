pub mod command;
pub mod executor;
pub mod probe;
pub mod runner;

pub use command::{
    artifact_kind_for, build_extraction_command, build_video_command, is_baseline_codec,
    CommandSpec, ExtractionCommand, Toolchain,
};
pub use executor::execute;
pub use probe::{parse_probe_output, probe, probe_command};
pub use runner::{check_tool, CommandRunner, ProcessRunner, RunOutput};

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Kind of an elementary stream, taken from the probe tool's `codec_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

impl StreamKind {
    /// Exact, case-sensitive mapping; anything unrecognized is `Other`.
    pub fn from_codec_type(codec_type: &str) -> Self {
        match codec_type {
            "video" => StreamKind::Video,
            "audio" => StreamKind::Audio,
            "subtitle" => StreamKind::Subtitle,
            _ => StreamKind::Other,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
            StreamKind::Subtitle => write!(f, "subtitle"),
            StreamKind::Other => write!(f, "other"),
        }
    }
}

/// One elementary stream of a container, as reported by the probe tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDescriptor {
    pub index: u32,
    pub kind: StreamKind,
    pub codec_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl StreamDescriptor {
    /// Short human-readable summary used by the CLI and the wizard.
    pub fn describe(&self) -> String {
        let mut out = format!("#{} {} ({})", self.index, self.kind, self.codec_name);
        if let Some(ref title) = self.title {
            out.push_str(&format!(" \"{}\"", title));
        }
        if let Some(ref language) = self.language {
            out.push_str(&format!(" [{}]", language));
        }
        out
    }
}

/// Per-kind stream counts of a probe result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub video: usize,
    pub audio: usize,
    pub subtitle: usize,
    pub other: usize,
}

impl KindCounts {
    pub fn of(streams: &[StreamDescriptor]) -> Self {
        let mut counts = Self::default();
        for stream in streams {
            match stream.kind {
                StreamKind::Video => counts.video += 1,
                StreamKind::Audio => counts.audio += 1,
                StreamKind::Subtitle => counts.subtitle += 1,
                StreamKind::Other => counts.other += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.video + self.audio + self.subtitle + self.other
    }
}

/// Kind of file the pipeline produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Audio,
    Subtitle,
    Video,
}

impl ArtifactKind {
    /// Tag embedded in temp file names.
    pub fn tag(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio",
            ArtifactKind::Subtitle => "sub",
            ArtifactKind::Video => "video",
        }
    }
}

/// Whether the extraction copies encoded bytes or re-encodes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    Copy,
    Transcode,
}

/// A single extraction, derived from a stream; never retained past command construction.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub source_path: PathBuf,
    pub stream: StreamDescriptor,
    pub mode: ExtractionMode,
}

/// A file produced by a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub owner_prefix: String,
    pub kind: ArtifactKind,
    pub stream_index: u32,
}
