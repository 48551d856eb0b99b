pub mod normalize;

pub use normalize::{is_structural, normalize_bytes, normalize_file, normalize_text, NormalizeReport};

use serde::{Deserialize, Serialize};

/// Text-cue format subtitle streams are converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    #[default]
    Vtt,
    Srt,
}

impl std::fmt::Display for SubtitleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubtitleFormat::Vtt => write!(f, "vtt"),
            SubtitleFormat::Srt => write!(f, "srt"),
        }
    }
}

impl std::str::FromStr for SubtitleFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vtt" | "webvtt" => Ok(SubtitleFormat::Vtt),
            "srt" => Ok(SubtitleFormat::Srt),
            _ => Err(format!("Unknown subtitle format: {}. Use 'vtt' or 'srt'", s)),
        }
    }
}

impl SubtitleFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SubtitleFormat::Vtt => "vtt",
            SubtitleFormat::Srt => "srt",
        }
    }

    /// FFmpeg subtitle encoder producing this format.
    pub fn encoder(&self) -> &'static str {
        match self {
            SubtitleFormat::Vtt => "webvtt",
            SubtitleFormat::Srt => "srt",
        }
    }

    /// Literal first line of the format, if it has one.
    pub fn header(&self) -> Option<&'static str> {
        match self {
            SubtitleFormat::Vtt => Some("WEBVTT"),
            SubtitleFormat::Srt => None,
        }
    }
}
