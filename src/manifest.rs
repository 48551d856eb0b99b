use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::media::{Artifact, ArtifactKind, StreamDescriptor};
use crate::temp;

/// An extracted track with its display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledArtifact {
    pub artifact: Artifact,
    pub label: String,
}

/// A stream a partial batch could not extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFailure {
    pub stream_index: u32,
    pub kind: ArtifactKind,
    pub error: String,
}

/// Everything a batch extracted from one source file.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub source: PathBuf,
    pub video: Option<Artifact>,
    pub audio: Vec<LabeledArtifact>,
    pub subtitles: Vec<LabeledArtifact>,
    pub failures: Vec<StreamFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackEntry {
    pub url: String,
    pub label: String,
}

/// Wire form of a [`Manifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    pub video_url: Option<String>,
    pub audio_tracks: Vec<TrackEntry>,
    pub subtitle_tracks: Vec<TrackEntry>,
    pub filename: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<StreamFailure>,
}

/// Label for a track: its title, else its language, else `"Audio {n}"`/`"Subtitle {n}"`.
///
/// `position` is the 0-based position of the stream among streams of the same
/// kind, not its global index.
pub fn track_label(stream: &StreamDescriptor, kind: ArtifactKind, position: usize) -> String {
    // Blank counts as absent; anything else is used verbatim.
    let present = |value: &Option<String>| {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
    };

    present(&stream.title)
        .or_else(|| present(&stream.language))
        .unwrap_or_else(|| {
            let noun = match kind {
                ArtifactKind::Audio => "Audio",
                ArtifactKind::Subtitle => "Subtitle",
                ArtifactKind::Video => "Video",
            };
            format!("{} {}", noun, position + 1)
        })
}

fn artifact_url(path: &Path, url_base: Option<&str>) -> String {
    match url_base {
        Some(base) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{}/{}", base.trim_end_matches('/'), name)
        }
        None => path.display().to_string(),
    }
}

impl Manifest {
    /// File name of the source, as shown to users.
    pub fn filename(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.video
            .iter()
            .chain(self.audio.iter().map(|t| &t.artifact))
            .chain(self.subtitles.iter().map(|t| &t.artifact))
    }

    pub fn to_document(&self, url_base: Option<&str>) -> ManifestDocument {
        let tracks = |items: &[LabeledArtifact]| {
            items
                .iter()
                .map(|t| TrackEntry {
                    url: artifact_url(&t.artifact.path, url_base),
                    label: t.label.clone(),
                })
                .collect()
        };

        ManifestDocument {
            video_url: self.video.as_ref().map(|a| artifact_url(&a.path, url_base)),
            audio_tracks: tracks(&self.audio),
            subtitle_tracks: tracks(&self.subtitles),
            filename: self.filename(),
            failures: self.failures.clone(),
        }
    }

    pub fn to_json(&self, url_base: Option<&str>) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document(url_base))?)
    }

    /// Copy every artifact into `dest_dir` and return the manifest pointing at the copies.
    pub async fn deliver_to(&self, dest_dir: &Path) -> Result<Manifest> {
        let stem = temp::source_stem(&self.source);

        let video = match &self.video {
            Some(artifact) => Some(temp::deliver(artifact, dest_dir, &stem).await?),
            None => None,
        };

        let mut audio = Vec::with_capacity(self.audio.len());
        for track in &self.audio {
            audio.push(LabeledArtifact {
                artifact: temp::deliver(&track.artifact, dest_dir, &stem).await?,
                label: track.label.clone(),
            });
        }

        let mut subtitles = Vec::with_capacity(self.subtitles.len());
        for track in &self.subtitles {
            subtitles.push(LabeledArtifact {
                artifact: temp::deliver(&track.artifact, dest_dir, &stem).await?,
                label: track.label.clone(),
            });
        }

        Ok(Manifest {
            source: self.source.clone(),
            video,
            audio,
            subtitles,
            failures: self.failures.clone(),
        })
    }
}
