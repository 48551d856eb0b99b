//! Naming and garbage collection of pipeline-produced temp files.
//!
//! Every file the pipeline writes lives directly in one shared temp directory
//! and is named `{marker}-{session}_{kind}_{stream}.{ext}`. The marker makes
//! the files recognizable to [`TempArtifacts::sweep`]; the session id makes
//! concurrent extractions of the same stream collide-free.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Result, SiftError};
use crate::media::{Artifact, ArtifactKind};
use crate::subtitle::SubtitleFormat;

/// Default marker prefixed to every temp file name.
pub const DEFAULT_MARKER: &str = "streamsift";

/// Container extension for extracted video.
const VIDEO_EXTENSION: &str = "mp4";

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Distinct per call within a process, and per process through the pid.
fn next_session_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", nanos, std::process::id(), seq)
}

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
    pub skipped_active: usize,
}

/// Owner prefixes of sessions that still have extractions in flight.
#[derive(Debug, Clone, Default)]
struct ActiveSessions(Arc<Mutex<HashSet<String>>>);

impl ActiveSessions {
    fn with<R>(&self, f: impl FnOnce(&mut HashSet<String>) -> R) -> R {
        let mut set = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut set)
    }

    fn owns(&self, file_name: &str) -> bool {
        self.with(|set| {
            set.iter().any(|prefix| {
                file_name
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('_'))
            })
        })
    }
}

/// The shared temp namespace of the pipeline.
#[derive(Debug, Clone)]
pub struct TempArtifacts {
    dir: PathBuf,
    marker: String,
    subtitle_format: SubtitleFormat,
    active: ActiveSessions,
}

impl TempArtifacts {
    pub fn new(dir: impl Into<PathBuf>, marker: impl Into<String>, subtitle_format: SubtitleFormat) -> Self {
        Self {
            dir: dir.into(),
            marker: marker.into(),
            subtitle_format,
            active: ActiveSessions::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn extension(&self, kind: ArtifactKind) -> &'static str {
        match kind {
            ArtifactKind::Audio => "aac",
            ArtifactKind::Subtitle => self.subtitle_format.extension(),
            ArtifactKind::Video => VIDEO_EXTENSION,
        }
    }

    /// Path for one stream's artifact under `owner_prefix`.
    pub fn allocate_path(&self, owner_prefix: &str, kind: ArtifactKind, stream_index: u32) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}.{}",
            owner_prefix,
            kind.tag(),
            stream_index,
            self.extension(kind)
        ))
    }

    /// Start an extraction session. Its files are exempt from sweeps until it is dropped.
    pub fn begin_session(&self) -> Session<'_> {
        let prefix = format!("{}-{}", self.marker, next_session_id());
        self.active.with(|set| set.insert(prefix.clone()));
        debug!("Session {} started", prefix);
        Session { temp: self, prefix }
    }

    /// Number of sessions currently in flight.
    pub fn active_sessions(&self) -> usize {
        self.active.with(|set| set.len())
    }

    /// Delete every entry of the temp directory carrying the marker.
    ///
    /// Entries of in-flight sessions are skipped. Individual failures are
    /// logged and counted; the sweep always visits every remaining entry
    /// unless `cancel` fires.
    pub async fn sweep(&self, cancel: &CancelToken) -> SweepReport {
        let mut report = SweepReport::default();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list temp directory {}: {}", self.dir.display(), e);
                return report;
            }
        };

        loop {
            if let Err(e) = cancel.check() {
                warn!("Sweep of {} stopped early: {}", self.dir.display(), e);
                break;
            }

            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read temp directory entry: {}", e);
                    report.failed += 1;
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&self.marker) {
                continue;
            }
            if self.active.owns(&name) {
                report.skipped_active += 1;
                continue;
            }

            let path = entry.path();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let removal = if is_dir {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };

            match removal {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    report.removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("{}", SiftError::Sweep { path, source: e });
                    report.failed += 1;
                }
            }
        }

        info!(
            "Swept {}: {} removed, {} failed, {} in use",
            self.dir.display(),
            report.removed,
            report.failed,
            report.skipped_active
        );
        report
    }
}

/// An extraction session: a unique owner prefix registered as active.
#[derive(Debug)]
pub struct Session<'a> {
    temp: &'a TempArtifacts,
    prefix: String,
}

impl Session<'_> {
    pub fn owner_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn allocate_path(&self, kind: ArtifactKind, stream_index: u32) -> PathBuf {
        self.temp.allocate_path(&self.prefix, kind, stream_index)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.temp.active.with(|set| set.remove(&self.prefix));
        debug!("Session {} finished", self.prefix);
    }
}

/// File stem delivered copies of `source` are named after.
pub fn source_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

/// Copy an artifact out of the temp namespace as `{stem}.{kind}{stream}.{ext}`.
///
/// The temp copy stays where it is; the next sweep reclaims it.
pub async fn deliver(artifact: &Artifact, dest_dir: &Path, stem: &str) -> Result<Artifact> {
    tokio::fs::create_dir_all(dest_dir).await?;

    let extension = artifact
        .path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dest = dest_dir.join(format!(
        "{}.{}{}.{}",
        stem,
        artifact.kind.tag(),
        artifact.stream_index,
        extension
    ));

    tokio::fs::copy(&artifact.path, &dest)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SiftError::FileNotFound(artifact.path.display().to_string())
            }
            _ => SiftError::Io(e),
        })?;

    debug!("Delivered {} to {}", artifact.path.display(), dest.display());
    Ok(Artifact {
        path: dest,
        ..artifact.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp() -> TempArtifacts {
        TempArtifacts::new("/tmp/sift", DEFAULT_MARKER, SubtitleFormat::Vtt)
    }

    #[test]
    fn test_source_stem() {
        assert_eq!(source_stem(Path::new("/path/to/video.mp4")), "video");
        assert_eq!(source_stem(Path::new("movie.final.mkv")), "movie.final");
        assert_eq!(source_stem(Path::new("/")), "output");
    }

    #[test]
    fn test_allocate_path_format() {
        let path = temp().allocate_path("streamsift-42", ArtifactKind::Audio, 1);
        assert_eq!(path, PathBuf::from("/tmp/sift/streamsift-42_audio_1.aac"));

        let path = temp().allocate_path("streamsift-42", ArtifactKind::Subtitle, 3);
        assert_eq!(path, PathBuf::from("/tmp/sift/streamsift-42_sub_3.vtt"));
    }

    #[test]
    fn test_srt_extension() {
        let t = TempArtifacts::new("/tmp", DEFAULT_MARKER, SubtitleFormat::Srt);
        assert_eq!(t.extension(ArtifactKind::Subtitle), "srt");
        assert_eq!(t.extension(ArtifactKind::Video), "mp4");
    }

    #[test]
    fn test_sessions_never_share_paths() {
        let t = temp();
        let a = t.begin_session();
        let b = t.begin_session();
        assert_ne!(a.owner_prefix(), b.owner_prefix());
        assert_ne!(
            a.allocate_path(ArtifactKind::Audio, 0),
            b.allocate_path(ArtifactKind::Audio, 0)
        );
        assert!(a.owner_prefix().starts_with("streamsift-"));
    }

    #[test]
    fn test_session_registration_lifecycle() {
        let t = temp();
        {
            let session = t.begin_session();
            assert_eq!(t.active_sessions(), 1);
            let name = format!("{}_audio_0.aac", session.owner_prefix());
            assert!(t.active.owns(&name));
        }
        assert_eq!(t.active_sessions(), 0);
    }

    #[test]
    fn test_active_match_requires_separator() {
        let active = ActiveSessions::default();
        active.with(|set| set.insert("streamsift-1".to_string()));
        assert!(active.owns("streamsift-1_audio_0.aac"));
        assert!(!active.owns("streamsift-12_audio_0.aac"));
    }
}
