use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::VideoPolicy;
use crate::error::{Result, SiftError};
use crate::subtitle::SubtitleFormat;

use super::{ArtifactKind, ExtractionMode, ExtractionRequest, StreamDescriptor, StreamKind};

/// Video codec that players accept without re-encoding.
const BASELINE_VIDEO_CODEC: &str = "h264";

/// Encoder used when a video stream has to be brought to the baseline codec.
const BASELINE_VIDEO_ENCODER: &str = "libx264";

/// Locations of the external tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// A subprocess invocation: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Bare program name, for messages.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Value following `flag`, if the flag is present.
    pub fn value_of(&self, flag: &str) -> Option<String> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|v| v.to_string_lossy().into_owned())
    }

    /// Shell-like rendering used in logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| {
                let part = part.to_string_lossy();
                if part.contains(char::is_whitespace) {
                    format!("{:?}", part)
                } else {
                    part.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A fully built extraction: what is extracted, where it goes, how to run it.
#[derive(Debug, Clone)]
pub struct ExtractionCommand {
    pub request: ExtractionRequest,
    pub kind: ArtifactKind,
    pub output: PathBuf,
    pub command: CommandSpec,
}

/// True if a video stream with this codec can be passed through as-is.
pub fn is_baseline_codec(codec_name: &str) -> bool {
    codec_name == BASELINE_VIDEO_CODEC
}

/// Artifact kind for a stream eligible for sidecar extraction.
///
/// Only audio and subtitle streams qualify; everything else is rejected here,
/// before a command is ever built.
pub fn artifact_kind_for(stream: &StreamDescriptor) -> Result<ArtifactKind> {
    match stream.kind {
        StreamKind::Audio => Ok(ArtifactKind::Audio),
        StreamKind::Subtitle => Ok(ArtifactKind::Subtitle),
        StreamKind::Video | StreamKind::Other => Err(SiftError::UnsupportedStreamType {
            index: stream.index,
            kind: stream.kind,
        }),
    }
}

fn base_command(ffmpeg: &Path, source: &Path, stream_index: u32) -> CommandSpec {
    CommandSpec::new(ffmpeg)
        .args(["-hide_banner", "-nostdin", "-y", "-i"])
        .arg(source)
        .arg("-map")
        .arg(format!("0:{}", stream_index))
}

/// Build the command extracting one audio or subtitle stream into `output`.
///
/// AAC audio is stream-copied; any other audio codec is transcoded to AAC.
/// Subtitles are always converted to the target text-cue format.
pub fn build_extraction_command(
    toolchain: &Toolchain,
    source: &Path,
    stream: &StreamDescriptor,
    output: &Path,
    subtitle_format: SubtitleFormat,
) -> Result<ExtractionCommand> {
    let (kind, mode, codec) = match artifact_kind_for(stream)? {
        ArtifactKind::Audio if stream.codec_name == "aac" => {
            (ArtifactKind::Audio, ExtractionMode::Copy, ["-c:a", "copy"])
        }
        ArtifactKind::Audio => (ArtifactKind::Audio, ExtractionMode::Transcode, ["-c:a", "aac"]),
        kind => (kind, ExtractionMode::Transcode, ["-c:s", subtitle_format.encoder()]),
    };
    let command = base_command(&toolchain.ffmpeg, source, stream.index).args(codec);

    Ok(ExtractionCommand {
        request: ExtractionRequest {
            source_path: source.to_path_buf(),
            stream: stream.clone(),
            mode,
        },
        kind,
        output: output.to_path_buf(),
        command: command.arg(output),
    })
}

/// Build the command extracting the video stream for a batch manifest.
///
/// Video is copied unless the policy asks for baseline normalization and the
/// codec is not already baseline.
pub fn build_video_command(
    toolchain: &Toolchain,
    source: &Path,
    stream: &StreamDescriptor,
    output: &Path,
    policy: VideoPolicy,
) -> Result<ExtractionCommand> {
    if stream.kind != StreamKind::Video {
        return Err(SiftError::UnsupportedStreamType {
            index: stream.index,
            kind: stream.kind,
        });
    }

    let mode = match policy {
        VideoPolicy::Baseline if !is_baseline_codec(&stream.codec_name) => {
            ExtractionMode::Transcode
        }
        _ => ExtractionMode::Copy,
    };
    let codec = match mode {
        ExtractionMode::Copy => "copy",
        ExtractionMode::Transcode => BASELINE_VIDEO_ENCODER,
    };

    let command = base_command(&toolchain.ffmpeg, source, stream.index)
        .args(["-c:v", codec])
        .arg(output);

    Ok(ExtractionCommand {
        request: ExtractionRequest {
            source_path: source.to_path_buf(),
            stream: stream.clone(),
            mode,
        },
        kind: ArtifactKind::Video,
        output: output.to_path_buf(),
        command,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: u32, kind: StreamKind, codec: &str) -> StreamDescriptor {
        StreamDescriptor {
            index,
            kind,
            codec_name: codec.to_string(),
            title: None,
            language: None,
        }
    }

    fn build(s: &StreamDescriptor) -> Result<ExtractionCommand> {
        build_extraction_command(
            &Toolchain::default(),
            Path::new("/media/movie.mkv"),
            s,
            Path::new("/tmp/out.aac"),
            SubtitleFormat::Vtt,
        )
    }

    #[test]
    fn test_aac_audio_is_copied() {
        let cmd = build(&stream(1, StreamKind::Audio, "aac")).unwrap();
        assert_eq!(cmd.request.mode, ExtractionMode::Copy);
        assert_eq!(cmd.command.value_of("-c:a").as_deref(), Some("copy"));
        assert_eq!(cmd.command.value_of("-map").as_deref(), Some("0:1"));
    }

    #[test]
    fn test_other_audio_is_transcoded() {
        for codec in ["mp3", "ac3", "opus", "AAC"] {
            let cmd = build(&stream(2, StreamKind::Audio, codec)).unwrap();
            assert_eq!(cmd.request.mode, ExtractionMode::Transcode, "codec {codec}");
            assert_eq!(cmd.command.value_of("-c:a").as_deref(), Some("aac"));
        }
    }

    #[test]
    fn test_subtitle_always_transcoded() {
        let cmd = build(&stream(3, StreamKind::Subtitle, "webvtt")).unwrap();
        assert_eq!(cmd.request.mode, ExtractionMode::Transcode);
        assert_eq!(cmd.kind, ArtifactKind::Subtitle);
        assert_eq!(cmd.command.value_of("-c:s").as_deref(), Some("webvtt"));
    }

    #[test]
    fn test_srt_target_uses_srt_encoder() {
        let cmd = build_extraction_command(
            &Toolchain::default(),
            Path::new("in.mkv"),
            &stream(3, StreamKind::Subtitle, "ass"),
            Path::new("out.srt"),
            SubtitleFormat::Srt,
        )
        .unwrap();
        assert_eq!(cmd.command.value_of("-c:s").as_deref(), Some("srt"));
    }

    #[test]
    fn test_output_path_is_last_argument() {
        let cmd = build(&stream(1, StreamKind::Audio, "aac")).unwrap();
        assert_eq!(
            cmd.command.args.last().map(|a| a.as_os_str()),
            Some(OsStr::new("/tmp/out.aac"))
        );
        assert_eq!(cmd.command.value_of("-i").as_deref(), Some("/media/movie.mkv"));
    }

    #[test]
    fn test_unsupported_kinds_rejected() {
        for kind in [StreamKind::Video, StreamKind::Other] {
            let result = build(&stream(0, kind, "h264"));
            assert!(matches!(
                result,
                Err(SiftError::UnsupportedStreamType { index: 0, .. })
            ));
        }
    }

    #[test]
    fn test_video_copy_by_default() {
        let cmd = build_video_command(
            &Toolchain::default(),
            Path::new("in.mkv"),
            &stream(0, StreamKind::Video, "hevc"),
            Path::new("out.mp4"),
            VideoPolicy::Copy,
        )
        .unwrap();
        assert_eq!(cmd.request.mode, ExtractionMode::Copy);
        assert_eq!(cmd.command.value_of("-c:v").as_deref(), Some("copy"));
    }

    #[test]
    fn test_video_baseline_policy() {
        let hevc = build_video_command(
            &Toolchain::default(),
            Path::new("in.mkv"),
            &stream(0, StreamKind::Video, "hevc"),
            Path::new("out.mp4"),
            VideoPolicy::Baseline,
        )
        .unwrap();
        assert_eq!(hevc.command.value_of("-c:v").as_deref(), Some("libx264"));

        let h264 = build_video_command(
            &Toolchain::default(),
            Path::new("in.mkv"),
            &stream(0, StreamKind::Video, "h264"),
            Path::new("out.mp4"),
            VideoPolicy::Baseline,
        )
        .unwrap();
        assert_eq!(h264.request.mode, ExtractionMode::Copy);
    }

    #[test]
    fn test_display_quotes_whitespace() {
        let spec = CommandSpec::new("ffmpeg").args(["-i", "my movie.mkv"]);
        assert_eq!(spec.display(), "ffmpeg -i \"my movie.mkv\"");
    }

    #[test]
    fn test_is_baseline_codec() {
        assert!(is_baseline_codec("h264"));
        assert!(!is_baseline_codec("hevc"));
        assert!(!is_baseline_codec("H264"));
    }
}
