use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{Result, SiftError};

use super::{CommandRunner, CommandSpec, StreamDescriptor, StreamKind, Toolchain};

const MISSING_TOOL_HINT: &str =
    "Is FFmpeg installed? Install it with: brew install ffmpeg (macOS) or apt install ffmpeg (Linux)";
const FAILED_PROBE_HINT: &str = "Check that the file exists and is a readable media container";
const MALFORMED_OUTPUT_HINT: &str = "FFprobe produced output that is not valid stream JSON";

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    tags: Option<ProbeTags>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    title: Option<String>,
    language: Option<String>,
}

impl From<ProbeStream> for StreamDescriptor {
    fn from(stream: ProbeStream) -> Self {
        let tags = stream.tags.unwrap_or_default();
        StreamDescriptor {
            index: stream.index,
            kind: stream
                .codec_type
                .as_deref()
                .map(StreamKind::from_codec_type)
                .unwrap_or(StreamKind::Other),
            codec_name: stream.codec_name.unwrap_or_default(),
            title: tags.title,
            language: tags.language,
        }
    }
}

/// Build the FFprobe invocation listing every stream as JSON.
pub fn probe_command(toolchain: &Toolchain, source: &Path) -> CommandSpec {
    CommandSpec::new(&toolchain.ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(source)
}

/// Parse FFprobe's JSON output into stream descriptors, in emission order.
pub fn parse_probe_output(stdout: &[u8]) -> std::result::Result<Vec<StreamDescriptor>, serde_json::Error> {
    let output: ProbeOutput = serde_json::from_slice(stdout)?;
    Ok(output.streams.into_iter().map(StreamDescriptor::from).collect())
}

/// Enumerate the streams of a container.
pub async fn probe(
    runner: &dyn CommandRunner,
    toolchain: &Toolchain,
    source: &Path,
    cancel: &CancelToken,
) -> Result<Vec<StreamDescriptor>> {
    let spec = probe_command(toolchain, source);
    debug!("Probing {}", source.display());

    let output = match runner.run(&spec, cancel).await {
        Ok(output) => output,
        Err(SiftError::Spawn { program, source: e }) => {
            return Err(SiftError::Probe {
                path: source.to_path_buf(),
                cause: format!("could not launch {program}: {e}"),
                hint: MISSING_TOOL_HINT,
            });
        }
        Err(e) => return Err(e),
    };

    if !output.success {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SiftError::Probe {
            path: source.to_path_buf(),
            cause: format!("ffprobe exited with {:?}: {}", output.code, stderr.trim()),
            hint: FAILED_PROBE_HINT,
        });
    }

    let streams = parse_probe_output(&output.stdout).map_err(|e| SiftError::Probe {
        path: source.to_path_buf(),
        cause: format!("unparseable output: {e}"),
        hint: MALFORMED_OUTPUT_HINT,
    })?;

    info!("Found {} streams in {}", streams.len(), source.display());
    Ok(streams)
}
