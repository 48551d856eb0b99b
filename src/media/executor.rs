use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Result, SiftError};

use super::{Artifact, CommandRunner, ExtractionCommand};

/// Number of stderr lines kept in an extraction error.
const STDERR_TAIL_LINES: usize = 20;

/// Last `max_lines` non-empty lines of a tool's diagnostic output.
pub fn stderr_tail(stderr: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Run an extraction command and return the artifact it produced.
///
/// Success means the tool exited with status 0; the output is not inspected.
/// On failure any partial output is left in place for the sweep to reclaim.
pub async fn execute(
    runner: &dyn CommandRunner,
    extraction: &ExtractionCommand,
    owner_prefix: &str,
    cancel: &CancelToken,
) -> Result<Artifact> {
    let request = &extraction.request;
    let failure = |stderr_tail: String| SiftError::Extraction {
        source_path: request.source_path.clone(),
        stream_index: request.stream.index,
        command: extraction.command.display(),
        stderr_tail,
    };

    debug!(
        "Extracting stream {} ({:?}) to {}",
        request.stream.index,
        request.mode,
        extraction.output.display()
    );

    let output = match runner.run(&extraction.command, cancel).await {
        Ok(output) => output,
        Err(SiftError::Spawn { program, source }) => {
            warn!("Failed to launch {}: {}", program, source);
            return Err(failure(format!("could not launch {program}: {source}")));
        }
        Err(e) => return Err(e),
    };

    if !output.success {
        let tail = stderr_tail(&output.stderr, STDERR_TAIL_LINES);
        warn!(
            "Extraction of stream {} exited with {:?}",
            request.stream.index, output.code
        );
        return Err(failure(tail));
    }

    info!(
        "Stream {} extracted to {}",
        request.stream.index,
        extraction.output.display()
    );

    Ok(Artifact {
        path: extraction.output.clone(),
        owner_prefix: owner_prefix.to_string(),
        kind: extraction.kind,
        stream_index: request.stream.index,
    })
}
