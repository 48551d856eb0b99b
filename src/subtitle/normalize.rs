use std::path::Path;

use tracing::debug;

use crate::error::{Result, SiftError};

use super::SubtitleFormat;

/// Token separating start and end time on a cue timing line.
const CUE_TIME_SEPARATOR: &[u8] = b"-->";

/// Outcome of normalizing one subtitle file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeReport {
    pub lines: usize,
    pub modified_lines: usize,
}

/// True for lines that carry cue structure rather than cue text.
///
/// Structural lines are empty lines, cue timing lines, pure cue-index lines
/// and the format's header line. They are never modified.
pub fn is_structural(line: &[u8], header: Option<&str>) -> bool {
    line.is_empty()
        || line
            .windows(CUE_TIME_SEPARATOR.len())
            .any(|w| w == CUE_TIME_SEPARATOR)
        || line.iter().all(u8::is_ascii_digit)
        || header.is_some_and(|h| h.as_bytes() == line)
}

fn normalize_lines(content: &[u8], header: Option<&str>) -> (Vec<u8>, NormalizeReport) {
    let mut out = Vec::with_capacity(content.len());
    let mut report = NormalizeReport {
        lines: 0,
        modified_lines: 0,
    };

    for (i, line) in content.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.push(b'\n');
        }
        report.lines += 1;

        if is_structural(line, header) || !line.contains(&b'"') {
            out.extend_from_slice(line);
        } else {
            report.modified_lines += 1;
            out.extend(line.iter().copied().filter(|&b| b != b'"'));
        }
    }

    (out, report)
}

/// Strip double quotes from cue text, leaving structural lines untouched.
///
/// Line count and order are preserved exactly, including a trailing newline.
pub fn normalize_bytes(content: &[u8], format: SubtitleFormat) -> Vec<u8> {
    normalize_lines(content, format.header()).0
}

/// [`normalize_bytes`] for in-memory text.
pub fn normalize_text(content: &str, format: SubtitleFormat) -> String {
    let bytes = normalize_bytes(content.as_bytes(), format);
    // Only ASCII quote bytes are removed, so the result stays valid UTF-8.
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Normalize an extracted subtitle file in place.
pub async fn normalize_file(path: &Path, format: SubtitleFormat) -> Result<NormalizeReport> {
    let post_process_error = |reason: String| SiftError::PostProcess {
        path: path.to_path_buf(),
        reason,
    };

    let content = tokio::fs::read(path)
        .await
        .map_err(|e| post_process_error(format!("read failed: {e}")))?;

    let (normalized, report) = normalize_lines(&content, format.header());

    if report.modified_lines > 0 {
        tokio::fs::write(path, normalized)
            .await
            .map_err(|e| post_process_error(format!("write failed: {e}")))?;
    }

    debug!(
        "Normalized {}: {}/{} lines modified",
        path.display(),
        report.modified_lines,
        report.lines
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "WEBVTT\n\n1\n00:00:01.000 --> 00:00:02.000\nHe said \"hello\"\n\n2\n00:00:03.000 --> 00:00:04.000 align:start\n\"Quoted\" and \"more\"\n";

    #[test]
    fn test_scenario_lines() {
        let vtt = SubtitleFormat::Vtt;
        assert_eq!(normalize_text("1", vtt), "1");
        assert_eq!(
            normalize_text("00:00:01.000 --> 00:00:02.000", vtt),
            "00:00:01.000 --> 00:00:02.000"
        );
        assert_eq!(normalize_text("WEBVTT", vtt), "WEBVTT");
        assert_eq!(normalize_text("He said \"hello\"", vtt), "He said hello");
        assert_eq!(normalize_text("", vtt), "");
    }

    #[test]
    fn test_full_document() {
        let out = normalize_text(SAMPLE, SubtitleFormat::Vtt);
        assert_eq!(
            out,
            "WEBVTT\n\n1\n00:00:01.000 --> 00:00:02.000\nHe said hello\n\n2\n00:00:03.000 --> 00:00:04.000 align:start\nQuoted and more\n"
        );
    }

    #[test]
    fn test_line_count_preserved() {
        let out = normalize_text(SAMPLE, SubtitleFormat::Vtt);
        assert_eq!(out.split('\n').count(), SAMPLE.split('\n').count());
    }

    #[test]
    fn test_structural_lines_are_byte_identical() {
        let input = "1\n\"5\" --> \"6\"\n\"quoted\"";
        let out = normalize_text(input, SubtitleFormat::Vtt);
        assert_eq!(out, "1\n\"5\" --> \"6\"\nquoted");
    }

    #[test]
    fn test_idempotent() {
        let once = normalize_text(SAMPLE, SubtitleFormat::Vtt);
        let twice = normalize_text(&once, SubtitleFormat::Vtt);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_header_only_structural_for_vtt() {
        assert!(is_structural(b"WEBVTT", Some("WEBVTT")));
        assert!(!is_structural(b"WEBVTT", None));
        assert!(!is_structural(b"WEBVTT - \"title\"", Some("WEBVTT")));
    }

    #[test]
    fn test_non_utf8_bytes_survive() {
        let input = b"1\n\xff\"caf\xe9\"\n";
        let out = normalize_bytes(input, SubtitleFormat::Srt);
        assert_eq!(out, b"1\n\xffcaf\xe9\n");
    }

    #[tokio::test]
    async fn test_normalize_missing_file_is_post_process_error() {
        let result = normalize_file(Path::new("/nonexistent/streamsift.vtt"), SubtitleFormat::Vtt).await;
        assert!(matches!(result, Err(SiftError::PostProcess { .. })));
    }
}
