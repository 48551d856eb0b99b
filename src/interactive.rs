//! Interactive mode: pick a file, then extract streams one at a time.

use crate::error::SiftError;
use crate::media::{StreamDescriptor, StreamKind};
use crate::pipeline::{Pipeline, RequestContext};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::fs;
use std::path::{Path, PathBuf};

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "mts", "m2ts", "ts", // Video
    "mp3", "wav", "flac", "m4a", "ogg", "aac", "mka", // Audio
];

/// What an interactive session produced.
#[derive(Debug, Default)]
pub struct InteractiveSummary {
    pub source: PathBuf,
    pub delivered: Vec<(StreamDescriptor, PathBuf)>,
    /// Externally authored subtitle file, passed through untouched.
    pub external_subtitle: Option<PathBuf>,
}

/// Prompts block; keep them off the async worker's back.
fn prompt<T>(f: impl FnOnce() -> T) -> T {
    tokio::task::block_in_place(f)
}

pub async fn run_interactive(
    pipeline: &Pipeline,
    ctx: &RequestContext,
    output_dir: &Path,
) -> anyhow::Result<InteractiveSummary> {
    print_header();

    let source = prompt(select_source_file)?;
    let streams = pipeline.probe_request(&source, ctx).await?;

    if streams.is_empty() {
        anyhow::bail!("No streams found in {}", source.display());
    }

    println!("\n{}", style("Streams:").bold());
    for stream in &streams {
        let line = stream.describe();
        if is_extractable(stream) {
            println!("  {}", line);
        } else {
            println!("  {}", style(line).dim());
        }
    }
    println!();

    let mut summary = InteractiveSummary {
        source: source.clone(),
        ..Default::default()
    };

    loop {
        let Some(stream) = prompt(|| select_stream(&streams))? else {
            break;
        };

        println!("  Extracting {}...", stream.describe());
        match pipeline.extract_one_into(&source, stream, output_dir, ctx).await {
            Ok(delivered) => {
                println!(
                    "{} Saved {}",
                    style("✓").green(),
                    style(delivered.path.display()).cyan()
                );
                summary.delivered.push((stream.clone(), delivered.path));
            }
            Err(e) if e.is_cancellation() => return Err(e.into()),
            Err(e) => {
                println!("{} {}", style("✗").red(), e);
            }
        }

        if !prompt(|| {
            Confirm::new()
                .with_prompt("Extract another stream?")
                .default(false)
                .interact()
        })? {
            break;
        }
    }

    summary.external_subtitle = prompt(select_external_subtitle)?;

    print_summary(&summary);
    Ok(summary)
}

fn print_header() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║        streamsift - Stream Extraction Wizard      ║").cyan()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════════════════╝").cyan()
    );
    println!();
}

fn is_extractable(stream: &StreamDescriptor) -> bool {
    matches!(stream.kind, StreamKind::Audio | StreamKind::Subtitle)
}

fn select_source_file() -> anyhow::Result<PathBuf> {
    println!("{}", style("Select source file:").bold());

    let files = scan_media_files(Path::new("."))?;

    if files.is_empty() {
        println!("  No media files found in current directory.\n");
        return input_existing_path("Enter file path");
    }

    let mut items: Vec<String> = files
        .iter()
        .map(|f| {
            let size = fs::metadata(f)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "?".to_string());
            format!("{} ({})", f.display(), size)
        })
        .collect();
    items.push("Enter custom path...".to_string());

    let selection = Select::new()
        .with_prompt("Choose a file")
        .items(&items)
        .default(0)
        .interact()?;

    if selection == files.len() {
        input_existing_path("Enter file path")
    } else {
        Ok(files[selection].clone())
    }
}

fn input_existing_path(prompt: &str) -> anyhow::Result<PathBuf> {
    let path: String = Input::new().with_prompt(prompt).interact_text()?;
    let path = PathBuf::from(path.trim());
    if !path.exists() {
        return Err(SiftError::FileNotFound(path.display().to_string()).into());
    }
    Ok(path)
}

/// `None` once the user picks "Done".
fn select_stream(streams: &[StreamDescriptor]) -> anyhow::Result<Option<&StreamDescriptor>> {
    let mut items: Vec<String> = streams.iter().map(StreamDescriptor::describe).collect();
    items.push("Done".to_string());

    let default = streams.iter().position(is_extractable).unwrap_or(0);
    let selection = Select::new()
        .with_prompt("Select a stream to extract")
        .items(&items)
        .default(default)
        .interact()?;

    Ok(streams.get(selection))
}

fn select_external_subtitle() -> anyhow::Result<Option<PathBuf>> {
    if !Confirm::new()
        .with_prompt("Attach an external subtitle file?")
        .default(false)
        .interact()?
    {
        return Ok(None);
    }
    input_existing_path("Subtitle file path").map(Some)
}

pub fn scan_media_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                if SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                    files.push(path);
                }
            }
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn print_summary(summary: &InteractiveSummary) {
    println!("\n{}", style("═══ Summary ═══").bold());
    println!("  Source:    {}", style(summary.source.display()).cyan());
    if summary.delivered.is_empty() {
        println!("  Extracted: nothing");
    }
    for (stream, path) in &summary.delivered {
        println!("  #{:<3} {:<9} → {}", stream.index, stream.kind, style(path.display()).cyan());
    }
    if let Some(ref external) = summary.external_subtitle {
        println!("  External subtitle: {}", style(external.display()).cyan());
    }
    println!();
}
