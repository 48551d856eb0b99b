use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use streamsift::interactive::run_interactive;
use streamsift::media::KindCounts;
use streamsift::{
    BatchPolicy, CancelToken, Config, Pipeline, ProgressEvent, RequestContext,
    SubtitleFormat, VideoPolicy,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// How long shutdown waits for the final sweep before exiting anyway.
const SHUTDOWN_SWEEP_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "streamsift")]
#[command(version, about = "Extract audio and subtitle streams from media containers")]
#[command(long_about = "Probe media files with FFprobe and extract their streams with FFmpeg into standalone files.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Number of concurrent extractions in a batch
    #[arg(short, long, global = true)]
    concurrency: Option<usize>,

    /// Subtitle output format: vtt, srt
    #[arg(long, global = true)]
    subtitle_format: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// List the streams of a media file
    Probe {
        /// Input video/audio file
        input: PathBuf,

        /// Print the streams as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract a single audio or subtitle stream
    Extract {
        /// Input video/audio file
        input: PathBuf,

        /// Index of the stream to extract
        #[arg(short, long)]
        stream: u32,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Extract video, audio and subtitles and print a manifest
    Batch {
        /// Input video/audio file
        input: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        /// Keep going when a stream fails and report it in the manifest
        #[arg(long)]
        partial: bool,

        /// Re-encode non-H.264 video to H.264
        #[arg(long)]
        reencode_video: bool,

        /// Base URL for artifact URLs in the manifest
        #[arg(long)]
        url_base: Option<String>,
    },
    /// Remove leftover temp files
    Sweep,
    /// Pick a file and streams interactively
    Interactive {
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Directory extracted files are written to
    #[arg(short = 'o', long = "output-dir", default_value = ".")]
    dir: PathBuf,
}

/// Filter directives: `--verbose` wins, then `RUST_LOG`, then `info`.
fn log_directives(verbose: bool, rust_log: Option<String>) -> String {
    if verbose {
        return "debug".to_string();
    }
    rust_log
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

fn init_logging(verbose: bool) {
    let directives = log_directives(verbose, std::env::var(EnvFilter::DEFAULT_ENV).ok());

    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(directives))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = Some(timeout);
    }
    if let Some(ref format) = cli.subtitle_format {
        config.subtitle_format = format
            .parse::<SubtitleFormat>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    if let Command::Batch {
        partial,
        reencode_video,
        ref url_base,
        ..
    } = cli.command
    {
        if partial {
            config.batch_policy = BatchPolicy::Partial;
        }
        if reencode_video {
            config.video_policy = VideoPolicy::Baseline;
        }
        if url_base.is_some() {
            config.url_base = url_base.clone();
        }
    }
    Ok(())
}

/// Render progress events as a bar until the sender side is dropped.
fn spawn_progress_reporter(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} streams {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));

        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Probed { source, streams } => {
                    pb.set_message(format!("{} ({} streams)", source.display(), streams));
                }
                ProgressEvent::StreamStarted { index, kind } => {
                    pb.inc_length(1);
                    pb.set_message(format!("{} #{}", kind.tag(), index));
                }
                ProgressEvent::StreamFinished { .. } => pb.inc(1),
                ProgressEvent::StreamFailed { index, message, .. } => {
                    pb.inc(1);
                    pb.println(format!("stream #{} failed: {}", index, message));
                }
                ProgressEvent::Completed { artifacts } => {
                    pb.set_message(format!("done, {} files", artifacts));
                }
            }
        }
        pb.finish_and_clear();
    })
}

async fn run(cli: &Cli, config: &Config, pipeline: &Pipeline, root: &CancelToken) -> Result<()> {
    match &cli.command {
        Command::Probe { input, json } => {
            let ctx = RequestContext::new().with_cancel(root.clone());
            let streams = pipeline
                .probe_request(input, &ctx)
                .await
                .with_context(|| format!("Failed to probe {}", input.display()))?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&streams)?);
            } else {
                for stream in &streams {
                    println!("{}", stream.describe());
                }
                let counts = KindCounts::of(&streams);
                info!(
                    "{} streams: {} video, {} audio, {} subtitle, {} other",
                    counts.total(),
                    counts.video,
                    counts.audio,
                    counts.subtitle,
                    counts.other
                );
            }
        }
        Command::Extract {
            input,
            stream,
            output,
        } => {
            let (tx, rx) = mpsc::unbounded_channel();
            let reporter = spawn_progress_reporter(rx);
            let ctx = RequestContext::new()
                .with_cancel(root.clone())
                .with_progress(tx);

            let result = pipeline
                .extract_index_into(input, *stream, &output.dir, &ctx)
                .await;
            drop(ctx);
            let _ = reporter.await;

            let delivered = result
                .with_context(|| format!("Failed to extract stream {} of {}", stream, input.display()))?;
            info!("Saved {}", delivered.path.display());
            println!("{}", delivered.path.display());
        }
        Command::Batch { input, output, .. } => {
            let (tx, rx) = mpsc::unbounded_channel();
            let reporter = spawn_progress_reporter(rx);
            let ctx = RequestContext::new()
                .with_cancel(root.clone())
                .with_progress(tx);

            let result = pipeline.extract_all_into(input, &output.dir, &ctx).await;
            drop(ctx);
            let _ = reporter.await;

            let (delivered, stats) =
                result.with_context(|| format!("Batch extraction of {} failed", input.display()))?;

            info!(
                "Extracted {} of {} streams ({} failed, {} skipped) in {:.2}s, avg {:.2}s per stream",
                stats.extracted,
                stats.total_streams,
                stats.failed,
                stats.skipped,
                stats.total_time.as_secs_f64(),
                stats.avg_stream_time.as_secs_f64()
            );
            println!("{}", delivered.to_json(config.url_base.as_deref())?);
        }
        Command::Sweep => {
            let report = pipeline.sweep(root).await;
            println!(
                "Removed {} files ({} failed, {} in use) from {}",
                report.removed,
                report.failed,
                report.skipped_active,
                pipeline.temp().dir().display()
            );
        }
        Command::Interactive { output } => {
            let ctx = RequestContext::new().with_cancel(root.clone());
            run_interactive(pipeline, &ctx, &output.dir).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Load and validate configuration
    let mut config = Config::load().context("Failed to load configuration")?;
    apply_cli_overrides(&mut config, &cli)?;
    config.validate().context("Configuration validation failed")?;

    let pipeline = Pipeline::new(&config);

    let root = CancelToken::new();
    let handler_token = root.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, cancelling...");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    if !matches!(cli.command, Command::Sweep) {
        pipeline
            .check_toolchain()
            .await
            .context("FFmpeg toolchain is not usable")?;
        // Reclaim files orphaned by earlier runs; not awaited.
        pipeline.spawn_sweep(root.clone());
    }

    let result = run(&cli, &config, &pipeline, &root).await;

    if !matches!(cli.command, Command::Sweep) {
        let shutdown = pipeline.spawn_sweep(CancelToken::new());
        if tokio::time::timeout(SHUTDOWN_SWEEP_GRACE, shutdown).await.is_err() {
            warn!("Shutdown sweep still running, exiting without it");
        }
    }

    result
}
