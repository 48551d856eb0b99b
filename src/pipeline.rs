use crate::cancel::CancelToken;
use crate::config::{BatchPolicy, Config, VideoPolicy};
use crate::error::{Result, SiftError};
use crate::media::{
    artifact_kind_for, build_extraction_command, build_video_command, check_tool, execute, probe,
    Artifact, ArtifactKind, CommandRunner, ProcessRunner, StreamDescriptor, Toolchain,
};
use crate::subtitle::{normalize_file, SubtitleFormat};
use crate::temp::{self, Session, SweepReport, TempArtifacts};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the extraction pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of extractions running at once in a batch.
    pub concurrency: usize,
    /// Failure handling for batches.
    pub batch_policy: BatchPolicy,
    /// Copy or normalize the batch video stream.
    pub video_policy: VideoPolicy,
    /// Target format for extracted subtitles.
    pub subtitle_format: SubtitleFormat,
    /// Deadline applied to every request.
    pub timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_policy: BatchPolicy::default(),
            video_policy: VideoPolicy::default(),
            subtitle_format: SubtitleFormat::default(),
            timeout: None,
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            batch_policy: config.batch_policy,
            video_policy: config.video_policy,
            subtitle_format: config.subtitle_format,
            timeout: config.timeout(),
        }
    }
}

/// Advisory notifications about a running request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Probed { source: PathBuf, streams: usize },
    StreamStarted { index: u32, kind: ArtifactKind },
    StreamFinished { index: u32, kind: ArtifactKind },
    StreamFailed { index: u32, kind: ArtifactKind, message: String },
    Completed { artifacts: usize },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Per-call cancellation and progress channel.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub cancel: CancelToken,
    pub progress: Option<ProgressSender>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Send a progress event. Nobody listening is not an error.
    pub fn notify(&self, event: ProgressEvent) {
        if let Some(ref tx) = self.progress {
            if tx.send(event).is_err() {
                debug!("Progress receiver dropped");
            }
        }
    }
}

/// Entry point of the extraction pipeline.
pub struct Pipeline {
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) toolchain: Toolchain,
    pub(crate) temp: TempArtifacts,
    pub(crate) config: PipelineConfig,
}

impl Pipeline {
    /// Pipeline running real FFmpeg processes as configured.
    pub fn new(config: &Config) -> Self {
        Self::with_runner(
            Arc::new(ProcessRunner),
            config.toolchain.clone(),
            TempArtifacts::new(config.temp_dir(), config.marker.clone(), config.subtitle_format),
            PipelineConfig::from(config),
        )
    }

    pub fn with_runner(
        runner: Arc<dyn CommandRunner>,
        toolchain: Toolchain,
        temp: TempArtifacts,
        config: PipelineConfig,
    ) -> Self {
        debug!(
            "Pipeline using {} runner, temp dir {}",
            runner.name(),
            temp.dir().display()
        );
        Self {
            runner,
            toolchain,
            temp,
            config,
        }
    }

    pub fn temp(&self) -> &TempArtifacts {
        &self.temp
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Verify that both FFmpeg and FFprobe can be launched.
    pub async fn check_toolchain(&self) -> Result<()> {
        check_tool(self.runner.as_ref(), &self.toolchain.ffmpeg).await?;
        check_tool(self.runner.as_ref(), &self.toolchain.ffprobe).await?;
        Ok(())
    }

    /// Cancel token for one request, with the configured deadline applied.
    pub(crate) fn request_token(&self, ctx: &RequestContext) -> CancelToken {
        match self.config.timeout {
            Some(timeout) => ctx.cancel.with_timeout(timeout),
            None => ctx.cancel.clone(),
        }
    }

    pub(crate) async fn probe_with(
        &self,
        source: &Path,
        cancel: &CancelToken,
        ctx: &RequestContext,
    ) -> Result<Vec<StreamDescriptor>> {
        let streams = probe(self.runner.as_ref(), &self.toolchain, source, cancel).await?;
        ctx.notify(ProgressEvent::Probed {
            source: source.to_path_buf(),
            streams: streams.len(),
        });
        Ok(streams)
    }

    /// List the streams of a container.
    pub async fn probe_request(
        &self,
        source: &Path,
        ctx: &RequestContext,
    ) -> Result<Vec<StreamDescriptor>> {
        let cancel = self.request_token(ctx);
        self.probe_with(source, &cancel, ctx).await
    }

    /// Extract one audio or subtitle stream into a fresh temp artifact.
    ///
    /// Each call runs in its own session, so concurrent calls never share paths.
    pub async fn extract_one(
        &self,
        source: &Path,
        stream: &StreamDescriptor,
        ctx: &RequestContext,
    ) -> Result<Artifact> {
        let cancel = self.request_token(ctx);
        self.extract_stream(source, stream, &cancel, ctx, None).await
    }

    /// [`extract_one`](Pipeline::extract_one), copying the artifact into `dest_dir`.
    ///
    /// The copy happens before the session ends, so a concurrent sweep cannot
    /// reclaim the temp file first. Returns the delivered artifact.
    pub async fn extract_one_into(
        &self,
        source: &Path,
        stream: &StreamDescriptor,
        dest_dir: &Path,
        ctx: &RequestContext,
    ) -> Result<Artifact> {
        let cancel = self.request_token(ctx);
        self.extract_stream(source, stream, &cancel, ctx, Some(dest_dir))
            .await
    }

    /// Probe `source` and extract the stream with the given index.
    pub async fn extract_index(
        &self,
        source: &Path,
        index: u32,
        ctx: &RequestContext,
    ) -> Result<Artifact> {
        self.extract_index_with(source, index, ctx, None).await
    }

    /// [`extract_index`](Pipeline::extract_index), delivering into `dest_dir`.
    pub async fn extract_index_into(
        &self,
        source: &Path,
        index: u32,
        dest_dir: &Path,
        ctx: &RequestContext,
    ) -> Result<Artifact> {
        self.extract_index_with(source, index, ctx, Some(dest_dir))
            .await
    }

    /// Probe and extraction share one token, so the timeout covers both.
    async fn extract_index_with(
        &self,
        source: &Path,
        index: u32,
        ctx: &RequestContext,
        dest_dir: Option<&Path>,
    ) -> Result<Artifact> {
        let cancel = self.request_token(ctx);
        let streams = self.probe_with(source, &cancel, ctx).await?;
        let stream = streams
            .iter()
            .find(|s| s.index == index)
            .ok_or_else(|| SiftError::StreamNotFound {
                path: source.to_path_buf(),
                index,
            })?;
        self.extract_stream(source, stream, &cancel, ctx, dest_dir)
            .await
    }

    async fn extract_stream(
        &self,
        source: &Path,
        stream: &StreamDescriptor,
        cancel: &CancelToken,
        ctx: &RequestContext,
        dest_dir: Option<&Path>,
    ) -> Result<Artifact> {
        let kind = artifact_kind_for(stream)?;
        let session = self.temp.begin_session();

        ctx.notify(ProgressEvent::StreamStarted {
            index: stream.index,
            kind,
        });

        let result = async {
            let artifact = self
                .extract_in_session(&session, source, stream, cancel)
                .await?;
            match dest_dir {
                Some(dir) => temp::deliver(&artifact, dir, &temp::source_stem(source)).await,
                None => Ok(artifact),
            }
        }
        .await;
        drop(session);

        match &result {
            Ok(_) => ctx.notify(ProgressEvent::StreamFinished {
                index: stream.index,
                kind,
            }),
            Err(e) => ctx.notify(ProgressEvent::StreamFailed {
                index: stream.index,
                kind,
                message: e.to_string(),
            }),
        }
        result
    }

    /// Build, run and post-process one audio or subtitle extraction.
    pub(crate) async fn extract_in_session(
        &self,
        session: &Session<'_>,
        source: &Path,
        stream: &StreamDescriptor,
        cancel: &CancelToken,
    ) -> Result<Artifact> {
        let kind = artifact_kind_for(stream)?;
        cancel.check()?;

        let output = session.allocate_path(kind, stream.index);
        let extraction = build_extraction_command(
            &self.toolchain,
            source,
            stream,
            &output,
            self.config.subtitle_format,
        )?;
        let artifact = execute(
            self.runner.as_ref(),
            &extraction,
            session.owner_prefix(),
            cancel,
        )
        .await?;

        if kind == ArtifactKind::Subtitle {
            cancel.check()?;
            // Best effort: the artifact is returned even if this fails.
            if let Err(e) = normalize_file(&artifact.path, self.config.subtitle_format).await {
                warn!("{}", e);
            }
        }

        Ok(artifact)
    }

    pub(crate) async fn extract_video_in_session(
        &self,
        session: &Session<'_>,
        source: &Path,
        stream: &StreamDescriptor,
        cancel: &CancelToken,
    ) -> Result<Artifact> {
        cancel.check()?;
        let output = session.allocate_path(ArtifactKind::Video, stream.index);
        let extraction = build_video_command(
            &self.toolchain,
            source,
            stream,
            &output,
            self.config.video_policy,
        )?;
        execute(
            self.runner.as_ref(),
            &extraction,
            session.owner_prefix(),
            cancel,
        )
        .await
    }

    /// Sweep the temp directory, skipping sessions in flight.
    pub async fn sweep(&self, cancel: &CancelToken) -> SweepReport {
        self.temp.sweep(cancel).await
    }

    /// Start a sweep in the background without waiting for it.
    pub fn spawn_sweep(&self, cancel: CancelToken) -> JoinHandle<SweepReport> {
        let temp = self.temp.clone();
        info!("Starting background sweep of {}", temp.dir().display());
        tokio::spawn(async move { temp.sweep(&cancel).await })
    }
}
