use crate::cancel::CancelToken;
use crate::config::BatchPolicy;
use crate::error::{Result, SiftError};
use crate::manifest::{track_label, LabeledArtifact, Manifest, StreamFailure};
use crate::media::{Artifact, ArtifactKind, StreamDescriptor, StreamKind};
use crate::pipeline::{Pipeline, ProgressEvent, RequestContext};
use crate::temp::Session;
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Streams of one source partitioned by what a batch does with them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    pub video: Option<StreamDescriptor>,
    pub audio: Vec<StreamDescriptor>,
    pub subtitles: Vec<StreamDescriptor>,
    pub skipped: Vec<StreamDescriptor>,
}

impl BatchPlan {
    /// Partition streams, keeping emission order inside each group.
    ///
    /// Only the first video stream is planned; later video streams and
    /// streams of unknown kind are skipped.
    pub fn from_streams(streams: &[StreamDescriptor]) -> Self {
        let mut plan = Self::default();
        for stream in streams {
            match stream.kind {
                StreamKind::Video if plan.video.is_none() => plan.video = Some(stream.clone()),
                StreamKind::Video | StreamKind::Other => plan.skipped.push(stream.clone()),
                StreamKind::Audio => plan.audio.push(stream.clone()),
                StreamKind::Subtitle => plan.subtitles.push(stream.clone()),
            }
        }
        plan
    }

    fn jobs(&self) -> Vec<Job> {
        let video = self.video.iter().map(|s| Job {
            kind: ArtifactKind::Video,
            position: 0,
            stream: s.clone(),
        });
        let audio = self.audio.iter().enumerate().map(|(position, s)| Job {
            kind: ArtifactKind::Audio,
            position,
            stream: s.clone(),
        });
        let subtitles = self.subtitles.iter().enumerate().map(|(position, s)| Job {
            kind: ArtifactKind::Subtitle,
            position,
            stream: s.clone(),
        });
        video.chain(audio).chain(subtitles).collect()
    }

    pub fn job_count(&self) -> usize {
        usize::from(self.video.is_some()) + self.audio.len() + self.subtitles.len()
    }
}

/// Statistics from one batch run.
#[derive(Debug, Clone)]
pub struct BatchStats {
    pub total_streams: usize,
    pub extracted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_time: Duration,
    pub avg_stream_time: Duration,
}

#[derive(Debug)]
struct Job {
    kind: ArtifactKind,
    /// Position among streams of the same kind.
    position: usize,
    stream: StreamDescriptor,
}

struct JobOutcome {
    job: Job,
    result: Result<Artifact>,
    elapsed: Duration,
}

impl Pipeline {
    /// Probe a source and extract its video, every audio and every subtitle stream.
    pub async fn extract_all(&self, source: &Path, ctx: &RequestContext) -> Result<Manifest> {
        let (manifest, _stats) = self.extract_all_with_stats(source, ctx).await?;
        Ok(manifest)
    }

    /// [`extract_all`](Pipeline::extract_all), also returning batch statistics.
    pub async fn extract_all_with_stats(
        &self,
        source: &Path,
        ctx: &RequestContext,
    ) -> Result<(Manifest, BatchStats)> {
        self.run_batch(source, ctx, None).await
    }

    /// Batch extraction whose artifacts are copied into `dest_dir` before the
    /// batch session ends. The manifest points at the delivered copies.
    pub async fn extract_all_into(
        &self,
        source: &Path,
        dest_dir: &Path,
        ctx: &RequestContext,
    ) -> Result<(Manifest, BatchStats)> {
        self.run_batch(source, ctx, Some(dest_dir)).await
    }

    async fn run_batch(
        &self,
        source: &Path,
        ctx: &RequestContext,
        dest_dir: Option<&Path>,
    ) -> Result<(Manifest, BatchStats)> {
        let start_time = Instant::now();
        let cancel = self.request_token(ctx);

        let streams = self.probe_with(source, &cancel, ctx).await?;
        let plan = BatchPlan::from_streams(&streams);
        for stream in &plan.skipped {
            debug!("Skipping stream {}", stream.describe());
        }

        info!(
            "Extracting {} streams from {} with concurrency {} ({} policy)",
            plan.job_count(),
            source.display(),
            self.config.concurrency,
            self.config.batch_policy
        );

        let session = self.temp.begin_session();
        let semaphore = Semaphore::new(self.config.concurrency.max(1));

        let mut jobs = FuturesUnordered::new();
        for job in plan.jobs() {
            jobs.push(self.run_job(&session, source, job, &semaphore, &cancel, ctx));
        }

        let mut done: Vec<(Job, Artifact)> = Vec::new();
        let mut failures: Vec<StreamFailure> = Vec::new();
        let mut total_job_time = Duration::ZERO;

        while let Some(JobOutcome { job, result, elapsed }) = jobs.next().await {
            total_job_time += elapsed;
            match result {
                Ok(artifact) => {
                    debug!("Stream {} completed in {}ms", job.stream.index, elapsed.as_millis());
                    ctx.notify(ProgressEvent::StreamFinished {
                        index: job.stream.index,
                        kind: job.kind,
                    });
                    done.push((job, artifact));
                }
                Err(e) => {
                    warn!("Stream {} failed: {}", job.stream.index, e);
                    ctx.notify(ProgressEvent::StreamFailed {
                        index: job.stream.index,
                        kind: job.kind,
                        message: e.to_string(),
                    });

                    if e.is_cancellation() || self.config.batch_policy == BatchPolicy::AllOrNothing {
                        // Dropping the remaining jobs kills their processes.
                        if !jobs.is_empty() {
                            info!("Abandoning {} in-flight extractions", jobs.len());
                        }
                        return Err(e);
                    }

                    failures.push(StreamFailure {
                        stream_index: job.stream.index,
                        kind: job.kind,
                        error: e.to_string(),
                    });
                }
            }
        }
        drop(jobs);

        let manifest = assemble_manifest(source, done, failures);
        // Still inside the session: a sweep cannot reclaim the temp files yet.
        let manifest = match dest_dir {
            Some(dir) => manifest.deliver_to(dir).await?,
            None => manifest,
        };
        drop(session);
        let finished = manifest.artifacts().count();
        ctx.notify(ProgressEvent::Completed {
            artifacts: finished,
        });

        let attempted = finished + manifest.failures.len();
        let total_time = start_time.elapsed();
        let stats = BatchStats {
            total_streams: streams.len(),
            extracted: finished,
            failed: manifest.failures.len(),
            skipped: plan.skipped.len(),
            total_time,
            avg_stream_time: if attempted > 0 {
                total_job_time / attempted as u32
            } else {
                Duration::ZERO
            },
        };

        info!(
            "Batch complete: {}/{} streams extracted in {:.2}s",
            stats.extracted,
            attempted,
            total_time.as_secs_f64()
        );

        Ok((manifest, stats))
    }

    async fn run_job(
        &self,
        session: &Session<'_>,
        source: &Path,
        job: Job,
        semaphore: &Semaphore,
        cancel: &CancelToken,
        ctx: &RequestContext,
    ) -> JobOutcome {
        let started = Instant::now();

        let result = async {
            // Waits while the group is at its concurrency limit.
            let _permit = semaphore.acquire().await.map_err(|_| SiftError::Cancelled)?;
            ctx.notify(ProgressEvent::StreamStarted {
                index: job.stream.index,
                kind: job.kind,
            });

            match job.kind {
                ArtifactKind::Video => {
                    self.extract_video_in_session(session, source, &job.stream, cancel)
                        .await
                }
                ArtifactKind::Audio | ArtifactKind::Subtitle => {
                    self.extract_in_session(session, source, &job.stream, cancel)
                        .await
                }
            }
        }
        .await;

        JobOutcome {
            job,
            result,
            elapsed: started.elapsed(),
        }
    }
}

/// Order finished jobs by partition position and label them.
fn assemble_manifest(
    source: &Path,
    mut done: Vec<(Job, Artifact)>,
    mut failures: Vec<StreamFailure>,
) -> Manifest {
    done.sort_by_key(|(job, _)| job.position);
    failures.sort_by_key(|f| f.stream_index);

    let mut manifest = Manifest {
        source: source.to_path_buf(),
        video: None,
        audio: Vec::new(),
        subtitles: Vec::new(),
        failures,
    };

    for (job, artifact) in done {
        match job.kind {
            ArtifactKind::Video => manifest.video = Some(artifact),
            ArtifactKind::Audio => manifest.audio.push(LabeledArtifact {
                label: track_label(&job.stream, job.kind, job.position),
                artifact,
            }),
            ArtifactKind::Subtitle => manifest.subtitles.push(LabeledArtifact {
                label: track_label(&job.stream, job.kind, job.position),
                artifact,
            }),
        }
    }

    manifest
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn stream(index: u32, kind: StreamKind) -> StreamDescriptor {
        StreamDescriptor {
            index,
            kind,
            codec_name: "x".to_string(),
            title: None,
            language: None,
        }
    }

    fn artifact(kind: ArtifactKind, index: u32) -> Artifact {
        Artifact {
            path: PathBuf::from(format!("/tmp/streamsift-1_{}_{}", kind.tag(), index)),
            owner_prefix: "streamsift-1".to_string(),
            kind,
            stream_index: index,
        }
    }

    #[test]
    fn test_plan_partitions_in_order() {
        let streams = vec![
            stream(0, StreamKind::Video),
            stream(1, StreamKind::Audio),
            stream(2, StreamKind::Subtitle),
            stream(3, StreamKind::Audio),
            stream(4, StreamKind::Video),
            stream(5, StreamKind::Other),
        ];
        let plan = BatchPlan::from_streams(&streams);

        assert_eq!(plan.video.as_ref().map(|s| s.index), Some(0));
        assert_eq!(plan.audio.iter().map(|s| s.index).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(plan.subtitles.len(), 1);
        assert_eq!(plan.skipped.iter().map(|s| s.index).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(plan.job_count(), 4);
    }

    #[test]
    fn test_jobs_use_partition_positions() {
        let streams = vec![
            stream(0, StreamKind::Video),
            stream(1, StreamKind::Audio),
            stream(2, StreamKind::Subtitle),
            stream(3, StreamKind::Audio),
        ];
        let jobs = BatchPlan::from_streams(&streams).jobs();
        let positions: Vec<(u32, usize)> =
            jobs.iter().map(|j| (j.stream.index, j.position)).collect();
        assert_eq!(positions, vec![(0, 0), (1, 0), (3, 1), (2, 0)]);
    }

    #[test]
    fn test_assemble_restores_order_and_labels() {
        let mut first = stream(1, StreamKind::Audio);
        first.title = Some("Commentary".to_string());
        let second = stream(3, StreamKind::Audio);

        let done = vec![
            (
                Job { kind: ArtifactKind::Audio, position: 1, stream: second },
                artifact(ArtifactKind::Audio, 3),
            ),
            (
                Job { kind: ArtifactKind::Audio, position: 0, stream: first },
                artifact(ArtifactKind::Audio, 1),
            ),
        ];

        let manifest = assemble_manifest(Path::new("movie.mkv"), done, Vec::new());
        let labels: Vec<&str> = manifest.audio.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["Commentary", "Audio 2"]);
        assert_eq!(manifest.audio[0].artifact.stream_index, 1);
        assert!(manifest.video.is_none());
    }
}
