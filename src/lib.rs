pub mod batch;
pub mod cancel;
pub mod config;
pub mod error;
pub mod interactive;
pub mod manifest;
pub mod media;
pub mod pipeline;
pub mod subtitle;
pub mod temp;

pub use batch::{BatchPlan, BatchStats};
pub use cancel::CancelToken;
pub use config::{BatchPolicy, Config, VideoPolicy};
pub use error::{Result, SiftError};
pub use manifest::{LabeledArtifact, Manifest, ManifestDocument, StreamFailure};
pub use media::{Artifact, ArtifactKind, StreamDescriptor, StreamKind};
pub use pipeline::{Pipeline, PipelineConfig, ProgressEvent, ProgressSender, RequestContext};
pub use subtitle::SubtitleFormat;
pub use temp::{SweepReport, TempArtifacts};
