use crate::error::{Result, SiftError};
use crate::media::Toolchain;
use crate::subtitle::SubtitleFormat;
use crate::temp::DEFAULT_MARKER;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What a batch does when one stream fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchPolicy {
    /// The first failure fails the whole batch.
    #[default]
    AllOrNothing,
    /// Failures are recorded in the manifest and the rest is returned.
    Partial,
}

impl std::fmt::Display for BatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchPolicy::AllOrNothing => write!(f, "all-or-nothing"),
            BatchPolicy::Partial => write!(f, "partial"),
        }
    }
}

impl std::str::FromStr for BatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all-or-nothing" | "strict" => Ok(BatchPolicy::AllOrNothing),
            "partial" => Ok(BatchPolicy::Partial),
            _ => Err(format!(
                "Unknown batch policy: {}. Use 'all-or-nothing' or 'partial'",
                s
            )),
        }
    }
}

/// How the video stream of a batch is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoPolicy {
    /// Always stream-copy.
    #[default]
    Copy,
    /// Re-encode to the baseline codec unless the stream already uses it.
    Baseline,
}

impl std::fmt::Display for VideoPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoPolicy::Copy => write!(f, "copy"),
            VideoPolicy::Baseline => write!(f, "baseline"),
        }
    }
}

impl std::str::FromStr for VideoPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copy" => Ok(VideoPolicy::Copy),
            "baseline" => Ok(VideoPolicy::Baseline),
            _ => Err(format!("Unknown video policy: {}. Use 'copy' or 'baseline'", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub toolchain: Toolchain,
    /// Shared temp directory; the system temp directory when unset.
    pub temp_dir: Option<PathBuf>,
    /// Prefix identifying pipeline files for the sweep.
    pub marker: String,
    pub concurrency: usize,
    pub batch_policy: BatchPolicy,
    pub video_policy: VideoPolicy,
    pub subtitle_format: SubtitleFormat,
    /// Per-request deadline in seconds.
    pub timeout_secs: Option<u64>,
    /// Base URL prepended to artifact file names in manifests.
    pub url_base: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            toolchain: Toolchain::default(),
            temp_dir: None,
            marker: DEFAULT_MARKER.to_string(),
            concurrency: 4,
            batch_policy: BatchPolicy::default(),
            video_policy: VideoPolicy::default(),
            subtitle_format: SubtitleFormat::default(),
            timeout_secs: None,
            url_base: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    SiftError::Config(format!("{}: {}", config_path.display(), e))
                })?;
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override fields from environment-style lookups. Unparseable values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("STREAMSIFT_FFMPEG") {
            self.toolchain.ffmpeg = PathBuf::from(path);
        }
        if let Some(path) = lookup("STREAMSIFT_FFPROBE") {
            self.toolchain.ffprobe = PathBuf::from(path);
        }
        if let Some(dir) = lookup("STREAMSIFT_TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(dir));
        }
        if let Some(c) = lookup("STREAMSIFT_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.concurrency = c;
        }
        if let Some(p) = lookup("STREAMSIFT_BATCH_POLICY").and_then(|v| v.parse().ok()) {
            self.batch_policy = p;
        }
        if let Some(p) = lookup("STREAMSIFT_VIDEO_POLICY").and_then(|v| v.parse().ok()) {
            self.video_policy = p;
        }
        if let Some(f) = lookup("STREAMSIFT_SUBTITLE_FORMAT").and_then(|v| v.parse().ok()) {
            self.subtitle_format = f;
        }
        if let Some(t) = lookup("STREAMSIFT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = Some(t);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(SiftError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        // The sweep deletes everything starting with the marker.
        if self.marker.is_empty() {
            return Err(SiftError::Config("Temp marker must not be empty".to_string()));
        }
        if self.marker.contains(['/', '\\']) {
            return Err(SiftError::Config(format!(
                "Temp marker '{}' must not contain path separators",
                self.marker
            )));
        }

        if self.timeout_secs == Some(0) {
            return Err(SiftError::Config(
                "Timeout must be greater than 0 seconds".to_string(),
            ));
        }

        Ok(())
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("streamsift").join("config.toml"))
    }
}
