//! Integration tests for streamsift
//!
//! These tests exercise components against real files in temporary
//! directories without requiring FFmpeg to be installed.

use streamsift::config::{BatchPolicy, Config, VideoPolicy};
use streamsift::media::{Artifact, ArtifactKind};
use streamsift::subtitle::{normalize_file, normalize_text, SubtitleFormat};
use streamsift::temp::{self, TempArtifacts, DEFAULT_MARKER};
use streamsift::CancelToken;

use std::collections::{HashMap, HashSet};
use std::fs;
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Config Integration Tests
// ============================================================================

mod config_tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.marker, "streamsift");
        assert_eq!(config.batch_policy, BatchPolicy::AllOrNothing);
        assert_eq!(config.video_policy, VideoPolicy::Copy);
        assert_eq!(config.subtitle_format, SubtitleFormat::Vtt);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("STREAMSIFT_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
            ("STREAMSIFT_CONCURRENCY", "8"),
            ("STREAMSIFT_BATCH_POLICY", "partial"),
            ("STREAMSIFT_SUBTITLE_FORMAT", "srt"),
            ("STREAMSIFT_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.toolchain.ffmpeg,
            std::path::PathBuf::from("/opt/ffmpeg/bin/ffmpeg")
        );
        assert_eq!(config.toolchain.ffprobe, std::path::PathBuf::from("ffprobe"));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.batch_policy, BatchPolicy::Partial);
        assert_eq!(config.subtitle_format, SubtitleFormat::Srt);
        assert_eq!(config.timeout_secs, None);
    }

    #[test]
    fn test_marker_validation() {
        let mut config = Config::default();
        config.marker = String::new();
        assert!(config.validate().is_err());

        config.marker = "a/b".to_string();
        assert!(config.validate().is_err());

        config.marker = "sift".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            concurrency = 2
            video_policy = "baseline"

            [toolchain]
            ffprobe = "/usr/local/bin/ffprobe"
            "#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 2);
        assert_eq!(config.video_policy, VideoPolicy::Baseline);
        assert_eq!(config.toolchain.ffmpeg, std::path::PathBuf::from("ffmpeg"));
        assert_eq!(config.marker, DEFAULT_MARKER);
    }
}

// ============================================================================
// Temp Naming Tests
// ============================================================================

mod naming_tests {
    use super::*;

    #[test]
    fn test_many_sessions_have_unique_paths() {
        let temp = TempArtifacts::new("/tmp/sift", DEFAULT_MARKER, SubtitleFormat::Vtt);
        let mut seen = HashSet::new();

        for _ in 0..500 {
            let session = temp.begin_session();
            let path = session.allocate_path(ArtifactKind::Audio, 1);
            assert!(seen.insert(path));
        }
    }

    #[test]
    fn test_paths_carry_marker_kind_and_index() {
        let temp = TempArtifacts::new("/tmp/sift", "custom", SubtitleFormat::Srt);
        let session = temp.begin_session();
        let path = session.allocate_path(ArtifactKind::Subtitle, 5);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();

        assert!(name.starts_with("custom-"));
        assert!(name.ends_with("_sub_5.srt"));
        assert_eq!(path.parent().unwrap(), std::path::Path::new("/tmp/sift"));
    }
}

// ============================================================================
// Subtitle Normalizer Tests
// ============================================================================

mod normalizer_tests {
    use super::*;

    const VTT: &str = "WEBVTT\n\n1\n00:00:01.000 --> 00:00:02.000\nHe said \"hello\"\n\n2\n00:00:03.000 --> 00:00:04.000\nNo quotes here\n";

    #[tokio::test]
    async fn test_normalize_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.vtt");
        fs::write(&path, VTT).unwrap();

        let report = assert_ok!(normalize_file(&path, SubtitleFormat::Vtt).await);
        assert_eq!(report.modified_lines, 1);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), VTT.lines().count());
        assert!(content.ends_with('\n'));
        assert!(content.contains("He said hello\n"));
        assert!(content.starts_with("WEBVTT\n"));
        assert!(content.contains("00:00:01.000 --> 00:00:02.000\n"));
    }

    #[tokio::test]
    async fn test_normalize_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.vtt");
        fs::write(&path, VTT).unwrap();

        normalize_file(&path, SubtitleFormat::Vtt).await.unwrap();
        let once = fs::read(&path).unwrap();

        let report = normalize_file(&path, SubtitleFormat::Vtt).await.unwrap();
        assert_eq!(report.modified_lines, 0);
        assert_eq!(fs::read(&path).unwrap(), once);
    }

    #[tokio::test]
    async fn test_normalize_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = normalize_file(&dir.path().join("gone.vtt"), SubtitleFormat::Vtt)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("post-processing"));
    }

    #[test]
    fn test_srt_has_no_header_exemption() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\n\"WEBVTT\"\n";
        assert_eq!(
            normalize_text(srt, SubtitleFormat::Srt),
            "1\n00:00:01,000 --> 00:00:02,000\nWEBVTT\n"
        );
    }
}

// ============================================================================
// Sweep Tests
// ============================================================================

mod sweep_tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_removes_only_marked_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("streamsift-123_audio_0.aac"), b"a").unwrap();
        fs::write(dir.path().join("streamsift-123_sub_2.vtt"), b"s").unwrap();
        fs::create_dir(dir.path().join("streamsift-old")).unwrap();
        fs::write(dir.path().join("streamsift-old").join("inner"), b"x").unwrap();
        fs::write(dir.path().join("unrelated.txt"), b"keep").unwrap();

        let temp = TempArtifacts::new(dir.path(), DEFAULT_MARKER, SubtitleFormat::Vtt);
        let report = temp.sweep(&CancelToken::new()).await;

        assert_eq!(report.removed, 3);
        assert_eq!(report.failed, 0);
        assert!(dir.path().join("unrelated.txt").exists());
        assert!(!dir.path().join("streamsift-123_audio_0.aac").exists());
        assert!(!dir.path().join("streamsift-old").exists());
    }

    #[tokio::test]
    async fn test_sweep_skips_active_session() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempArtifacts::new(dir.path(), DEFAULT_MARKER, SubtitleFormat::Vtt);

        let session = temp.begin_session();
        let live = session.allocate_path(ArtifactKind::Audio, 1);
        fs::write(&live, b"in progress").unwrap();
        fs::write(dir.path().join("streamsift-1-2-3_audio_1.aac"), b"stale").unwrap();

        let report = temp.sweep(&CancelToken::new()).await;
        assert_eq!(report.removed, 1);
        assert_eq!(report.skipped_active, 1);
        assert!(live.exists());

        drop(session);
        let report = temp.sweep(&CancelToken::new()).await;
        assert_eq!(report.removed, 1);
        assert!(!live.exists());
    }

    #[tokio::test]
    async fn test_sweep_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempArtifacts::new(dir.path().join("nope"), DEFAULT_MARKER, SubtitleFormat::Vtt);
        let report = temp.sweep(&CancelToken::new()).await;
        assert_eq!(report.removed, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_cancelled_sweep_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("streamsift-9_audio_0.aac"), b"a").unwrap();

        let temp = TempArtifacts::new(dir.path(), DEFAULT_MARKER, SubtitleFormat::Vtt);
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = temp.sweep(&cancel).await;

        assert_eq!(report.removed, 0);
        assert!(dir.path().join("streamsift-9_audio_0.aac").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sweep_continues_past_delete_failures() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("streamsift-1_audio_0.aac"), b"a").unwrap();
        fs::write(dir.path().join("streamsift-2_sub_1.vtt"), b"s").unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();

        // Root ignores directory permissions, so nothing would fail.
        if fs::write(dir.path().join("writable"), b"").is_ok() {
            fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
            eprintln!("Skipping test: running with permission overrides");
            return;
        }

        let temp = TempArtifacts::new(dir.path(), DEFAULT_MARKER, SubtitleFormat::Vtt);
        let report = temp.sweep(&CancelToken::new()).await;
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(report.removed, 0);
        assert!(dir.path().join("streamsift-1_audio_0.aac").exists());
        assert!(dir.path().join("streamsift-2_sub_1.vtt").exists());
    }
}

// ============================================================================
// Delivery Tests
// ============================================================================

mod delivery_tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_copies_with_friendly_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let src = temp_dir.path().join("streamsift-1_audio_2.aac");
        fs::write(&src, b"audio").unwrap();

        let artifact = Artifact {
            path: src.clone(),
            owner_prefix: "streamsift-1".to_string(),
            kind: ArtifactKind::Audio,
            stream_index: 2,
        };
        let delivered =
            assert_ok!(temp::deliver(&artifact, &out_dir.path().join("nested"), "movie").await);

        assert_eq!(
            delivered.path,
            out_dir.path().join("nested").join("movie.audio2.aac")
        );
        assert_eq!(fs::read(&delivered.path).unwrap(), b"audio");
        assert!(src.exists());
        assert_eq!(delivered.stream_index, 2);
    }

    #[tokio::test]
    async fn test_deliver_missing_artifact() {
        let out_dir = tempfile::tempdir().unwrap();
        let artifact = Artifact {
            path: out_dir.path().join("missing.vtt"),
            owner_prefix: "streamsift-1".to_string(),
            kind: ArtifactKind::Subtitle,
            stream_index: 0,
        };
        let err = assert_err!(temp::deliver(&artifact, out_dir.path(), "movie").await);
        assert!(err.to_string().contains("File not found"));
    }
}
