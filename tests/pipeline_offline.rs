// Lyric Director Offline Pipeline Tests
// Copyright (c) 2026 Xing_The_Creator | Lyric Director

use async_trait::async_trait;
use lyric_director::agent::core::{LyricDirector, PipelineError, SkipTo};
use lyric_director::agent::lyrics_source::{LyricsResult, LyricsSource};
use lyric_director::agent::recovery::{find_song_workspace, TimelineStage};
use lyric_director::agent::source_tools::{AudioSource, SourceError};
use lyric_director::agent::timeline::{LyricLine, SongInfo};
use lyric_director::config::DirectorConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FakeLyrics {
    lines: Vec<LyricLine>,
}

#[async_trait]
impl LyricsSource for FakeLyrics {
    async fn fetch(&self, _song: &SongInfo) -> Result<Option<LyricsResult>, SourceError> {
        if self.lines.is_empty() {
            return Ok(Some(LyricsResult {
                synced: Vec::new(),
                plain: "words without timing".to_string(),
            }));
        }
        Ok(Some(LyricsResult {
            synced: self.lines.clone(),
            plain: String::new(),
        }))
    }
}

#[derive(Default)]
struct FakeAudio {
    downloads: AtomicU32,
}

#[async_trait]
impl AudioSource for FakeAudio {
    async fn search(&self, query: &str) -> Result<SongInfo, SourceError> {
        if query.contains("nothing") {
            return Err(SourceError::NotFound(query.to_string()));
        }
        Ok(SongInfo {
            title: "Paper Boats".to_string(),
            artists: vec!["The Harbor".to_string()],
            video_id: "abc123".to_string(),
            album: None,
            duration: Some(40.0),
        })
    }

    async fn download_audio(&self, song: &SongInfo, dest_dir: &Path) -> Result<PathBuf, SourceError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join(format!("{}.mp3", song.video_id));
        fs::write(&path, b"not really audio")?;
        Ok(path)
    }

    async fn duration(&self, _path: &Path) -> Result<f64, SourceError> {
        Ok(40.0)
    }
}

fn lines() -> Vec<LyricLine> {
    vec![
        LyricLine::new("We fold the paper", 0, None),
        LyricLine::new("and set them sailing", 10_000, Some(15_000)),
        LyricLine::new("gone beyond the pier", 40_000, None),
    ]
}

fn config(output: &Path) -> DirectorConfig {
    DirectorConfig {
        api_key: None,
        output_dir: output.to_path_buf(),
        image_width: 320,
        image_height: 180,
        images_per_minute: 0,
        batch_delay: Duration::ZERO,
        ..DirectorConfig::default()
    }
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lyric_director_pipeline_{}", name));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn director(output: &Path, lyric_lines: Vec<LyricLine>, audio: Arc<FakeAudio>) -> LyricDirector {
    LyricDirector::new(
        config(output),
        Arc::new(FakeLyrics { lines: lyric_lines }),
        audio,
        None,
    )
}

#[tokio::test]
async fn test_offline_run_produces_every_checkpoint_and_image() {
    let out = scratch("full");
    let audio = Arc::new(FakeAudio::default());
    let director = director(&out, lines(), audio.clone());

    let prepared = director.prepare("paper boats harbor").await.unwrap();
    let workspace = &prepared.workspace;
    assert!(workspace.root().ends_with("The_Harbor/Paper_Boats"));
    for stage in TimelineStage::ALL {
        assert!(workspace.has_timeline(stage), "missing {}", stage.file_name());
    }
    assert!(workspace.load_video_info().is_some());

    let timeline = &prepared.timeline;
    assert_eq!(timeline.segments.len(), 4);
    assert!(timeline.video_concept.is_some());
    for seg in &timeline.segments {
        assert!(seg.image_description.as_deref().map(|d| !d.is_empty()).unwrap_or(false));
        let path = PathBuf::from(seg.image_path.as_deref().unwrap());
        assert!(image::open(&path).is_ok(), "bad image {:?}", path);
    }

    let report = prepared.forge_report.unwrap();
    assert_eq!(report.placeholders, 4);
    assert_eq!(report.generated, 0);
    assert_eq!(audio.downloads.load(Ordering::SeqCst), 1);
    assert!(director.get_logs().iter().any(|l| l.contains("Paper Boats")));
    assert!(director.get_status().contains("Generating images"));

    let _ = fs::remove_dir_all(&out);
}

#[tokio::test]
async fn test_second_run_resumes_and_reuses() {
    let out = scratch("resume");
    let audio = Arc::new(FakeAudio::default());
    let director = director(&out, lines(), audio.clone());

    director.prepare("paper boats").await.unwrap();
    let again = director.prepare("paper boats").await.unwrap();

    let report = again.forge_report.unwrap();
    assert_eq!(report.reused, again.timeline.segments.len());
    assert_eq!(report.placeholders, 0);
    assert_eq!(audio.downloads.load(Ordering::SeqCst), 1);

    let found = find_song_workspace(&out, "Paper Boats The Harbor").unwrap();
    assert_eq!(found.root(), again.workspace.root());

    let skipped = director
        .prepare_existing("paper boats", SkipTo::Generate)
        .await
        .unwrap();
    assert_eq!(skipped.forge_report.unwrap().reused, skipped.timeline.segments.len());

    let _ = fs::remove_dir_all(&out);
}

#[tokio::test]
async fn test_fatal_errors_abort() {
    let out = scratch("fatal");
    let audio = Arc::new(FakeAudio::default());

    let no_song = director(&out, lines(), audio.clone())
        .prepare("nothing at all")
        .await
        .unwrap_err();
    assert!(matches!(
        no_song.downcast_ref::<PipelineError>(),
        Some(PipelineError::SongNotFound(_))
    ));

    let untimed = director(&out, Vec::new(), audio.clone())
        .prepare("paper boats")
        .await
        .unwrap_err();
    assert!(matches!(
        untimed.downcast_ref::<PipelineError>(),
        Some(PipelineError::NoTimestampedLyrics(_))
    ));
    assert_eq!(audio.downloads.load(Ordering::SeqCst), 0);

    let missing = director(&scratch("fatal_empty"), lines(), audio)
        .prepare_existing("paper boats", SkipTo::Assemble)
        .await
        .unwrap_err();
    assert!(matches!(
        missing.downcast_ref::<PipelineError>(),
        Some(PipelineError::WorkspaceNotFound(_))
    ));

    let _ = fs::remove_dir_all(&out);
}
