// Lyric Director Recovery - Song Workspace & Stage Checkpoints
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// Every song gets its own directory under the output root:
//
//   {output}/{safe_artist}/{safe_title}/
//       timeline_raw.json
//       timeline_with_concept.json
//       timeline_with_descriptions.json
//       timeline_final.json
//       video_info.json
//       images/  audio/
//
// A later run resumes by looking at which of these files exist.

use crate::agent::timeline::{Segment, SongInfo, Timeline};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{error, info};
use walkdir::WalkDir;

const VIDEO_INFO_FILE: &str = "video_info.json";
const IMAGES_DIR: &str = "images";
const AUDIO_DIR: &str = "audio";
/// Minimum share of query words a directory must match for `--skip-to`.
const MATCH_THRESHOLD: f64 = 0.5;

/// Pipeline checkpoints, in the order they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimelineStage {
    Raw,
    WithConcept,
    WithDescriptions,
    Final,
}

impl TimelineStage {
    pub const ALL: [TimelineStage; 4] = [
        TimelineStage::Raw,
        TimelineStage::WithConcept,
        TimelineStage::WithDescriptions,
        TimelineStage::Final,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            TimelineStage::Raw => "timeline_raw.json",
            TimelineStage::WithConcept => "timeline_with_concept.json",
            TimelineStage::WithDescriptions => "timeline_with_descriptions.json",
            TimelineStage::Final => "timeline_final.json",
        }
    }
}

/// Summary written next to the timelines.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub output_video: Option<PathBuf>,
}

impl VideoInfo {
    pub fn new(song: &SongInfo, query: &str) -> Self {
        Self {
            title: song.title.clone(),
            artists: song.artists.clone(),
            video_id: song.video_id.clone(),
            query: query.to_string(),
            output_video: None,
        }
    }
}

/// File-system-safe name: drop punctuation, underscores for whitespace.
pub fn safe_name(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    let joined = kept.split_whitespace().collect::<Vec<_>>().join("_");
    let trimmed = joined.trim_matches(|c| c == '-' || c == '_');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `{index:03}_{first 20 chars with non-word runs as '_'}.png`
pub fn image_file_name(index: usize, segment: &Segment) -> String {
    let head: String = segment.text.trim().chars().take(20).collect();
    let mut safe = String::with_capacity(head.len());
    let mut in_run = false;
    for c in head.trim().chars() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            safe.push(c);
            in_run = false;
        } else if !in_run {
            safe.push('_');
            in_run = true;
        }
    }
    if safe.is_empty() {
        safe = segment.segment_type.as_str().to_string();
    }
    format!("{:03}_{}.png", index, safe)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongWorkspace {
    root: PathBuf,
}

impl SongWorkspace {
    pub fn for_song(output_dir: &Path, song: &SongInfo) -> Self {
        Self {
            root: output_dir
                .join(safe_name(song.primary_artist()))
                .join(safe_name(&song.title)),
        }
    }

    pub fn open(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join(AUDIO_DIR)
    }

    /// Create the song, image and audio directories.
    pub fn ensure(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.images_dir())?;
        fs::create_dir_all(self.audio_dir())?;
        Ok(())
    }

    pub fn timeline_path(&self, stage: TimelineStage) -> PathBuf {
        self.root.join(stage.file_name())
    }

    pub fn has_timeline(&self, stage: TimelineStage) -> bool {
        self.timeline_path(stage).exists()
    }

    /// The furthest checkpoint present on disk.
    pub fn latest_stage(&self) -> Option<TimelineStage> {
        TimelineStage::ALL
            .iter()
            .rev()
            .copied()
            .find(|stage| self.has_timeline(*stage))
    }

    pub fn save_timeline(&self, stage: TimelineStage, timeline: &Timeline) -> anyhow::Result<PathBuf> {
        let path = self.timeline_path(stage);
        timeline.save(&path)?;
        info!("[RECOVERY] 💾 Checkpoint '{}' written", stage.file_name());
        Ok(path)
    }

    pub fn load_timeline(&self, stage: TimelineStage) -> anyhow::Result<Timeline> {
        Timeline::load(&self.timeline_path(stage))
    }

    pub fn image_path(&self, index: usize, segment: &Segment) -> PathBuf {
        self.images_dir().join(image_file_name(index, segment))
    }

    pub fn video_output_path(&self, title: &str) -> PathBuf {
        self.root.join(format!("{}_lyric_video.mp4", safe_name(title)))
    }

    pub fn save_video_info(&self, info: &VideoInfo) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(VIDEO_INFO_FILE);
        fs::write(&path, serde_json::to_string_pretty(info)?)?;
        info!("[RECOVERY] 💾 Video info saved: {:?}", path);
        Ok(path)
    }

    /// Returns `None` if no info exists or it cannot be parsed.
    pub fn load_video_info(&self) -> Option<VideoInfo> {
        let path = self.root.join(VIDEO_INFO_FILE);
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str::<VideoInfo>(&json) {
                Ok(info) => Some(info),
                Err(e) => {
                    error!("[RECOVERY] Failed to parse {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                error!("[RECOVERY] Failed to read {:?}: {}", path, e);
                None
            }
        }
    }
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fraction of query words that appear in `haystack`.
pub fn query_match_score(query: &str, haystack: &str) -> f64 {
    let query_words = words(query);
    if query_words.is_empty() {
        return 0.0;
    }
    let hay = words(haystack);
    let hits = query_words.iter().filter(|w| hay.contains(w)).count();
    hits as f64 / query_words.len() as f64
}

fn is_song_dir(dir: &Path) -> bool {
    dir.join(VIDEO_INFO_FILE).exists() || TimelineStage::ALL.iter().any(|s| dir.join(s.file_name()).exists())
}

fn modified(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Locate an existing song directory for `query`.
///
/// Candidates are `{artist}/{title}` directories holding checkpoints; the
/// best word-overlap score above 0.5 wins. Otherwise the most recently
/// finished song (one with `timeline_final.json`) is used.
pub fn find_song_workspace(output_dir: &Path, query: &str) -> Option<SongWorkspace> {
    let mut best: Option<(f64, PathBuf)> = None;

    for entry in WalkDir::new(output_dir)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
    {
        let dir = entry.path();
        if !is_song_dir(dir) {
            continue;
        }
        let title = dir.file_name().map(|n| n.to_string_lossy().replace('_', " ")).unwrap_or_default();
        let artist = dir
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().replace('_', " "))
            .unwrap_or_default();

        let mut score = query_match_score(query, &format!("{} {}", artist, title));
        if let Some(info) = SongWorkspace::open(dir).load_video_info() {
            score = score.max(query_match_score(query, &info.query));
            score = score.max(query_match_score(
                query,
                &format!("{} {}", info.artists.join(" "), info.title),
            ));
        }

        if score > MATCH_THRESHOLD && best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
            best = Some((score, dir.to_path_buf()));
        }
    }

    if let Some((score, dir)) = best {
        info!("[RECOVERY] 📂 Matched {:?} (score {:.2})", dir, score);
        return Some(SongWorkspace::open(&dir));
    }

    let fallback = WalkDir::new(output_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_name() == TimelineStage::Final.file_name())
        .filter_map(|e| e.path().parent().map(Path::to_path_buf))
        .max_by_key(|dir| modified(&dir.join(TimelineStage::Final.file_name())));

    if let Some(dir) = &fallback {
        info!("[RECOVERY] 📂 No query match; using most recent finished song {:?}", dir);
    }
    fallback.map(|dir| SongWorkspace::open(&dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("AC/DC"), "ACDC");
        assert_eq!(safe_name("  Hello   World! "), "Hello_World");
        assert_eq!(safe_name("--Weird__"), "Weird");
        assert_eq!(safe_name("???"), "unknown");
        assert_eq!(safe_name("Beyoncé"), "Beyoncé");
        assert_eq!(safe_name("東京 Drift №2"), "東京_Drift_2");
    }

    #[test]
    fn test_image_file_name() {
        let seg = Segment::lyrics("Hello, world! This line is long", 0.0, 1.0);
        assert_eq!(image_file_name(7, &seg), "007_Hello_world_This_l.png");

        let blank = Segment::instrumental("   ", 0.0, 1.0);
        assert_eq!(image_file_name(12, &blank), "012_instrumental.png");
    }

    #[test]
    fn test_query_match_score() {
        assert_eq!(query_match_score("Bohemian Rhapsody Queen", "Queen Bohemian Rhapsody"), 1.0);
        assert!(query_match_score("Bohemian Rhapsody Queen", "Queen Other") < 0.5);
        assert_eq!(query_match_score("", "anything"), 0.0);
    }

    #[test]
    fn test_stage_order() {
        assert!(TimelineStage::Raw < TimelineStage::Final);
        assert_eq!(TimelineStage::WithConcept.file_name(), "timeline_with_concept.json");
    }
}
