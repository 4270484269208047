// Lyric Director Timeline - Segments, Song Metadata & Segmentation
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// The timeline is a flat ordered list of segments. Lyric lines come from
// the lyrics source; instrumental segments are inserted by a single gap
// scan over the ordered list.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// First line starting later than this gets an intro segment.
pub const INTRO_THRESHOLD_SECS: f64 = 5.0;
/// Gaps strictly longer than this become instrumental breaks.
pub const GAP_THRESHOLD_SECS: f64 = 2.0;
/// The outro is added when the last segment ends this far before the audio.
pub const OUTRO_THRESHOLD_SECS: f64 = 5.0;
/// Minimum duration enforced by the timing fix pass.
pub const MIN_SEGMENT_SECS: f64 = 0.5;
/// End time used for a last line with nothing else to go on.
pub const DEFAULT_LINE_SECS: f64 = 1.0;

pub const INTRO_TEXT: &str = "Instrumental Intro";
pub const BREAK_TEXT: &str = "Instrumental Break";
pub const OUTRO_TEXT: &str = "Instrumental Outro";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    Lyrics,
    Instrumental,
}

impl SegmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentType::Lyrics => "lyrics",
            SegmentType::Instrumental => "instrumental",
        }
    }
}

/// A single timestamped lyric line as delivered by a lyrics source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: Option<u64>,
}

impl LyricLine {
    pub fn new(text: &str, start_ms: u64, end_ms: Option<u64>) -> Self {
        Self {
            text: text.to_string(),
            start_ms,
            end_ms,
        }
    }

    fn start_secs(&self) -> f64 {
        self.start_ms as f64 / 1000.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub segment_type: SegmentType,
    #[serde(default)]
    pub image_description: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
}

impl Segment {
    pub fn lyrics(text: &str, start_time: f64, end_time: f64) -> Self {
        Self::new(text, start_time, end_time, SegmentType::Lyrics)
    }

    pub fn instrumental(text: &str, start_time: f64, end_time: f64) -> Self {
        Self::new(text, start_time, end_time, SegmentType::Instrumental)
    }

    fn new(text: &str, start_time: f64, end_time: f64, segment_type: SegmentType) -> Self {
        Self {
            text: text.to_string(),
            start_time,
            end_time,
            segment_type,
            image_description: None,
            image_path: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn is_instrumental(&self) -> bool {
        self.segment_type == SegmentType::Instrumental
    }
}

/// Song metadata carried alongside the segments.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SongInfo {
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub album: Option<String>,
    /// Duration reported by the search result, in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl SongInfo {
    pub fn artist_line(&self) -> String {
        if self.artists.is_empty() {
            "Unknown Artist".to_string()
        } else {
            self.artists.join(", ")
        }
    }

    pub fn primary_artist(&self) -> &str {
        self.artists
            .first()
            .map(String::as_str)
            .unwrap_or("Unknown Artist")
    }
}

/// The director's creative brief for the whole song.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoConcept {
    #[serde(default)]
    pub overall_concept: String,
    #[serde(default)]
    pub visual_style: String,
    #[serde(default)]
    pub color_palette: Vec<String>,
    #[serde(default)]
    pub key_themes_or_motifs: Vec<String>,
    #[serde(default)]
    pub potential_genre_mood: String,
}

impl VideoConcept {
    pub fn from_text(text: &str) -> Self {
        Self {
            overall_concept: text.trim().to_string(),
            ..Self::default()
        }
    }

    /// Short style label used in fallback descriptions and prompts.
    pub fn style_label(&self) -> &str {
        if !self.visual_style.trim().is_empty() {
            self.visual_style.trim()
        } else {
            "artistic"
        }
    }

    pub fn palette_line(&self) -> String {
        if self.color_palette.is_empty() {
            "deep blues, violets and warm amber".to_string()
        } else {
            self.color_palette.join(", ")
        }
    }

    /// Flatten the concept into prompt-ready prose.
    pub fn summary(&self) -> String {
        let mut parts = vec![self.overall_concept.trim().to_string()];
        if !self.visual_style.trim().is_empty() {
            parts.push(format!("Visual style: {}", self.visual_style.trim()));
        }
        if !self.color_palette.is_empty() {
            parts.push(format!("Color palette: {}", self.color_palette.join(", ")));
        }
        if !self.key_themes_or_motifs.is_empty() {
            parts.push(format!("Motifs: {}", self.key_themes_or_motifs.join(", ")));
        }
        if !self.potential_genre_mood.trim().is_empty() {
            parts.push(format!("Mood: {}", self.potential_genre_mood.trim()));
        }
        parts.retain(|p| !p.is_empty());
        parts.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub song_info: SongInfo,
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub video_concept: Option<VideoConcept>,
}

/// On-disk shape: the segment list plus derived durations for readers.
#[derive(Serialize)]
struct TimelineDocument<'a> {
    song_info: &'a SongInfo,
    segments: Vec<SegmentDocument<'a>>,
    video_concept: &'a Option<VideoConcept>,
    total_duration: f64,
}

#[derive(Serialize)]
struct SegmentDocument<'a> {
    #[serde(flatten)]
    segment: &'a Segment,
    duration: f64,
}

impl Timeline {
    pub fn new(song_info: SongInfo) -> Self {
        Self {
            song_info,
            segments: Vec::new(),
            video_concept: None,
        }
    }

    pub fn add_segment(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn total_duration(&self) -> f64 {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => last.end_time - first.start_time,
            _ => 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Concatenated lyric text, one line per lyric segment.
    pub fn full_lyrics(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !s.is_instrumental())
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let doc = TimelineDocument {
            song_info: &self.song_info,
            segments: self
                .segments
                .iter()
                .map(|segment| SegmentDocument {
                    segment,
                    duration: segment.duration(),
                })
                .collect(),
            video_concept: &self.video_concept,
            total_duration: self.total_duration(),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&doc)?)?;
        info!("[TIMELINE] 💾 Saved {} segments to {:?}", self.segments.len(), path);
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = fs::read_to_string(path)?;
        let timeline: Timeline = serde_json::from_str(&json)?;
        info!(
            "[TIMELINE] 📂 Loaded '{}' ({} segments) from {:?}",
            timeline.song_info.title,
            timeline.segments.len(),
            path
        );
        Ok(timeline)
    }
}

/// Build a timeline from timestamped lyric lines.
///
/// `audio_duration` is optional here; [`apply_audio_duration`] can fix up
/// the outro once the downloaded audio has been probed.
pub fn segment_lyrics(
    lines: &[LyricLine],
    song_info: SongInfo,
    audio_duration: Option<f64>,
) -> Timeline {
    let mut timeline = Timeline::new(song_info);
    let Some(first) = lines.first() else {
        warn!("[TIMELINE] No lyric lines supplied; timeline is empty");
        return timeline;
    };

    let first_start = first.start_secs();
    if first_start > INTRO_THRESHOLD_SECS {
        timeline.add_segment(Segment::instrumental(INTRO_TEXT, 0.0, first_start));
    }

    for (i, line) in lines.iter().enumerate() {
        let start = line.start_secs();
        let end = match (line.end_ms, lines.get(i + 1), audio_duration) {
            (Some(end_ms), _, _) => end_ms as f64 / 1000.0,
            (None, Some(next), _) => next.start_secs(),
            (None, None, Some(total)) if total > start => total,
            (None, None, _) => start + DEFAULT_LINE_SECS,
        };
        timeline.add_segment(Segment::lyrics(&line.text, start, end));
    }

    fix_invalid_timing(&mut timeline.segments);
    insert_instrumental_breaks(&mut timeline.segments);

    if let Some(total) = audio_duration {
        append_outro_if_needed(&mut timeline.segments, total);
    }
    timeline
}

/// Enforce `end_time > start_time` with a minimum duration.
pub fn fix_invalid_timing(segments: &mut [Segment]) {
    for (i, segment) in segments.iter_mut().enumerate() {
        if segment.end_time <= segment.start_time {
            warn!(
                "[TIMELINE] Fixing invalid timing for segment {}: '{}'",
                i, segment.text
            );
            segment.end_time = segment.start_time + MIN_SEGMENT_SECS;
        }
    }
}

fn insert_instrumental_breaks(segments: &mut Vec<Segment>) {
    let mut merged = Vec::with_capacity(segments.len());
    let mut previous_end: Option<f64> = None;
    for segment in segments.drain(..) {
        if let Some(end) = previous_end {
            if segment.start_time - end > GAP_THRESHOLD_SECS {
                merged.push(Segment::instrumental(BREAK_TEXT, end, segment.start_time));
            }
        }
        previous_end = Some(segment.end_time);
        merged.push(segment);
    }
    *segments = merged;
}

fn append_outro_if_needed(segments: &mut Vec<Segment>, total: f64) -> bool {
    match segments.last() {
        Some(last) if last.end_time < total - OUTRO_THRESHOLD_SECS => {
            let start = last.end_time;
            segments.push(Segment::instrumental(OUTRO_TEXT, start, total));
            true
        }
        _ => false,
    }
}

/// Reconcile the tail of the timeline with the real audio length.
pub fn apply_audio_duration(timeline: &mut Timeline, audio_duration: f64) {
    let Some(last) = timeline.segments.last_mut() else {
        return;
    };
    if last.is_instrumental() && last.text == OUTRO_TEXT {
        if audio_duration > last.start_time {
            last.end_time = audio_duration;
        }
    } else if append_outro_if_needed(&mut timeline.segments, audio_duration) {
        info!("[TIMELINE] Added outro up to {:.2}s", audio_duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song() -> SongInfo {
        SongInfo {
            title: "Test Song".to_string(),
            artists: vec!["Test Artist".to_string()],
            ..SongInfo::default()
        }
    }

    #[test]
    fn test_intro_only_after_five_seconds() {
        let with_intro = segment_lyrics(&[LyricLine::new("a", 6000, Some(7000))], song(), None);
        assert_eq!(with_intro.segments[0].text, INTRO_TEXT);
        assert_eq!(with_intro.segments[0].end_time, 6.0);

        let without = segment_lyrics(&[LyricLine::new("a", 5000, Some(7000))], song(), None);
        assert_eq!(without.segments.len(), 1);
        assert_eq!(without.segments[0].segment_type, SegmentType::Lyrics);
    }

    #[test]
    fn test_last_line_uses_audio_duration_when_known() {
        let t = segment_lyrics(&[LyricLine::new("only", 1000, None)], song(), Some(30.0));
        assert_eq!(t.segments.len(), 1);
        assert_eq!(t.segments[0].end_time, 30.0);
    }

    #[test]
    fn test_apply_audio_duration_extends_existing_outro() {
        let mut t = segment_lyrics(&[LyricLine::new("a", 0, Some(2000))], song(), Some(20.0));
        assert_eq!(t.segments.last().map(|s| s.text.as_str()), Some(OUTRO_TEXT));
        apply_audio_duration(&mut t, 25.0);
        assert_eq!(t.segments.len(), 2);
        assert_eq!(t.segments[1].end_time, 25.0);
    }

    #[test]
    fn test_apply_audio_duration_within_threshold_adds_nothing() {
        let mut t = segment_lyrics(&[LyricLine::new("a", 0, Some(2000))], song(), None);
        apply_audio_duration(&mut t, 6.5);
        assert_eq!(t.segments.len(), 1);
    }

    #[test]
    fn test_serialized_shape() {
        let t = segment_lyrics(&[LyricLine::new("a", 0, Some(1500))], song(), None);
        let path = std::env::temp_dir().join("lyric_director_timeline_shape.json");
        t.save(&path).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["segments"][0]["segment_type"], "lyrics");
        assert_eq!(raw["segments"][0]["duration"], 1.5);
        assert_eq!(raw["total_duration"], 1.5);

        let loaded = Timeline::load(&path).unwrap();
        assert_eq!(loaded, t);
        let _ = fs::remove_file(&path);
    }
}
