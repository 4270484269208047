// Lyric Director Timeline Segmentation Tests
// Copyright (c) 2026 Xing_The_Creator | Lyric Director

use lyric_director::agent::timeline::{
    fix_invalid_timing, segment_lyrics, LyricLine, Segment, SegmentType, SongInfo, BREAK_TEXT,
    DEFAULT_LINE_SECS, GAP_THRESHOLD_SECS, MIN_SEGMENT_SECS,
};

fn song() -> SongInfo {
    SongInfo {
        title: "Three Lines".to_string(),
        artists: vec!["Tester".to_string()],
        ..SongInfo::default()
    }
}

#[test]
fn test_three_line_song_with_early_ending_middle_line() {
    let lines = vec![
        LyricLine::new("first line", 0, None),
        LyricLine::new("second line", 10_000, Some(15_000)),
        LyricLine::new("third line", 40_000, None),
    ];
    let timeline = segment_lyrics(&lines, song(), Some(40.0));
    let texts: Vec<&str> = timeline.segments.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["first line", "second line", BREAK_TEXT, "third line"]);

    // No intro: the first line starts at 0 s.
    assert_eq!(timeline.segments[0].start_time, 0.0);
    assert_eq!(timeline.segments[0].end_time, 10.0);

    let gap = &timeline.segments[2];
    assert_eq!(gap.segment_type, SegmentType::Instrumental);
    assert_eq!((gap.start_time, gap.end_time), (15.0, 40.0));

    let last = &timeline.segments[3];
    assert_eq!(last.start_time, 40.0);
    assert_eq!(last.end_time, 40.0 + DEFAULT_LINE_SECS);
}

#[test]
fn test_breaks_inserted_only_for_gaps_over_threshold() {
    // Each line lasts 1 s; the following start leaves a gap of `g`.
    let gaps: [f64; 6] = [0.0, 1.0, 2.0, 2.001, 3.5, 10.0];
    let mut lines = Vec::new();
    let mut t_ms = 0u64;
    for (i, g) in gaps.iter().enumerate() {
        lines.push(LyricLine::new(&format!("line {}", i), t_ms, Some(t_ms + 1000)));
        t_ms += 1000 + (g * 1000.0).round() as u64;
    }
    lines.push(LyricLine::new("closing", t_ms, Some(t_ms + 1000)));

    let timeline = segment_lyrics(&lines, song(), None);
    let expected_breaks = gaps.iter().filter(|g| **g > GAP_THRESHOLD_SECS).count();
    let breaks: Vec<&Segment> = timeline
        .segments
        .iter()
        .filter(|s| s.text == BREAK_TEXT)
        .collect();
    assert_eq!(breaks.len(), expected_breaks);
    for b in breaks {
        assert!(b.duration() > GAP_THRESHOLD_SECS);
    }
}

#[test]
fn test_every_segment_has_positive_duration_and_ordered_starts() {
    let lines = vec![
        LyricLine::new("a", 1_000, Some(1_000)),
        LyricLine::new("b", 1_000, Some(500)),
        LyricLine::new("c", 9_000, None),
        LyricLine::new("d", 9_200, None),
    ];
    let timeline = segment_lyrics(&lines, song(), Some(60.0));
    for seg in &timeline.segments {
        assert!(seg.end_time > seg.start_time, "bad segment {:?}", seg);
    }
    for pair in timeline.segments.windows(2) {
        assert!(pair[0].start_time <= pair[1].start_time);
    }
}

#[test]
fn test_fix_invalid_timing_enforces_minimum() {
    let mut segs = vec![Segment::lyrics("x", 4.0, 3.0), Segment::lyrics("y", 5.0, 5.0)];
    fix_invalid_timing(&mut segs);
    assert_eq!(segs[0].end_time, 4.0 + MIN_SEGMENT_SECS);
    assert_eq!(segs[1].end_time, 5.0 + MIN_SEGMENT_SECS);
}

#[test]
fn test_empty_lyrics_give_empty_timeline() {
    let timeline = segment_lyrics(&[], song(), Some(100.0));
    assert!(timeline.is_empty());
    assert_eq!(timeline.total_duration(), 0.0);
}
