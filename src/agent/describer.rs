// Lyric Director Describer - Per-Segment Image Descriptions
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// One request covers the whole song: segments go out as a numbered
// list, descriptions come back as a numbered list.

use crate::agent::gemini_bridge::{GenAiError, GenerativeBackend, TextRequest};
use crate::agent::prompts;
use crate::agent::supervisor::AntifragileSupervisor;
use crate::agent::timeline::{Segment, Timeline, VideoConcept};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

const DESCRIPTION_TEMPERATURE: f32 = 0.6;

const MOCK_THEMES: &[&str] = &[
    "a lone lighthouse sweeping its beam across a violet sea",
    "paper lanterns drifting upward through a starry sky",
    "a winding road through golden fields at dusk",
    "rain running down a window with blurred city lights beyond",
    "a glowing forest path lined with fireflies",
    "waves of colour folding into each other like silk",
];

pub struct Describer {
    backend: Option<Arc<dyn GenerativeBackend>>,
    supervisor: Arc<AntifragileSupervisor>,
    text_model: String,
}

impl Describer {
    pub fn new(
        backend: Option<Arc<dyn GenerativeBackend>>,
        supervisor: Arc<AntifragileSupervisor>,
        text_model: &str,
    ) -> Self {
        Self {
            backend,
            supervisor,
            text_model: text_model.to_string(),
        }
    }

    /// Fill `image_description` on every segment. Never fails: missing or
    /// refused descriptions are replaced by a generic one.
    pub async fn describe(&self, timeline: &mut Timeline) {
        let concept = timeline.video_concept.clone().unwrap_or_default();
        if timeline.segments.is_empty() {
            return;
        }

        let count = timeline.segments.len();
        let descriptions = match &self.backend {
            None => {
                info!("[DESCRIBER] 🎲 Offline: using mock descriptions");
                mock_descriptions(&timeline.segments, &concept)
                    .into_iter()
                    .map(Some)
                    .collect()
            }
            Some(backend) => {
                let prompt =
                    prompts::image_description_prompt(&timeline.song_info, &concept, &timeline.segments);
                let request = TextRequest::new(&self.text_model, prompt, DESCRIPTION_TEMPERATURE);
                let result: Result<String, GenAiError> = self
                    .supervisor
                    .execute_with_retry("image descriptions", || backend.generate_text(&request))
                    .await;
                match result {
                    Ok(text) => {
                        let parsed = parse_numbered_response(&text, count);
                        info!(
                            "[DESCRIBER] ✍️ Parsed {} descriptions for {} segments",
                            parsed.iter().flatten().count(),
                            count
                        );
                        parsed
                    }
                    Err(e) => {
                        warn!("[DESCRIBER] Description request failed: {}", e);
                        Vec::new()
                    }
                }
            }
        };

        apply_descriptions(&mut timeline.segments, descriptions, &concept);
    }
}

/// An item marker: `1.`, `1)` or `1:` (optionally bolded) followed by
/// whitespace or the end of the line.
fn numbered_line_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\**(\d+)[.):]\**(?:\s+(.*))?$").ok())
        .as_ref()
}

fn tidy(text: &str) -> String {
    text.trim().trim_matches('*').trim().to_string()
}

fn append(entry: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !entry.is_empty() {
        entry.push(' ');
    }
    entry.push_str(text);
}

/// Parse a numbered list into `count` slots, slot `i` holding item `i + 1`.
///
/// Only numbers in `1..=count` open an item; any other line, including
/// one that merely starts with a digit, continues the current item.
/// Repeated numbers are merged. Text before the first item is ignored.
pub fn parse_numbered_response(text: &str, count: usize) -> Vec<Option<String>> {
    let mut items: Vec<Option<String>> = vec![None; count];
    let mut current: Option<usize> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let numbered = numbered_line_regex()
            .and_then(|re| re.captures(line))
            .and_then(|caps| {
                let n = caps.get(1)?.as_str().parse::<usize>().ok()?;
                if n == 0 || n > count {
                    return None;
                }
                Some((n - 1, tidy(caps.get(2).map(|m| m.as_str()).unwrap_or_default())))
            });

        match (numbered, current) {
            (Some((slot, body)), _) => {
                append(items[slot].get_or_insert_with(String::new), &body);
                current = Some(slot);
            }
            (None, Some(slot)) => {
                append(items[slot].get_or_insert_with(String::new), &tidy(line));
            }
            (None, None) => {}
        }
    }

    for item in items.iter_mut() {
        if item.as_deref().map(str::is_empty).unwrap_or(false) {
            *item = None;
        }
    }
    items
}

pub fn fallback_description(segment: &Segment, concept: &VideoConcept) -> String {
    format!(
        "Visual representation of '{}' in a {} style.",
        segment.text,
        concept.style_label()
    )
}

/// Assign descriptions by slot, padding gaps with the fallback and
/// dropping any surplus.
pub fn apply_descriptions(
    segments: &mut [Segment],
    descriptions: Vec<Option<String>>,
    concept: &VideoConcept,
) {
    let found = descriptions.iter().flatten().count();
    if found != segments.len() || descriptions.len() != segments.len() {
        warn!(
            "[DESCRIBER] Got {} descriptions for {} segments; padding/truncating",
            found,
            segments.len()
        );
    }
    let mut descriptions = descriptions.into_iter();
    for segment in segments.iter_mut() {
        let description = descriptions
            .next()
            .flatten()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| fallback_description(segment, concept));
        segment.image_description = Some(description);
    }
}

pub fn mock_descriptions(segments: &[Segment], concept: &VideoConcept) -> Vec<String> {
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let theme = MOCK_THEMES[i % MOCK_THEMES.len()];
            if segment.is_instrumental() {
                format!(
                    "An interlude of {}, rendered in a {} style with {}.",
                    theme,
                    concept.style_label(),
                    concept.palette_line()
                )
            } else {
                format!(
                    "For the line '{}': {}, rendered in a {} style with {}.",
                    segment.text,
                    theme,
                    concept.style_label(),
                    concept.palette_line()
                )
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(items: &[&str]) -> Vec<Option<String>> {
        items.iter().map(|s| Some(s.to_string())).collect()
    }

    #[test]
    fn test_parse_numbered_with_continuations() {
        let text = "Here you go:\n1. A red door\nin the fog.\n2) A blue river\n\n3: A green hill";
        assert_eq!(
            parse_numbered_response(text, 3),
            some(&["A red door in the fog.", "A blue river", "A green hill"])
        );
    }

    #[test]
    fn test_digit_leading_continuation_stays_with_its_item() {
        let text = "1. A clock tower at\n12 minutes to midnight, fog.\n2. A river of light.";
        assert_eq!(
            parse_numbered_response(text, 2),
            some(&["A clock tower at 12 minutes to midnight, fog.", "A river of light."])
        );
    }

    #[test]
    fn test_out_of_range_number_is_a_continuation() {
        let text = "1. Fireworks over the bay in\n1999. Crowds cheer.\n2. Quiet streets.";
        let parsed = parse_numbered_response(text, 2);
        assert_eq!(
            parsed[0].as_deref(),
            Some("Fireworks over the bay in 1999. Crowds cheer.")
        );
        assert_eq!(parsed[1].as_deref(), Some("Quiet streets."));
    }

    #[test]
    fn test_skipped_number_keeps_later_items_in_place() {
        let concept = VideoConcept::default();
        let parsed = parse_numbered_response("1. first\n3. third", 3);
        assert_eq!(
            parsed,
            vec![Some("first".to_string()), None, Some("third".to_string())]
        );

        let mut segs = vec![
            Segment::lyrics("one", 0.0, 1.0),
            Segment::lyrics("two", 1.0, 2.0),
            Segment::lyrics("three", 2.0, 3.0),
        ];
        apply_descriptions(&mut segs, parsed, &concept);
        assert_eq!(segs[0].image_description.as_deref(), Some("first"));
        assert_eq!(
            segs[1].image_description.as_deref(),
            Some("Visual representation of 'two' in a artistic style.")
        );
        assert_eq!(segs[2].image_description.as_deref(), Some("third"));
    }

    #[test]
    fn test_parse_numbered_orders_by_number() {
        let parsed = parse_numbered_response("2. second\n1. first\n3. third", 3);
        assert_eq!(parsed, some(&["first", "second", "third"]));
    }

    #[test]
    fn test_parse_numbered_strips_bold_markers() {
        assert_eq!(
            parse_numbered_response("**1.** **A bright moon**", 1),
            some(&["A bright moon"])
        );
    }

    #[test]
    fn test_apply_pads_and_truncates() {
        let concept = VideoConcept {
            visual_style: "pastel".to_string(),
            ..VideoConcept::default()
        };
        let mut segs = vec![
            Segment::lyrics("one", 0.0, 1.0),
            Segment::lyrics("two", 1.0, 2.0),
        ];
        apply_descriptions(&mut segs, some(&["first desc"]), &concept);
        assert_eq!(segs[0].image_description.as_deref(), Some("first desc"));
        assert_eq!(
            segs[1].image_description.as_deref(),
            Some("Visual representation of 'two' in a pastel style.")
        );

        apply_descriptions(&mut segs, some(&["a", "b", "c"]), &concept);
        assert_eq!(segs[1].image_description.as_deref(), Some("b"));
    }

    #[test]
    fn test_mock_descriptions_cover_every_segment() {
        let segs = vec![
            Segment::lyrics("hello", 0.0, 1.0),
            Segment::instrumental("Instrumental Break", 1.0, 5.0),
        ];
        let descriptions = mock_descriptions(&segs, &VideoConcept::default());
        assert_eq!(descriptions.len(), 2);
        assert!(descriptions[0].contains("hello"));
        assert!(descriptions[1].starts_with("An interlude"));
    }
}
