// Lyric Director - Video Concept
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// Reads the whole lyric and asks the backend for one creative brief.
// Thinking model first, the standard text model second, a canned
// concept when offline or when both fail.

use crate::agent::gemini_bridge::{GenAiError, GenerativeBackend, TextRequest};
use crate::agent::prompts;
use crate::agent::supervisor::AntifragileSupervisor;
use crate::agent::timeline::{SongInfo, Timeline, VideoConcept};
use rand::seq::SliceRandom;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const CONCEPT_TEMPERATURE: f32 = 0.7;

pub struct Director {
    backend: Option<Arc<dyn GenerativeBackend>>,
    supervisor: Arc<AntifragileSupervisor>,
    thinking_model: String,
    text_model: String,
}

impl Director {
    pub fn new(
        backend: Option<Arc<dyn GenerativeBackend>>,
        supervisor: Arc<AntifragileSupervisor>,
        thinking_model: &str,
        text_model: &str,
    ) -> Self {
        Self {
            backend,
            supervisor,
            thinking_model: thinking_model.to_string(),
            text_model: text_model.to_string(),
        }
    }

    /// Produce the concept for a timeline. Never fails.
    pub async fn create_concept(&self, timeline: &Timeline) -> VideoConcept {
        let Some(backend) = &self.backend else {
            info!("[DIRECTOR] 🎲 Offline: choosing a canned concept");
            return mock_concept(&timeline.song_info);
        };

        let prompt = prompts::video_concept_prompt(&timeline.song_info, &timeline.full_lyrics());
        for model in [&self.thinking_model, &self.text_model] {
            // Thinking models reject a JSON mime type, so only ask the text model for it.
            let mut request = TextRequest::new(model, prompt.clone(), CONCEPT_TEMPERATURE);
            if model == &self.text_model {
                request = request.expect_json();
            }

            let result: Result<String, GenAiError> = self
                .supervisor
                .execute_with_retry("video concept", || backend.generate_text(&request))
                .await;

            match result {
                Ok(text) => {
                    let concept = parse_concept(&text);
                    info!(
                        "[DIRECTOR] 🎬 Concept from {}: {} / {}",
                        model,
                        concept.style_label(),
                        concept.palette_line()
                    );
                    return concept;
                }
                Err(e) => warn!("[DIRECTOR] Concept model {} failed: {}", model, e),
            }
        }

        warn!("[DIRECTOR] All concept models failed; using a canned concept");
        mock_concept(&timeline.song_info)
    }
}

/// Strip a surrounding ```json fence if present.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn string_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(_)) => string_list(value).join(", "),
        _ => String::new(),
    }
}

/// Parse a concept reply: JSON when possible, prose otherwise.
pub fn parse_concept(text: &str) -> VideoConcept {
    let body = strip_fences(text);
    let json_slice = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if end > start => &body[start..=end],
        _ => return VideoConcept::from_text(body),
    };

    match serde_json::from_str::<Value>(json_slice) {
        Ok(Value::Object(map)) => {
            let concept = VideoConcept {
                overall_concept: string_field(map.get("overall_concept")),
                visual_style: string_field(map.get("visual_style")),
                color_palette: string_list(map.get("color_palette")),
                key_themes_or_motifs: string_list(map.get("key_themes_or_motifs")),
                potential_genre_mood: string_field(map.get("potential_genre_mood")),
            };
            if concept.overall_concept.is_empty() && concept.visual_style.is_empty() {
                VideoConcept::from_text(body)
            } else {
                concept
            }
        }
        _ => VideoConcept::from_text(body),
    }
}

/// One of three canned briefs, for offline runs.
pub fn mock_concept(song: &SongInfo) -> VideoConcept {
    let title = &song.title;
    let artists = song.artist_line();
    let concepts = [
        VideoConcept {
            overall_concept: format!(
                "A neon-lit city at night for \"{}\" by {}. Empty streets, rain-slick reflections and \
                 glowing signage carry the song from verse to verse.",
                title, artists
            ),
            visual_style: "neon noir".to_string(),
            color_palette: vec!["electric purple".into(), "cyan".into(), "midnight blue".into()],
            key_themes_or_motifs: vec!["reflections".into(), "city lights".into(), "rain".into()],
            potential_genre_mood: "nocturnal, restless".to_string(),
        },
        VideoConcept {
            overall_concept: format!(
                "A watercolor journey through changing seasons for \"{}\" by {}. Landscapes bloom, \
                 fade and return as the song unfolds.",
                title, artists
            ),
            visual_style: "soft watercolor".to_string(),
            color_palette: vec!["sage green".into(), "peach".into(), "sky blue".into(), "ochre".into()],
            key_themes_or_motifs: vec!["seasons".into(), "open fields".into(), "drifting clouds".into()],
            potential_genre_mood: "warm, nostalgic".to_string(),
        },
        VideoConcept {
            overall_concept: format!(
                "Geometric abstraction for \"{}\" by {}. Shapes assemble, fracture and pulse in time \
                 with the music against deep space.",
                title, artists
            ),
            visual_style: "bold geometric abstraction".to_string(),
            color_palette: vec!["black".into(), "gold".into(), "crimson".into(), "white".into()],
            key_themes_or_motifs: vec!["circles".into(), "fractures".into(), "orbits".into()],
            potential_genre_mood: "dramatic, driving".to_string(),
        },
    ];

    let mut rng = rand::thread_rng();
    concepts
        .choose(&mut rng)
        .cloned()
        .unwrap_or_else(|| VideoConcept::from_text(&format!("Lyric video for {}", title)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_concept_json_with_fences() {
        let reply = "```json\n{\"overall_concept\":\"Lanterns on a river\",\"visual_style\":\"ink wash\",\
                     \"color_palette\":[\"indigo\",\"amber\"],\"key_themes_or_motifs\":\"water, light\",\
                     \"potential_genre_mood\":\"calm\"}\n```";
        let concept = parse_concept(reply);
        assert_eq!(concept.overall_concept, "Lanterns on a river");
        assert_eq!(concept.visual_style, "ink wash");
        assert_eq!(concept.color_palette, vec!["indigo", "amber"]);
        assert_eq!(concept.key_themes_or_motifs, vec!["water", "light"]);
        assert_eq!(concept.potential_genre_mood, "calm");
    }

    #[test]
    fn test_parse_concept_prose_fallback() {
        let concept = parse_concept("Just a dreamy blue haze over the ocean.");
        assert_eq!(concept.overall_concept, "Just a dreamy blue haze over the ocean.");
        assert!(concept.color_palette.is_empty());
        assert_eq!(concept.style_label(), "artistic");
    }

    #[test]
    fn test_parse_concept_json_without_known_keys_is_prose() {
        let concept = parse_concept("{\"idea\": \"x\"}");
        assert_eq!(concept.overall_concept, "{\"idea\": \"x\"}");
    }

    #[test]
    fn test_mock_concept_mentions_song() {
        let song = SongInfo {
            title: "Skyline".to_string(),
            artists: vec!["The Band".to_string()],
            ..SongInfo::default()
        };
        let concept = mock_concept(&song);
        assert!(concept.overall_concept.contains("Skyline"));
        assert!(!concept.color_palette.is_empty());
    }
}
