// Lyric Director Prompt Templates
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// All text sent to the generative backend is assembled here.
// Templates use `{name}` placeholders filled by `fill`.

use crate::agent::timeline::{Segment, SongInfo, VideoConcept};

pub const VIDEO_CONCEPT_PROMPT: &str = r#"You are the director of a lyric video for "{title}" by {artists}.

Read the full lyrics below and design one coherent visual concept for the whole video.

LYRICS:
{lyrics}

Answer with JSON only, using exactly these keys:
{
  "overall_concept": "two or three sentences describing the visual story",
  "visual_style": "a short style label, e.g. watercolor, neon noir, paper cut-out",
  "color_palette": ["3 to 6 colour names or hex codes"],
  "key_themes_or_motifs": ["recurring symbols or motifs"],
  "potential_genre_mood": "genre and emotional tone in a few words"
}

Keep every image free of people and faces. Favour symbolism, landscapes and objects."#;

pub const IMAGE_DESCRIPTION_PROMPT: &str = r#"You are writing shot descriptions for a lyric video of "{title}" by {artists}.

VIDEO CONCEPT:
{concept}

Write one image description for every numbered segment below. Each description is a
single vivid paragraph (40 to 80 words) that a text-to-image model can render on its own:
mention subject, setting, lighting, colours from the palette and composition. No people,
no faces, no written text in the image. Instrumental segments should carry the mood between
lines.

SEGMENTS:
{segments}

Reply with a numbered list using the same numbers, one description per number, and nothing else."#;

pub const IMAGE_GENERATION_PROMPT: &str = r#"Create a single 16:9 still frame (1280x720) for a lyric video.

{description}

Style: {style}. Palette: {palette}.
The frame must stand on its own. No humans, no faces, no lettering.
Express intense themes through symbolism, lighting and colour rather than literal depiction."#;

pub const SAFER_DESCRIPTION_PROMPT: &str = r#"An image description for a music video was refused by a content filter.

ORIGINAL DESCRIPTION:
"{description}"

Filter reason: {reason}
{lyrics_note}

Rewrite it for a general audience while keeping its emotional core. Replace anything that
could be sensitive with metaphor, abstract shapes, light, colour and atmosphere. Leave out
people, bodies, weapons and injury entirely.

Respond in this format:

REVISED DESCRIPTION: <the new description>

CREATIVE PROCESS: <one sentence on what you changed>"#;

pub const ABSTRACT_IMAGE_PROMPT: &str = r#"Create an abstract artistic image, 16:9.

{description}

Use only colour fields, geometric and organic shapes, texture and light.
Nothing literal or representational."#;

pub const REVISED_MARKER: &str = "REVISED DESCRIPTION:";
pub const PROCESS_MARKER: &str = "CREATIVE PROCESS:";

/// Substitute `{key}` placeholders.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

pub fn video_concept_prompt(song: &SongInfo, lyrics: &str) -> String {
    fill(
        VIDEO_CONCEPT_PROMPT,
        &[
            ("title", &song.title),
            ("artists", &song.artist_line()),
            ("lyrics", lyrics),
        ],
    )
}

/// One line per segment: `N. [segment_type] text`, numbered from 1.
pub fn numbered_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. [{}] {}", i + 1, s.segment_type.as_str(), s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn image_description_prompt(
    song: &SongInfo,
    concept: &VideoConcept,
    segments: &[Segment],
) -> String {
    fill(
        IMAGE_DESCRIPTION_PROMPT,
        &[
            ("title", &song.title),
            ("artists", &song.artist_line()),
            ("concept", &concept.summary()),
            ("segments", &numbered_segments(segments)),
        ],
    )
}

pub fn image_generation_prompt(description: &str, concept: &VideoConcept) -> String {
    fill(
        IMAGE_GENERATION_PROMPT,
        &[
            ("description", description),
            ("style", concept.style_label()),
            ("palette", &concept.palette_line()),
        ],
    )
}

pub fn safer_description_prompt(description: &str, reason: &str, lyric: &str) -> String {
    let lyrics_note = if lyric.trim().is_empty() {
        String::new()
    } else {
        format!(
            "The accompanying lyric is \"{}\". Do not quote it; convey its feeling instead.",
            censor_text(lyric)
        )
    };
    fill(
        SAFER_DESCRIPTION_PROMPT,
        &[
            ("description", description),
            ("reason", reason),
            ("lyrics_note", &lyrics_note),
        ],
    )
}

/// Pull a usable rewrite out of a safer-description response.
///
/// Prefers the text after `REVISED DESCRIPTION:`; without the marker the
/// whole response is accepted when it is between 10 and 300 characters.
pub fn extract_revised_description(response: &str, original: &str) -> Option<String> {
    let candidate = match response.find(REVISED_MARKER) {
        Some(idx) => {
            let rest = &response[idx + REVISED_MARKER.len()..];
            let rest = match rest.find(PROCESS_MARKER) {
                Some(end) => &rest[..end],
                None => rest,
            };
            let cleaned = clean_description(rest);
            if cleaned.chars().count() > 10 {
                Some(cleaned)
            } else {
                None
            }
        }
        None => {
            let cleaned = clean_description(response);
            let len = cleaned.chars().count();
            if (10..=300).contains(&len) {
                Some(cleaned)
            } else {
                None
            }
        }
    }?;

    if candidate.trim().to_lowercase() == original.trim().to_lowercase() {
        None
    } else {
        Some(candidate)
    }
}

fn clean_description(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '[' || c == ']')
        .trim()
        .to_string()
}

/// Hand-written fallbacks, each more abstract than the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstractionLevel {
    /// The lyric stays but sensitive words are masked.
    LyricsRedacted,
    /// No lyric at all, only mood and palette.
    LyricsRemoved,
    /// Colour and shape, nothing else.
    PureColor,
}

impl AbstractionLevel {
    pub const LADDER: [AbstractionLevel; 3] = [
        AbstractionLevel::LyricsRedacted,
        AbstractionLevel::LyricsRemoved,
        AbstractionLevel::PureColor,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AbstractionLevel::LyricsRedacted => "lyrics-redacted",
            AbstractionLevel::LyricsRemoved => "lyrics-removed",
            AbstractionLevel::PureColor => "pure-color",
        }
    }
}

pub fn abstract_description(level: AbstractionLevel, lyric: &str, concept: &VideoConcept) -> String {
    let palette = concept.palette_line();
    let mood = if concept.potential_genre_mood.trim().is_empty() {
        "reflective"
    } else {
        concept.potential_genre_mood.trim()
    };
    let description = match level {
        AbstractionLevel::LyricsRedacted => format!(
            "A symbolic {} scene inspired by the feeling of the words \"{}\", rendered as soft light, \
             drifting shapes and weather in {}.",
            concept.style_label(),
            censor_text(lyric),
            palette
        ),
        AbstractionLevel::LyricsRemoved => format!(
            "An atmospheric {} landscape with a {} mood: layered horizons, gentle gradients and \
             scattered points of light in {}.",
            concept.style_label(),
            mood,
            palette
        ),
        AbstractionLevel::PureColor => format!(
            "Overlapping translucent circles and sweeping curved bands of colour in {} on a dark \
             background, smooth gradients, no objects.",
            palette
        ),
    };
    fill(ABSTRACT_IMAGE_PROMPT, &[("description", &description)])
}

/// Mask the inside of every word longer than three characters:
/// `"testing"` becomes `"t*****g"`.
pub fn censor_text(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let chars: Vec<char> = word.chars().collect();
            if chars.len() > 3 {
                let mut masked = String::with_capacity(word.len());
                masked.push(chars[0]);
                masked.extend(std::iter::repeat('*').take(chars.len() - 2));
                masked.push(chars[chars.len() - 1]);
                masked
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::timeline::Segment;

    #[test]
    fn test_censor_text() {
        assert_eq!(censor_text("testing"), "t*****g");
        assert_eq!(censor_text("hello world"), "h***o w***d");
        assert_eq!(censor_text("the cat"), "the cat");
        assert_eq!(censor_text(""), "");
    }

    #[test]
    fn test_fill_replaces_every_occurrence() {
        assert_eq!(fill("{a}-{a}-{b}", &[("a", "x"), ("b", "y")]), "x-x-y");
    }

    #[test]
    fn test_numbered_segments() {
        let segs = vec![
            Segment::lyrics("first line", 0.0, 2.0),
            Segment::instrumental("Instrumental Break", 2.0, 6.0),
        ];
        assert_eq!(
            numbered_segments(&segs),
            "1. [lyrics] first line\n2. [instrumental] Instrumental Break"
        );
    }

    #[test]
    fn test_extract_revised_with_markers() {
        let response = "REVISED DESCRIPTION: A calm sea of violet light under a slow moon.\n\nCREATIVE PROCESS: removed the storm.";
        assert_eq!(
            extract_revised_description(response, "a violent storm").as_deref(),
            Some("A calm sea of violet light under a slow moon.")
        );
    }

    #[test]
    fn test_extract_revised_rejects_short_or_identical() {
        assert_eq!(extract_revised_description("REVISED DESCRIPTION: tiny", "x"), None);
        let same = "A field of quiet blue flowers";
        assert_eq!(
            extract_revised_description(&format!("REVISED DESCRIPTION: {}", same), same),
            None
        );
    }

    #[test]
    fn test_extract_revised_ignores_case_only_changes() {
        let original = "A field of quiet blue flowers";
        assert_eq!(
            extract_revised_description("REVISED DESCRIPTION: a FIELD of Quiet Blue Flowers", original),
            None
        );
        assert_eq!(
            extract_revised_description("  A Field Of Quiet Blue Flowers.  ", original).as_deref(),
            Some("A Field Of Quiet Blue Flowers.")
        );
    }

    #[test]
    fn test_extract_revised_without_marker_bounds() {
        assert_eq!(
            extract_revised_description("Golden light over an empty road.", "orig").as_deref(),
            Some("Golden light over an empty road.")
        );
        assert_eq!(extract_revised_description(&"x".repeat(400), "orig"), None);
    }

    #[test]
    fn test_abstract_ladder_drops_lyric() {
        let concept = VideoConcept::default();
        let redacted = abstract_description(AbstractionLevel::LyricsRedacted, "burning bridges", &concept);
        assert!(redacted.contains("b*****g b*****s"));
        let removed = abstract_description(AbstractionLevel::LyricsRemoved, "burning bridges", &concept);
        assert!(!removed.contains("b*****g"));
        assert!(!removed.contains("burning"));
    }
}
