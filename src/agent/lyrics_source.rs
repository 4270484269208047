// Lyric Director Lyrics Source - LRCLIB + LRC Parsing
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// Timestamped lyrics come from LRCLIB (`/api/get`, falling back to
// `/api/search`). Synced lyrics arrive as LRC text and are parsed into
// `LyricLine`s in milliseconds.

use crate::agent::source_tools::SourceError;
use crate::agent::timeline::{LyricLine, SongInfo};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

pub const LRCLIB_BASE: &str = "https://lrclib.net";
const LRCLIB_TIMEOUT_SECS: u64 = 20;

/// Lyrics as delivered by a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricsResult {
    pub synced: Vec<LyricLine>,
    pub plain: String,
}

impl LyricsResult {
    pub fn has_lyrics(&self) -> bool {
        !self.synced.is_empty() || !self.plain.trim().is_empty()
    }

    pub fn has_timestamps(&self) -> bool {
        !self.synced.is_empty()
    }
}

/// Outcome of an availability check, for the `check` command.
#[derive(Debug, Clone, PartialEq)]
pub struct LyricsStatus {
    pub has_lyrics: bool,
    pub has_timestamps: bool,
    pub message: String,
}

#[async_trait]
pub trait LyricsSource: Send + Sync {
    /// `Ok(None)` means the source knows nothing about this song.
    async fn fetch(&self, song: &SongInfo) -> Result<Option<LyricsResult>, SourceError>;
}

/// Ask a source whether usable (timestamped) lyrics exist.
pub async fn check_availability(source: &dyn LyricsSource, song: &SongInfo) -> LyricsStatus {
    match source.fetch(song).await {
        Ok(Some(lyrics)) if lyrics.has_timestamps() => LyricsStatus {
            has_lyrics: true,
            has_timestamps: true,
            message: format!("{} timestamped lines available", lyrics.synced.len()),
        },
        Ok(Some(lyrics)) if lyrics.has_lyrics() => LyricsStatus {
            has_lyrics: true,
            has_timestamps: false,
            message: "Lyrics found but without timestamps".to_string(),
        },
        Ok(_) => LyricsStatus {
            has_lyrics: false,
            has_timestamps: false,
            message: "No lyrics available for this song".to_string(),
        },
        Err(e) => LyricsStatus {
            has_lyrics: false,
            has_timestamps: false,
            message: format!("Lyrics lookup failed: {}", e),
        },
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LrclibResponse {
    #[serde(default, rename = "trackName")]
    track_name: String,
    #[serde(default, rename = "artistName")]
    artist_name: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default, rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
    #[serde(default, rename = "plainLyrics")]
    plain_lyrics: Option<String>,
}

impl LrclibResponse {
    fn into_result(self) -> LyricsResult {
        LyricsResult {
            synced: parse_lrc(self.synced_lyrics.as_deref().unwrap_or_default()),
            plain: self.plain_lyrics.unwrap_or_default().trim().to_string(),
        }
    }
}

pub struct LrcLibSource {
    client: reqwest::Client,
    base_url: String,
}

impl LrcLibSource {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_base(LRCLIB_BASE)
    }

    pub fn with_base(base_url: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LRCLIB_TIMEOUT_SECS))
            .user_agent(concat!("lyric-director/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn params(song: &SongInfo, with_duration: bool) -> Vec<(&'static str, String)> {
        let mut params = vec![("track_name", song.title.clone())];
        if !song.artists.is_empty() {
            params.push(("artist_name", song.primary_artist().to_string()));
        }
        if let Some(album) = song.album.as_ref().filter(|a| !a.trim().is_empty()) {
            params.push(("album_name", album.clone()));
        }
        if with_duration {
            if let Some(duration) = song.duration.filter(|d| *d > 0.0) {
                params.push(("duration", (duration.round() as u64).to_string()));
            }
        }
        params
    }

    async fn get_exact(&self, song: &SongInfo) -> Result<Option<LrclibResponse>, SourceError> {
        let resp = self
            .client
            .get(format!("{}/api/get", self.base_url))
            .query(&Self::params(song, true))
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let entry = resp
            .json::<LrclibResponse>()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;
        Ok(Some(entry))
    }

    async fn search(&self, song: &SongInfo) -> Result<Vec<LrclibResponse>, SourceError> {
        let resp = self
            .client
            .get(format!("{}/api/search", self.base_url))
            .query(&Self::params(song, false))
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SourceError::Http(format!(
                "LRCLIB search status {}",
                resp.status().as_u16()
            )));
        }
        resp.json::<Vec<LrclibResponse>>()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl LyricsSource for LrcLibSource {
    async fn fetch(&self, song: &SongInfo) -> Result<Option<LyricsResult>, SourceError> {
        info!("[LYRICS] 🔎 LRCLIB lookup: '{}' by {}", song.title, song.artist_line());

        if let Some(entry) = self.get_exact(song).await? {
            let result = entry.into_result();
            if result.has_timestamps() {
                info!("[LYRICS] ✅ Exact match with {} synced lines", result.synced.len());
                return Ok(Some(result));
            }
        }

        let mut candidates = self.search(song).await?;
        if candidates.is_empty() {
            warn!("[LYRICS] No LRCLIB results for '{}'", song.title);
            return Ok(None);
        }
        // Prefer synced entries, then the closest duration.
        candidates.sort_by(|a, b| {
            let synced = |r: &LrclibResponse| {
                r.synced_lyrics
                    .as_deref()
                    .map(|s| !s.trim().is_empty())
                    .unwrap_or(false)
            };
            let distance = |r: &LrclibResponse| match (r.duration, song.duration) {
                (Some(a), Some(b)) => (a - b).abs(),
                _ => f64::MAX,
            };
            synced(b)
                .cmp(&synced(a))
                .then(distance(a).total_cmp(&distance(b)))
        });
        let best = candidates.remove(0);
        info!(
            "[LYRICS] Using search result '{}' by {}",
            best.track_name, best.artist_name
        );
        Ok(Some(best.into_result()))
    }
}

/// Parse LRC text into lines sorted by start time. Lines carrying several
/// timestamps are emitted once per timestamp; metadata tags are skipped.
/// A timestamp with no text ends the lyric line before it.
pub fn parse_lrc(raw: &str) -> Vec<LyricLine> {
    let mut marks: Vec<(u64, &str)> = Vec::new();

    for raw_line in raw.lines() {
        let mut rest = raw_line.trim();
        let mut stamps = Vec::new();
        while rest.starts_with('[') {
            let Some(end) = rest.find(']') else {
                break;
            };
            if let Some(ms) = parse_lrc_timestamp(&rest[1..end]) {
                stamps.push(ms);
            }
            rest = &rest[end + 1..];
        }

        let text = rest.trim();
        marks.extend(stamps.into_iter().map(|ms| (ms, text)));
    }

    // Stable: at equal times a lyric keeps its place relative to an end mark.
    marks.sort_by_key(|(ms, _)| *ms);

    let mut lines: Vec<LyricLine> = Vec::new();
    for (ms, text) in marks {
        if !text.is_empty() {
            lines.push(LyricLine::new(text, ms, None));
            continue;
        }
        if let Some(last) = lines.last_mut() {
            if last.end_ms.is_none() && ms > last.start_ms {
                last.end_ms = Some(ms);
            }
        }
    }
    lines
}

/// `mm:ss.xx`, `mm:ss` or `hh:mm:ss.xx` to milliseconds.
pub fn parse_lrc_timestamp(token: &str) -> Option<u64> {
    let mut parts: Vec<&str> = token.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let seconds: f64 = parts.pop()?.replace(',', ".").parse().ok()?;
    let minutes: f64 = parts.pop()?.parse().ok()?;
    let hours: f64 = match parts.pop() {
        Some(h) => h.parse().ok()?,
        None => 0.0,
    };
    if seconds < 0.0 || minutes < 0.0 || hours < 0.0 {
        return None;
    }
    Some(((hours * 3600.0 + minutes * 60.0 + seconds) * 1000.0).round() as u64)
}
