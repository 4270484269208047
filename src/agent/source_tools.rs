// Lyric Director Source Tools - Song Search & Audio Acquisition
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// This module handles:
// 1. Song search via yt-dlp `ytsearch`
// 2. Audio download via yt-dlp (`-x --audio-format mp3`)
// 3. Audio duration extraction via ffprobe

use crate::agent::timeline::SongInfo;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

const SEARCH_RESULTS: usize = 3;
const SEARCH_TEMPLATE: &str =
    "%(title)s|%(id)s|%(duration)s|%(track)s|%(artist)s|%(uploader)s|%(album)s";
const FFPROBE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no song found for query '{0}'")]
    NotFound(String),
    #[error("{tool} failed: {message}")]
    Tool { tool: &'static str, message: String },
    #[error("http error: {0}")]
    Http(String),
    #[error("unexpected response: {0}")]
    Parse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Song search, audio download and probing.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn search(&self, query: &str) -> Result<SongInfo, SourceError>;

    /// Download the song's audio into `dest_dir` and return the file path.
    async fn download_audio(&self, song: &SongInfo, dest_dir: &Path) -> Result<PathBuf, SourceError>;

    /// Audio length in seconds.
    async fn duration(&self, path: &Path) -> Result<f64, SourceError>;
}

/// Prefix a dash-leading relative path with `./` so tools never read it as
/// a flag.
pub fn safe_arg_path(path: &Path) -> PathBuf {
    if path.to_string_lossy().starts_with('-') {
        Path::new(".").join(path)
    } else {
        path.to_path_buf()
    }
}

/// Find a working yt-dlp: a standalone binary first, then `python -m yt_dlp`.
pub async fn get_ytdlp_command() -> String {
    for bin in ["yt-dlp", "/usr/local/bin/yt-dlp", "/usr/bin/yt-dlp"] {
        match Command::new(bin).arg("--version").output().await {
            Ok(output) if output.status.success() => {
                debug!("[SOURCE] Found standalone yt-dlp at '{}'", bin);
                return bin.to_string();
            }
            Ok(output) => warn!(
                "[SOURCE] '{}' exists but --version failed: {}",
                bin,
                String::from_utf8_lossy(&output.stderr)
            ),
            Err(_) => debug!("[SOURCE] '{}' not runnable", bin),
        }
    }

    for py in ["python3", "python", "py"] {
        if let Ok(out) = Command::new(py).args(["-m", "yt_dlp", "--version"]).output().await {
            if out.status.success() {
                debug!("[SOURCE] Found yt-dlp module via '{}'", py);
                return py.to_string();
            }
        }
    }

    warn!("[SOURCE] ⚠️ No yt-dlp found. Search and download will fail.");
    "yt-dlp".to_string()
}

fn ytdlp_prefix(command: &str) -> Vec<String> {
    if command.ends_with("yt-dlp") {
        Vec::new()
    } else {
        vec!["-m".to_string(), "yt_dlp".to_string()]
    }
}

pub fn build_search_args(command: &str, query: &str, limit: usize) -> Vec<String> {
    let mut args = ytdlp_prefix(command);
    args.extend_from_slice(&[
        "--print".to_string(),
        SEARCH_TEMPLATE.to_string(),
        "--skip-download".to_string(),
        "--no-warnings".to_string(),
        "--".to_string(),
        format!("ytsearch{}:{}", limit, query),
    ]);
    args
}

pub fn build_audio_download_args(command: &str, video_id: &str, dest_dir: &Path) -> Vec<String> {
    let mut args = ytdlp_prefix(command);
    let template = safe_arg_path(dest_dir).join("%(id)s.%(ext)s");
    args.extend_from_slice(&[
        "-x".to_string(),
        "--audio-format".to_string(),
        "mp3".to_string(),
        "--no-playlist".to_string(),
        "-o".to_string(),
        template.to_string_lossy().to_string(),
        "--".to_string(),
        format!("https://www.youtube.com/watch?v={}", video_id),
    ]);
    args
}

fn noise_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\s*[\(\[][^\)\]]*(official|video|audio|lyric|visuali[sz]er|hd|4k|remaster)[^\)\]]*[\)\]]",
        )
        .ok()
    })
    .as_ref()
}

/// Strip "(Official Video)"-style decorations from a title.
pub fn clean_title(title: &str) -> String {
    let cleaned = match noise_regex() {
        Some(re) => re.replace_all(title, "").to_string(),
        None => title.to_string(),
    };
    cleaned.trim().to_string()
}

fn field(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() || v == "NA" || v == "None" {
        None
    } else {
        Some(v.to_string())
    }
}

/// Parse one `--print` line of [`SEARCH_TEMPLATE`]. The title may itself
/// contain `|`, so the fixed fields are taken from the right.
pub fn parse_search_line(line: &str) -> Option<SongInfo> {
    let mut parts: Vec<&str> = line.rsplitn(7, '|').collect();
    if parts.len() != 7 {
        return None;
    }
    parts.reverse();
    let (raw_title, id, duration, track, artist, uploader, album) =
        (parts[0], parts[1], parts[2], parts[3], parts[4], parts[5], parts[6]);

    let video_id = field(id)?;
    let duration = field(duration).and_then(|d| d.parse::<f64>().ok());

    let (title, artists) = match (field(track), field(artist)) {
        (Some(track), Some(artist)) => (
            track,
            artist.split(',').map(|a| a.trim().to_string()).filter(|a| !a.is_empty()).collect(),
        ),
        _ => {
            let cleaned = clean_title(raw_title);
            match cleaned.split_once(" - ") {
                Some((artist, title)) => (title.trim().to_string(), vec![artist.trim().to_string()]),
                None => {
                    let uploader = field(uploader)
                        .map(|u| u.trim_end_matches(" - Topic").to_string())
                        .into_iter()
                        .collect();
                    (cleaned, uploader)
                }
            }
        }
    };

    Some(SongInfo {
        title,
        artists,
        video_id,
        album: field(album),
        duration,
    })
}

/// Get media duration using ffprobe with a timeout
pub async fn get_media_duration(path: &Path) -> Result<f64, SourceError> {
    let safe_path = safe_arg_path(path);

    let output = tokio::time::timeout(
        tokio::time::Duration::from_secs(FFPROBE_TIMEOUT_SECS),
        Command::new("ffprobe")
            .kill_on_drop(true)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(&safe_path)
            .output(),
    )
    .await
    .map_err(|_| SourceError::Tool {
        tool: "ffprobe",
        message: "duration check timed out".to_string(),
    })??;

    if !output.status.success() {
        return Err(SourceError::Tool {
            tool: "ffprobe",
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|_| SourceError::Parse("ffprobe duration output".to_string()))
}

/// yt-dlp backed song search and audio download.
pub struct YtDlpSource {
    command: String,
}

impl YtDlpSource {
    pub async fn discover() -> Self {
        Self {
            command: get_ytdlp_command().await,
        }
    }
}

#[async_trait]
impl AudioSource for YtDlpSource {
    async fn search(&self, query: &str) -> Result<SongInfo, SourceError> {
        info!("[SOURCE] 🔎 Searching: {}", query);
        let output = Command::new(&self.command)
            .args(build_search_args(&self.command, query, SEARCH_RESULTS))
            .output()
            .await?;

        if !output.status.success() {
            return Err(SourceError::Tool {
                tool: "yt-dlp",
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let song = stdout
            .lines()
            .filter_map(parse_search_line)
            .find(|s| s.duration.map(|d| d > 0.0).unwrap_or(true))
            .ok_or_else(|| SourceError::NotFound(query.to_string()))?;

        info!(
            "[SOURCE] ✅ Found '{}' by {} ({})",
            song.title,
            song.artist_line(),
            song.video_id
        );
        Ok(song)
    }

    async fn download_audio(&self, song: &SongInfo, dest_dir: &Path) -> Result<PathBuf, SourceError> {
        tokio::fs::create_dir_all(dest_dir).await?;
        info!("[SOURCE] 📥 Downloading audio for {} to {:?}", song.video_id, dest_dir);

        let output = Command::new(&self.command)
            .args(build_audio_download_args(&self.command, &song.video_id, dest_dir))
            .output()
            .await?;

        if !output.status.success() {
            return Err(SourceError::Tool {
                tool: "yt-dlp",
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let expected = dest_dir.join(format!("{}.mp3", song.video_id));
        if expected.exists() {
            return Ok(expected);
        }
        find_audio_file(dest_dir).await.ok_or_else(|| SourceError::Tool {
            tool: "yt-dlp",
            message: format!("no audio file produced in {:?}", dest_dir),
        })
    }

    async fn duration(&self, path: &Path) -> Result<f64, SourceError> {
        get_media_duration(path).await
    }
}

/// First audio file in a directory, by name.
pub async fn find_audio_file(dir: &Path) -> Option<PathBuf> {
    let extensions = ["mp3", "m4a", "opus", "webm", "wav", "ogg", "flac"];
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut found = Vec::new();

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_audio = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if is_audio && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    found.into_iter().next()
}
