// Lyric Director Video Stitcher - Slideshow Assembly
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// Images are joined with FFmpeg's concat demuxer (`-f concat`). Each
// image is shown from its segment's start to the next segment's start,
// so the slideshow never drifts from the audio. The final entry is
// listed twice because the demuxer ignores the last `duration`.

use crate::agent::source_tools::safe_arg_path;
use crate::agent::timeline::{Timeline, MIN_SEGMENT_SECS};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("no segment has an image on disk")]
    NoImages,
    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One still in the slideshow.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub path: PathBuf,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StitchSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for StitchSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 24,
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Turn the timeline into clips. Segments whose image is missing are
/// skipped and the previous clip holds until the next one starts. The
/// first clip is pulled back to 0 s; the last runs to the end of the
/// audio when its length is known.
pub fn plan_clips(timeline: &Timeline, audio_duration: Option<f64>) -> Vec<Clip> {
    let present: Vec<(f64, f64, PathBuf)> = timeline
        .segments
        .iter()
        .filter_map(|seg| {
            let path = PathBuf::from(seg.image_path.as_deref()?);
            if path.exists() {
                Some((seg.start_time, seg.end_time, path))
            } else {
                warn!("[STITCHER] Missing image for '{}', skipping", seg.text);
                None
            }
        })
        .collect();

    let mut clips = Vec::with_capacity(present.len());
    for (i, (start, end, path)) in present.iter().enumerate() {
        let start = if i == 0 { 0.0 } else { *start };
        let until = match present.get(i + 1) {
            Some((next_start, _, _)) => *next_start,
            None => match audio_duration {
                Some(total) if total > start => total,
                _ => *end,
            },
        };
        clips.push(Clip {
            path: absolute(path),
            duration: (until - start).max(MIN_SEGMENT_SECS),
        });
    }
    clips
}

fn quote(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

/// Contents of an FFmpeg concat manifest.
pub fn build_concat_manifest(clips: &[Clip]) -> String {
    let mut lines = Vec::with_capacity(clips.len() * 2 + 1);
    for clip in clips {
        lines.push(format!("file '{}'", quote(&clip.path)));
        lines.push(format!("duration {:.3}", clip.duration));
    }
    if let Some(last) = clips.last() {
        lines.push(format!("file '{}'", quote(&last.path)));
    }
    lines.join("\n")
}

pub fn build_ffmpeg_args(
    manifest: &Path,
    audio: &Path,
    output: &Path,
    settings: &StitchSettings,
) -> Vec<String> {
    let (w, h) = (settings.width, settings.height);
    let filter = format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,format=yuv420p"
    );
    let mut args: Vec<String> = ["-y", "-f", "concat", "-safe", "0", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(safe_arg_path(manifest).to_string_lossy().to_string());
    args.push("-i".to_string());
    args.push(safe_arg_path(audio).to_string_lossy().to_string());
    args.extend(
        [
            "-vf".to_string(),
            filter,
            "-r".to_string(),
            settings.fps.to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            "-shortest".to_string(),
        ]
        .into_iter(),
    );
    args.push(safe_arg_path(output).to_string_lossy().to_string());
    args
}

pub struct VideoStitcher {
    settings: StitchSettings,
}

impl VideoStitcher {
    pub fn new(settings: StitchSettings) -> Self {
        Self { settings }
    }

    /// Write the manifest, run FFmpeg and return the output path.
    pub async fn assemble(
        &self,
        timeline: &Timeline,
        audio: &Path,
        audio_duration: Option<f64>,
        output_path: &Path,
    ) -> Result<PathBuf, AssemblyError> {
        let clips = plan_clips(timeline, audio_duration);
        if clips.is_empty() {
            return Err(AssemblyError::NoImages);
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let manifest_path = output_path.with_extension("concat_manifest.txt");
        fs::write(&manifest_path, build_concat_manifest(&clips))?;
        info!(
            "[STITCHER] Manifest written ({} clips): {:?}",
            clips.len(),
            manifest_path
        );

        let args = build_ffmpeg_args(&manifest_path, audio, output_path, &self.settings);
        let output = Command::new("ffmpeg").args(&args).output().await;

        let _ = fs::remove_file(&manifest_path);
        let output = output?;

        if output.status.success() {
            info!("[STITCHER] ✅ Final output: {:?}", output_path);
            Ok(output_path.to_path_buf())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let message = tail.into_iter().rev().collect::<Vec<_>>().join(" | ");
            error!("[STITCHER] ❌ FFmpeg failed: {}", message);
            Err(AssemblyError::Ffmpeg(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::timeline::{Segment, SongInfo};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lyric_director_stitch_{}", name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn seg_with_image(dir: &Path, name: &str, start: f64, end: f64, create: bool) -> Segment {
        let path = dir.join(name);
        if create {
            fs::write(&path, b"png").unwrap();
        }
        let mut seg = Segment::lyrics(name, start, end);
        seg.image_path = Some(path.to_string_lossy().to_string());
        seg
    }

    #[test]
    fn test_clips_use_start_to_start_spacing() {
        let dir = scratch("spacing");
        let mut timeline = Timeline::new(SongInfo::default());
        timeline.add_segment(seg_with_image(&dir, "a.png", 1.0, 3.0, true));
        timeline.add_segment(seg_with_image(&dir, "b.png", 4.0, 5.0, true));
        timeline.add_segment(seg_with_image(&dir, "c.png", 9.0, 10.0, true));

        let clips = plan_clips(&timeline, Some(20.0));
        let durations: Vec<f64> = clips.iter().map(|c| c.duration).collect();
        assert_eq!(durations, vec![4.0, 5.0, 11.0]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_images_are_absorbed_by_previous_clip() {
        let dir = scratch("missing");
        let mut timeline = Timeline::new(SongInfo::default());
        timeline.add_segment(seg_with_image(&dir, "a.png", 0.0, 2.0, true));
        timeline.add_segment(seg_with_image(&dir, "b.png", 2.0, 4.0, false));
        timeline.add_segment(seg_with_image(&dir, "c.png", 6.0, 8.0, true));

        let clips = plan_clips(&timeline, None);
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].duration, 6.0);
        assert_eq!(clips[1].duration, 2.0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_manifest_repeats_last_entry() {
        let clips = vec![
            Clip {
                path: PathBuf::from("/tmp/000_a.png"),
                duration: 2.5,
            },
            Clip {
                path: PathBuf::from("/tmp/001_it's.png"),
                duration: 1.0,
            },
        ];
        let manifest = build_concat_manifest(&clips);
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "file '/tmp/000_a.png'");
        assert_eq!(lines[1], "duration 2.500");
        assert_eq!(lines[2], "file '/tmp/001_it'\\''s.png'");
        assert_eq!(lines[4], lines[2]);
    }

    #[test]
    fn test_empty_manifest() {
        assert!(build_concat_manifest(&[]).is_empty());
    }

    #[test]
    fn test_ffmpeg_args_shape() {
        let args = build_ffmpeg_args(
            Path::new("m.txt"),
            Path::new("-song.mp3"),
            Path::new("out.mp4"),
            &StitchSettings::default(),
        );
        assert_eq!(&args[..6], &["-y", "-f", "concat", "-safe", "0", "-i"]);
        assert!(args.contains(&"./-song.mp3".to_string()));
        assert!(args.iter().any(|a| a.starts_with("scale=1280:720")));
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }
}
