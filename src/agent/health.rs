// Lyric Director Health Check
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// Startup probe for the external tools the pipeline shells out to.

use std::process::{Command, Stdio};
use tracing::{info, warn};

/// External executables and the flag that makes each print its version.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("ffmpeg", "-version"),
    ("ffprobe", "-version"),
    ("yt-dlp", "--version"),
];

fn tool_runs(binary: &str, version_flag: &str) -> bool {
    Command::new(binary)
        .arg(version_flag)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn ytdlp_module_runs() -> bool {
    ["python3", "python"].iter().any(|py| {
        Command::new(py)
            .args(["-m", "yt_dlp", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}

/// Names of required tools that cannot be executed.
pub fn check_dependencies() -> Vec<String> {
    let missing: Vec<String> = REQUIRED_TOOLS
        .iter()
        .filter(|(binary, flag)| {
            let ok = tool_runs(binary, flag) || (*binary == "yt-dlp" && ytdlp_module_runs());
            !ok
        })
        .map(|(binary, _)| binary.to_string())
        .collect();

    if missing.is_empty() {
        info!("[HEALTH] ✅ ffmpeg, ffprobe and yt-dlp found");
    } else {
        warn!("[HEALTH] ⚠️ Missing tools: {}", missing.join(", "));
    }
    missing
}
