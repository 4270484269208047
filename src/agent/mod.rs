// Lyric Director Agent Modules
// Copyright (c) 2026 Xing_The_Creator | Lyric Director

pub mod describer;
pub mod director;
pub mod gemini_bridge;
pub mod health;
pub mod image_forge;
pub mod lyrics_source;
pub mod placeholder;
pub mod prompts;
pub mod recovery;
pub mod source_tools;
pub mod supervisor;
pub mod timeline;

pub mod video_stitcher;

pub mod core; // Exposed Core Logic
