// Lyric Director Library
// Copyright (c) 2026 Xing_The_Creator | Lyric Director

pub mod agent;
pub mod config;
