// Lyric Director Configuration
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// One explicit configuration object, built from the environment (after
// `dotenv`) and overridden by CLI flags. Every component receives the
// pieces it needs through its constructor.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.0-flash-exp-image-generation";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_THINKING_MODEL: &str = "gemini-2.0-flash-thinking-exp";

/// Retry/backoff knobs shared by every backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs_f64(5.0),
            max_delay: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectorConfig {
    /// `None` runs the pipeline offline: mock concept, mock descriptions,
    /// placeholder images.
    pub api_key: Option<String>,
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub thinking_model: String,
    pub output_dir: PathBuf,
    pub image_width: u32,
    pub image_height: u32,
    pub images_per_minute: u32,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_revision_attempts: usize,
    pub retry: RetryConfig,
    pub fps: u32,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            thinking_model: DEFAULT_THINKING_MODEL.to_string(),
            output_dir: PathBuf::from("output"),
            image_width: 1280,
            image_height: 720,
            images_per_minute: 10,
            batch_size: 5,
            batch_delay: Duration::from_secs_f64(5.0),
            max_revision_attempts: 3,
            retry: RetryConfig::default(),
            fps: 24,
        }
    }
}

impl DirectorConfig {
    /// Read configuration from process environment variables.
    /// Malformed numeric values are logged and replaced by defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an arbitrary lookup,
    /// so tests never touch the real environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, fallback: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };

        let api_key = lookup("GEMINI_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let retry = RetryConfig {
            max_retries: parse_or("MAX_API_RETRIES", &lookup, defaults.retry.max_retries),
            initial_delay: seconds_or("INITIAL_BACKOFF_DELAY", &lookup, defaults.retry.initial_delay),
            max_delay: defaults.retry.max_delay,
        };

        Self {
            api_key,
            api_base: text("GEMINI_API_BASE", &defaults.api_base),
            image_model: text("IMAGE_MODEL", &defaults.image_model),
            text_model: text("TEXT_MODEL", &defaults.text_model),
            thinking_model: text("THINKING_MODEL", &defaults.thinking_model),
            output_dir: PathBuf::from(text("OUTPUT_DIR", "output")),
            images_per_minute: parse_or("GEMINI_IMAGE_RPM", &lookup, defaults.images_per_minute),
            batch_size: parse_or("LYRIC_DIRECTOR_BATCH_SIZE", &lookup, defaults.batch_size),
            batch_delay: seconds_or("LYRIC_DIRECTOR_BATCH_DELAY", &lookup, defaults.batch_delay),
            max_revision_attempts: parse_or(
                "MAX_REVISION_ATTEMPTS",
                &lookup,
                defaults.max_revision_attempts,
            ),
            retry,
            ..defaults
        }
    }

    /// Apply CLI overrides on top of the environment.
    pub fn with_overrides(mut self, api_key: Option<String>, output_dir: Option<PathBuf>) -> Self {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(dir) = output_dir {
            self.output_dir = dir;
        }
        self
    }

    pub fn is_offline(&self) -> bool {
        self.api_key.is_none()
    }

    /// Minimum spacing between two image-generation calls.
    pub fn image_interval(&self) -> Duration {
        if self.images_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / f64::from(self.images_per_minute))
        }
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, fallback: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!("[CONFIG] Ignoring malformed {}='{}', using default", key, raw);
                fallback
            }
        },
        None => fallback,
    }
}

/// Seconds as a float; negatives clamp to zero, values no `Duration` can
/// hold fall back.
fn seconds_or<F>(key: &str, lookup: &F, fallback: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_or(key, lookup, fallback.as_secs_f64()).max(0.0);
    match Duration::try_from_secs_f64(secs) {
        Ok(d) => d,
        Err(_) => {
            warn!("[CONFIG] {}={} is out of range, using default", key, secs);
            fallback
        }
    }
}
