// Lyric Director Image Forge - Segment Images & the Revision Ladder
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// Per segment:
//   Direct      -> the description as written
//   Revise      -> ask the backend for a safer rewrite (after a block)
//   Revised     -> generate from the rewrite
//   Template(n) -> hand-written, increasingly abstract prompts
//   Exhausted   -> local abstract placeholder
//
// Transient API errors are retried by the supervisor inside each state.
// Any other failure lands on a local text placeholder. The only error a
// caller can see is a failure to write the placeholder itself.

use crate::agent::gemini_bridge::{GenAiError, GenerativeBackend, InlineImage, TextRequest};
use crate::agent::placeholder::{PlaceholderError, PlaceholderRenderer};
use crate::agent::prompts::{self, AbstractionLevel};
use crate::agent::recovery::SongWorkspace;
use crate::agent::supervisor::AntifragileSupervisor;
use crate::agent::timeline::{Segment, Timeline, VideoConcept};
use crate::config::DirectorConfig;
use image::ImageFormat;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

const REVISION_TEMPERATURE: f32 = 0.4;

/// Tagged result of a single image attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Generated(InlineImage),
    Blocked(String),
    Failed(GenAiError),
}

impl From<Result<InlineImage, GenAiError>> for AttemptOutcome {
    fn from(result: Result<InlineImage, GenAiError>) -> Self {
        match result {
            Ok(image) => AttemptOutcome::Generated(image),
            Err(GenAiError::Blocked { reason }) => AttemptOutcome::Blocked(reason),
            Err(e) => AttemptOutcome::Failed(e),
        }
    }
}

/// Which rung of the ladder produced an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderStep {
    Direct,
    Revised,
    Template(AbstractionLevel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderReason {
    Offline,
    NoDescription,
    SafetyExhausted,
    BackendFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Generated(LadderStep),
    /// The file was already on disk from an earlier run.
    Reused,
    Placeholder {
        reason: PlaceholderReason,
        abstract_style: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutcome {
    pub path: PathBuf,
    pub source: ImageSource,
    /// Image-generation calls made for this segment.
    pub attempts: u32,
}

/// Tallies for a whole timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForgeReport {
    pub generated: usize,
    pub reused: usize,
    pub placeholders: usize,
    pub safety_fallbacks: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForgeSettings {
    pub text_model: String,
    pub max_revision_attempts: usize,
    pub min_interval: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl From<&DirectorConfig> for ForgeSettings {
    fn from(cfg: &DirectorConfig) -> Self {
        Self {
            text_model: cfg.text_model.clone(),
            max_revision_attempts: cfg.max_revision_attempts,
            min_interval: cfg.image_interval(),
            batch_size: cfg.batch_size,
            batch_delay: cfg.batch_delay,
        }
    }
}

/// States of the revision ladder for one description.
enum Ladder {
    Direct,
    Revise { reason: String },
    Revised(String),
    Template(usize),
    Exhausted,
}

pub struct ImageForge {
    backend: Option<Arc<dyn GenerativeBackend>>,
    supervisor: Arc<AntifragileSupervisor>,
    renderer: PlaceholderRenderer,
    settings: ForgeSettings,
    last_image_call: Option<Instant>,
}

impl ImageForge {
    pub fn new(
        backend: Option<Arc<dyn GenerativeBackend>>,
        supervisor: Arc<AntifragileSupervisor>,
        renderer: PlaceholderRenderer,
        settings: ForgeSettings,
    ) -> Self {
        Self {
            backend,
            supervisor,
            renderer,
            settings,
            last_image_call: None,
        }
    }

    /// Give every segment an image, in batches, and record the paths on
    /// the timeline.
    pub async fn forge_timeline(
        &mut self,
        timeline: &mut Timeline,
        workspace: &SongWorkspace,
    ) -> Result<ForgeReport, PlaceholderError> {
        let concept = timeline.video_concept.clone().unwrap_or_default();
        let total = timeline.segments.len();
        let batch_size = self.settings.batch_size.max(1);
        let mut report = ForgeReport::default();
        let mut calls_in_batch = 0usize;

        for (index, segment) in timeline.segments.iter_mut().enumerate() {
            info!("[FORGE] 🎨 Segment {}/{}: '{}'", index + 1, total, segment.text);
            let path = workspace.image_path(index, segment);
            let outcome = self.forge_segment(segment, &concept, &path).await?;

            match outcome.source {
                ImageSource::Generated(_) => report.generated += 1,
                ImageSource::Reused => report.reused += 1,
                ImageSource::Placeholder { reason, .. } => {
                    report.placeholders += 1;
                    if reason == PlaceholderReason::SafetyExhausted {
                        report.safety_fallbacks += 1;
                    }
                }
            }
            segment.image_path = Some(outcome.path.to_string_lossy().to_string());

            if outcome.attempts > 0 {
                calls_in_batch += 1;
                if calls_in_batch >= batch_size && index + 1 < total {
                    info!(
                        "[FORGE] Batch of {} done; pausing {:.1}s",
                        calls_in_batch,
                        self.settings.batch_delay.as_secs_f64()
                    );
                    tokio::time::sleep(self.settings.batch_delay).await;
                    calls_in_batch = 0;
                }
            }
        }

        info!(
            "[FORGE] ✅ {} generated, {} reused, {} placeholders ({} after safety blocks)",
            report.generated, report.reused, report.placeholders, report.safety_fallbacks
        );
        Ok(report)
    }

    /// Produce an image for one segment at `path`.
    pub async fn forge_segment(
        &mut self,
        segment: &Segment,
        concept: &VideoConcept,
        path: &Path,
    ) -> Result<ImageOutcome, PlaceholderError> {
        if path.exists() {
            info!("[FORGE] ♻️ Reusing {:?}", path);
            return Ok(ImageOutcome {
                path: path.to_path_buf(),
                source: ImageSource::Reused,
                attempts: 0,
            });
        }

        let Some(backend) = self.backend.clone() else {
            return self.placeholder(segment, path, PlaceholderReason::Offline, 0);
        };
        let description = match segment.image_description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => return self.placeholder(segment, path, PlaceholderReason::NoDescription, 0),
        };

        let levels: Vec<AbstractionLevel> = AbstractionLevel::LADDER
            .iter()
            .copied()
            .take(self.settings.max_revision_attempts)
            .collect();
        let mut attempts = 0u32;
        let mut state = Ladder::Direct;

        loop {
            state = match state {
                Ladder::Direct => {
                    let prompt = prompts::image_generation_prompt(&description, concept);
                    attempts += 1;
                    match self.attempt(backend.as_ref(), &prompt).await {
                        AttemptOutcome::Generated(image) => {
                            return self.store(image, segment, path, LadderStep::Direct, attempts)
                        }
                        AttemptOutcome::Blocked(reason) => Ladder::Revise { reason },
                        AttemptOutcome::Failed(e) => return self.failed(segment, path, e, attempts),
                    }
                }
                Ladder::Revise { reason } => {
                    match self.request_revision(backend.as_ref(), &description, &reason, segment).await {
                        Some(revised) => Ladder::Revised(revised),
                        None => Ladder::Template(0),
                    }
                }
                Ladder::Revised(revised) => {
                    let prompt = prompts::image_generation_prompt(&revised, concept);
                    attempts += 1;
                    match self.attempt(backend.as_ref(), &prompt).await {
                        AttemptOutcome::Generated(image) => {
                            return self.store(image, segment, path, LadderStep::Revised, attempts)
                        }
                        AttemptOutcome::Blocked(_) => Ladder::Template(0),
                        AttemptOutcome::Failed(e) => return self.failed(segment, path, e, attempts),
                    }
                }
                Ladder::Template(n) => match levels.get(n) {
                    None => Ladder::Exhausted,
                    Some(level) => {
                        warn!("[FORGE] 🛡️ Escalating to {} template", level.label());
                        let prompt = prompts::abstract_description(*level, &segment.text, concept);
                        attempts += 1;
                        match self.attempt(backend.as_ref(), &prompt).await {
                            AttemptOutcome::Generated(image) => {
                                return self.store(
                                    image,
                                    segment,
                                    path,
                                    LadderStep::Template(*level),
                                    attempts,
                                )
                            }
                            AttemptOutcome::Blocked(_) => Ladder::Template(n + 1),
                            AttemptOutcome::Failed(e) => return self.failed(segment, path, e, attempts),
                        }
                    }
                },
                Ladder::Exhausted => {
                    warn!(
                        "[FORGE] Every safer prompt was refused for '{}'; rendering abstract placeholder",
                        segment.text
                    );
                    return self.placeholder(segment, path, PlaceholderReason::SafetyExhausted, attempts);
                }
            };
        }
    }

    async fn pace(&mut self) {
        if let Some(last) = self.last_image_call {
            let elapsed = last.elapsed();
            if elapsed < self.settings.min_interval {
                tokio::time::sleep(self.settings.min_interval - elapsed).await;
            }
        }
        self.last_image_call = Some(Instant::now());
    }

    async fn attempt(&mut self, backend: &dyn GenerativeBackend, prompt: &str) -> AttemptOutcome {
        self.pace().await;
        self.supervisor
            .execute_with_retry("image generation", || backend.generate_image(prompt))
            .await
            .into()
    }

    async fn request_revision(
        &self,
        backend: &dyn GenerativeBackend,
        description: &str,
        reason: &str,
        segment: &Segment,
    ) -> Option<String> {
        let prompt = prompts::safer_description_prompt(description, reason, &segment.text);
        let request = TextRequest::new(&self.settings.text_model, prompt, REVISION_TEMPERATURE);
        match self
            .supervisor
            .execute_with_retry("safer description", || backend.generate_text(&request))
            .await
        {
            Ok(response) => {
                let revised = prompts::extract_revised_description(&response, description);
                match &revised {
                    Some(text) => info!("[FORGE] ✍️ Revised description: {}", text),
                    None => warn!("[FORGE] Revision response was unusable"),
                }
                revised
            }
            Err(e) => {
                warn!("[FORGE] Could not obtain a safer description: {}", e);
                None
            }
        }
    }

    fn store(
        &self,
        image: InlineImage,
        segment: &Segment,
        path: &Path,
        step: LadderStep,
        attempts: u32,
    ) -> Result<ImageOutcome, PlaceholderError> {
        let decoded = match image::load_from_memory(&image.bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("[FORGE] Backend returned an undecodable {}: {}", image.mime_type, e);
                return self.placeholder(segment, path, PlaceholderReason::BackendFailed, attempts);
            }
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        decoded.save_with_format(path, ImageFormat::Png)?;
        info!("[FORGE] ✅ Saved {:?} ({:?})", path, step);
        Ok(ImageOutcome {
            path: path.to_path_buf(),
            source: ImageSource::Generated(step),
            attempts,
        })
    }

    fn failed(
        &self,
        segment: &Segment,
        path: &Path,
        err: GenAiError,
        attempts: u32,
    ) -> Result<ImageOutcome, PlaceholderError> {
        error!("[FORGE] ❌ Image generation failed for '{}': {}", segment.text, err);
        self.placeholder(segment, path, PlaceholderReason::BackendFailed, attempts)
    }

    fn placeholder(
        &self,
        segment: &Segment,
        path: &Path,
        reason: PlaceholderReason,
        attempts: u32,
    ) -> Result<ImageOutcome, PlaceholderError> {
        let abstract_style = reason == PlaceholderReason::SafetyExhausted;
        self.renderer.render_segment(segment, path, abstract_style)?;
        Ok(ImageOutcome {
            path: path.to_path_buf(),
            source: ImageSource::Placeholder {
                reason,
                abstract_style,
            },
            attempts,
        })
    }
}
