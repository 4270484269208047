// Lyric Director Core - The Pipeline
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// One song, one stage at a time:
//   search -> lyrics -> timeline -> audio -> concept -> descriptions
//          -> images -> video
// Every stage writes a checkpoint into the song workspace. A later run
// picks up from the furthest checkpoint on disk.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use thiserror::Error;
use tracing::{info, warn};

use crate::agent::describer::Describer;
use crate::agent::director::Director;
use crate::agent::gemini_bridge::{GeminiClient, GenerativeBackend};
use crate::agent::image_forge::{ForgeReport, ForgeSettings, ImageForge};
use crate::agent::lyrics_source::{self, LrcLibSource, LyricsSource, LyricsStatus};
use crate::agent::placeholder::PlaceholderRenderer;
use crate::agent::recovery::{find_song_workspace, SongWorkspace, TimelineStage, VideoInfo};
use crate::agent::source_tools::{find_audio_file, AudioSource, YtDlpSource};
use crate::agent::supervisor::{AntifragileSupervisor, BackoffPolicy};
use crate::agent::timeline::{self, SongInfo, Timeline};
use crate::agent::video_stitcher::{StitchSettings, VideoStitcher};
use crate::config::DirectorConfig;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("song not found: {0}")]
    SongNotFound(String),
    #[error("no timestamped lyrics for '{0}'")]
    NoTimestampedLyrics(String),
    #[error("audio download failed: {0}")]
    AudioDownload(String),
    #[error("timeline for '{0}' has no segments")]
    EmptyTimeline(String),
    #[error("no existing song directory matches '{0}'")]
    WorkspaceNotFound(String),
    #[error("checkpoint {0} is missing; run the earlier stages first")]
    MissingCheckpoint(&'static str),
}

/// Where a run may begin when reusing a song directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipTo {
    Generate,
    Assemble,
}

/// A song whose final timeline and audio are ready for assembly.
#[derive(Debug, Clone)]
pub struct PreparedSong {
    pub workspace: SongWorkspace,
    pub timeline: Timeline,
    pub audio_path: PathBuf,
    pub audio_duration: Option<f64>,
    pub forge_report: Option<ForgeReport>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub workspace: SongWorkspace,
    pub video_path: PathBuf,
    pub forge_report: Option<ForgeReport>,
}

/// The pipeline, with its collaborators injected.
#[derive(Clone)]
pub struct LyricDirector {
    config: DirectorConfig,
    lyrics: Arc<dyn LyricsSource>,
    audio: Arc<dyn AudioSource>,
    backend: Option<Arc<dyn GenerativeBackend>>,
    supervisor: Arc<AntifragileSupervisor>,

    pub status: Arc<Mutex<String>>,
    pub logs: Arc<Mutex<Vec<String>>>,
}

impl LyricDirector {
    pub fn new(
        config: DirectorConfig,
        lyrics: Arc<dyn LyricsSource>,
        audio: Arc<dyn AudioSource>,
        backend: Option<Arc<dyn GenerativeBackend>>,
    ) -> Self {
        let supervisor = Arc::new(AntifragileSupervisor::new(BackoffPolicy::from(&config.retry)));
        Self {
            config,
            lyrics,
            audio,
            backend,
            supervisor,
            status: Arc::new(Mutex::new("⚡ Ready".to_string())),
            logs: Arc::new(Mutex::new(vec![
                "[SYSTEM] Lyric Director initialized.".to_string()
            ])),
        }
    }

    /// Wire up the real collaborators: LRCLIB, yt-dlp and Gemini (when an
    /// API key is configured).
    pub async fn from_config(config: DirectorConfig) -> anyhow::Result<Self> {
        let lyrics: Arc<dyn LyricsSource> =
            Arc::new(LrcLibSource::new().context("building LRCLIB client")?);
        let audio: Arc<dyn AudioSource> = Arc::new(YtDlpSource::discover().await);
        let backend: Option<Arc<dyn GenerativeBackend>> = match &config.api_key {
            Some(key) => Some(Arc::new(
                GeminiClient::new(key, &config.api_base, &config.image_model)
                    .context("building Gemini client")?,
            )),
            None => {
                warn!("[CORE] No GEMINI_API_KEY set; running offline with mock content");
                None
            }
        };
        Ok(Self::new(config, lyrics, audio, backend))
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    // --- State Helpers ---

    pub fn set_status(&self, msg: &str) {
        if let Ok(mut status) = self.status.lock() {
            *status = msg.to_string();
        }
    }

    pub fn log(&self, msg: &str) {
        info!("{}", msg);
        if let Ok(mut logs) = self.logs.lock() {
            logs.push(msg.to_string());
        }
    }

    pub fn get_status(&self) -> String {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get_logs(&self) -> Vec<String> {
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    // --- Pipeline ---

    /// Full run: everything up to the final timeline, then the video.
    pub async fn run(&self, query: &str, skip_to: Option<SkipTo>) -> anyhow::Result<PipelineOutput> {
        let prepared = match skip_to {
            None => self.prepare(query).await?,
            Some(skip) => self.prepare_existing(query, skip).await?,
        };
        let video_path = self.assemble(&prepared).await?;
        self.set_status("✅ Done");
        Ok(PipelineOutput {
            workspace: prepared.workspace,
            video_path,
            forge_report: prepared.forge_report,
        })
    }

    /// Search, fetch and download, then run every stage up to
    /// `timeline_final.json`.
    pub async fn prepare(&self, query: &str) -> anyhow::Result<PreparedSong> {
        self.set_status("🔎 Searching...");
        self.log(&format!("[CORE] Processing query: {}", query));

        let song = self
            .audio
            .search(query)
            .await
            .map_err(|e| PipelineError::SongNotFound(format!("{} ({})", query, e)))?;
        self.log(&format!(
            "[CORE] ✅ Song: '{}' by {}",
            song.title,
            song.artist_line()
        ));

        let workspace = SongWorkspace::for_song(&self.config.output_dir, &song);
        workspace
            .ensure()
            .with_context(|| format!("creating {:?}", workspace.root()))?;
        workspace.save_video_info(&VideoInfo::new(&song, query))?;

        let (timeline, stage) = match workspace.latest_stage() {
            Some(stage) => {
                self.log(&format!("[CORE] ♻️ Resuming from {}", stage.file_name()));
                (workspace.load_timeline(stage)?, Some(stage))
            }
            None => (self.fetch_and_segment(song.clone()).await?, None),
        };

        let (audio_path, audio_duration) = self.acquire_audio(&workspace, &song).await?;

        let mut timeline = timeline;
        if stage.is_none() {
            if let Some(total) = audio_duration {
                timeline::apply_audio_duration(&mut timeline, total);
            }
            workspace.save_timeline(TimelineStage::Raw, &timeline)?;
        }

        self.finish_stages(workspace, timeline, stage, audio_path, audio_duration)
            .await
    }

    /// Reuse a song directory found by query, skipping search and download.
    pub async fn prepare_existing(&self, query: &str, skip: SkipTo) -> anyhow::Result<PreparedSong> {
        let workspace = find_song_workspace(&self.config.output_dir, query)
            .ok_or_else(|| PipelineError::WorkspaceNotFound(query.to_string()))?;
        self.log(&format!("[CORE] ⏭️ Skipping to {:?} in {:?}", skip, workspace.root()));

        let stage = workspace
            .latest_stage()
            .ok_or(PipelineError::MissingCheckpoint(TimelineStage::Raw.file_name()))?;
        if skip == SkipTo::Assemble && stage != TimelineStage::Final {
            return Err(PipelineError::MissingCheckpoint(TimelineStage::Final.file_name()).into());
        }
        let timeline = workspace.load_timeline(stage)?;

        let audio_path = find_audio_file(&workspace.audio_dir())
            .await
            .ok_or_else(|| PipelineError::AudioDownload(format!("no audio in {:?}", workspace.audio_dir())))?;
        let audio_duration = self.probe_duration(&audio_path, &timeline.song_info).await;

        if skip == SkipTo::Assemble {
            return Ok(PreparedSong {
                workspace,
                timeline,
                audio_path,
                audio_duration,
                forge_report: None,
            });
        }

        self.finish_stages(workspace, timeline, Some(stage), audio_path, audio_duration)
            .await
    }

    /// Run concept, descriptions and images for whatever is not yet
    /// checkpointed.
    async fn finish_stages(
        &self,
        workspace: SongWorkspace,
        mut timeline: Timeline,
        reached: Option<TimelineStage>,
        audio_path: PathBuf,
        audio_duration: Option<f64>,
    ) -> anyhow::Result<PreparedSong> {
        if timeline.is_empty() {
            return Err(PipelineError::EmptyTimeline(timeline.song_info.title.clone()).into());
        }
        let done = |stage: TimelineStage| reached.map(|r| r >= stage).unwrap_or(false);

        if !done(TimelineStage::WithConcept) || timeline.video_concept.is_none() {
            self.set_status("🎬 Directing...");
            let director = Director::new(
                self.backend.clone(),
                self.supervisor.clone(),
                &self.config.thinking_model,
                &self.config.text_model,
            );
            timeline.video_concept = Some(director.create_concept(&timeline).await);
            workspace.save_timeline(TimelineStage::WithConcept, &timeline)?;
        }

        if !done(TimelineStage::WithDescriptions) {
            self.set_status("✍️ Describing...");
            let describer = Describer::new(
                self.backend.clone(),
                self.supervisor.clone(),
                &self.config.text_model,
            );
            describer.describe(&mut timeline).await;
            workspace.save_timeline(TimelineStage::WithDescriptions, &timeline)?;
        }

        self.set_status("🎨 Generating images...");
        let renderer = PlaceholderRenderer::new(self.config.image_width, self.config.image_height);
        let mut forge = ImageForge::new(
            self.backend.clone(),
            self.supervisor.clone(),
            renderer,
            ForgeSettings::from(&self.config),
        );
        let report = forge
            .forge_timeline(&mut timeline, &workspace)
            .await
            .context("writing segment images")?;
        workspace.save_timeline(TimelineStage::Final, &timeline)?;
        self.log(&format!(
            "[CORE] ✅ Images ready: {} generated, {} placeholders",
            report.generated + report.reused,
            report.placeholders
        ));

        Ok(PreparedSong {
            workspace,
            timeline,
            audio_path,
            audio_duration,
            forge_report: Some(report),
        })
    }

    pub async fn assemble(&self, prepared: &PreparedSong) -> anyhow::Result<PathBuf> {
        self.set_status("🎞️ Assembling video...");
        let output = prepared
            .workspace
            .video_output_path(&prepared.timeline.song_info.title);
        let path = self
            .stitcher()
            .assemble(
                &prepared.timeline,
                &prepared.audio_path,
                prepared.audio_duration,
                &output,
            )
            .await
            .context("assembling video")?;

        let mut info = prepared
            .workspace
            .load_video_info()
            .unwrap_or_else(|| VideoInfo::new(&prepared.timeline.song_info, ""));
        info.output_video = Some(path.clone());
        prepared.workspace.save_video_info(&info)?;
        self.log(&format!("[CORE] 🎉 Video written: {:?}", path));
        Ok(path)
    }

    /// Assemble from a saved timeline and an audio file.
    pub async fn assemble_files(
        &self,
        timeline_path: &Path,
        audio_path: &Path,
        output: &Path,
    ) -> anyhow::Result<PathBuf> {
        let timeline = Timeline::load(timeline_path)?;
        let duration = self.probe_duration(audio_path, &timeline.song_info).await;
        let path = self
            .stitcher()
            .assemble(&timeline, audio_path, duration, output)
            .await
            .context("assembling video")?;
        Ok(path)
    }

    /// Search and segment only; nothing is downloaded.
    pub async fn build_timeline(&self, query: &str) -> anyhow::Result<Timeline> {
        let song = self
            .audio
            .search(query)
            .await
            .map_err(|e| PipelineError::SongNotFound(format!("{} ({})", query, e)))?;
        self.fetch_and_segment(song).await
    }

    pub async fn check_lyrics(&self, query: &str) -> anyhow::Result<(SongInfo, LyricsStatus)> {
        let song = self
            .audio
            .search(query)
            .await
            .map_err(|e| PipelineError::SongNotFound(format!("{} ({})", query, e)))?;
        let status = lyrics_source::check_availability(self.lyrics.as_ref(), &song).await;
        Ok((song, status))
    }

    // --- Stage helpers ---

    async fn fetch_and_segment(&self, song: SongInfo) -> anyhow::Result<Timeline> {
        self.set_status("📝 Fetching lyrics...");
        let lyrics = match self.lyrics.fetch(&song).await {
            Ok(Some(lyrics)) if lyrics.has_timestamps() => lyrics,
            Ok(_) => return Err(PipelineError::NoTimestampedLyrics(song.title.clone()).into()),
            Err(e) => {
                warn!("[CORE] Lyrics lookup failed: {}", e);
                return Err(PipelineError::NoTimestampedLyrics(song.title.clone()).into());
            }
        };
        self.log(&format!("[CORE] 📝 {} timestamped lines", lyrics.synced.len()));

        let duration = song.duration;
        let title = song.title.clone();
        let timeline = timeline::segment_lyrics(&lyrics.synced, song, duration);
        if timeline.is_empty() {
            return Err(PipelineError::EmptyTimeline(title).into());
        }
        self.log(&format!(
            "[CORE] 🧩 Timeline: {} segments, {:.1}s",
            timeline.segments.len(),
            timeline.total_duration()
        ));
        Ok(timeline)
    }

    async fn acquire_audio(
        &self,
        workspace: &SongWorkspace,
        song: &SongInfo,
    ) -> anyhow::Result<(PathBuf, Option<f64>)> {
        self.set_status("📥 Downloading audio...");
        let audio_path = match find_audio_file(&workspace.audio_dir()).await {
            Some(path) => {
                self.log(&format!("[CORE] ♻️ Reusing audio {:?}", path));
                path
            }
            None => self
                .audio
                .download_audio(song, &workspace.audio_dir())
                .await
                .map_err(|e| PipelineError::AudioDownload(e.to_string()))?,
        };
        let duration = self.probe_duration(&audio_path, song).await;
        Ok((audio_path, duration))
    }

    async fn probe_duration(&self, path: &Path, song: &SongInfo) -> Option<f64> {
        match self.audio.duration(path).await {
            Ok(d) if d > 0.0 => Some(d),
            Ok(_) => song.duration,
            Err(e) => {
                warn!("[CORE] Could not probe {:?}: {}", path, e);
                song.duration
            }
        }
    }

    fn stitcher(&self) -> VideoStitcher {
        VideoStitcher::new(StitchSettings {
            width: self.config.image_width,
            height: self.config.image_height,
            fps: self.config.fps,
        })
    }
}
