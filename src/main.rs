// Lyric Director Main Entry Point
// Copyright (c) 2026 Xing_The_Creator | Lyric Director

use lyric_director::agent::core::{LyricDirector, SkipTo};
use lyric_director::agent::recovery::{SongWorkspace, TimelineStage};
use lyric_director::config::DirectorConfig;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "lyric-director")]
#[command(about = "AI-directed lyric video generator", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Song to make a video for (e.g. "Bohemian Rhapsody Queen")
    song_query: Option<String>,

    /// Gemini API key (overrides GEMINI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Output directory (overrides OUTPUT_DIR)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Reuse an existing song directory and start at this stage
    #[arg(long, value_enum)]
    skip_to: Option<SkipStage>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum SkipStage {
    Generate,
    Assemble,
}

impl From<SkipStage> for SkipTo {
    fn from(stage: SkipStage) -> Self {
        match stage {
            SkipStage::Generate => SkipTo::Generate,
            SkipStage::Assemble => SkipTo::Assemble,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build and save only the raw timeline
    Timeline {
        song_query: String,

        /// Where to write the timeline JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report whether timestamped lyrics exist for a song
    Check { song_query: String },

    /// Assemble a video from an existing final timeline
    Assemble {
        /// Final timeline JSON
        #[arg(long)]
        timeline: PathBuf,

        /// Audio file
        #[arg(long)]
        audio: PathBuf,

        /// Output video path
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug,hyper=info,reqwest=info");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    // Global panic handler: log panics instead of crashing silently
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("🚨 [LYRIC DIRECTOR PANIC] at {}: {}", location, message);
    }));

    info!("--- LYRIC DIRECTOR v{} ---", env!("CARGO_PKG_VERSION"));

    let missing_deps = lyric_director::agent::health::check_dependencies();
    if !missing_deps.is_empty() {
        warn!("⚠️ Missing dependencies: {:?}. Some stages will fail.", missing_deps);
    }

    if let Err(e) = run(cli).await {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = DirectorConfig::from_env().with_overrides(cli.api_key, cli.output);
    let director = LyricDirector::from_config(config).await?;

    match cli.command {
        Some(Commands::Timeline { song_query, output }) => {
            let timeline = director.build_timeline(&song_query).await?;
            let path = output.unwrap_or_else(|| {
                SongWorkspace::for_song(&director.config().output_dir, &timeline.song_info)
                    .timeline_path(TimelineStage::Raw)
            });
            timeline.save(&path)?;
            println!(
                "🧩 {} segments ({:.1}s) saved to {:?}",
                timeline.segments.len(),
                timeline.total_duration(),
                path
            );
        }
        Some(Commands::Check { song_query }) => {
            let (song, status) = director.check_lyrics(&song_query).await?;
            println!("🎵 {} by {}", song.title, song.artist_line());
            println!(
                "   lyrics: {}  timestamps: {}",
                if status.has_lyrics { "yes" } else { "no" },
                if status.has_timestamps { "yes" } else { "no" }
            );
            println!("   {}", status.message);
        }
        Some(Commands::Assemble {
            timeline,
            audio,
            output,
        }) => {
            let path = director.assemble_files(&timeline, &audio, &output).await?;
            println!("🎞️ Video saved: {:?}", path);
        }
        None => {
            let query = cli
                .song_query
                .context("a song query is required (e.g. lyric-director \"Song Artist\")")?;
            let result = director.run(&query, cli.skip_to.map(SkipTo::from)).await?;
            if let Some(report) = &result.forge_report {
                info!(
                    "🎨 Images: {} generated, {} reused, {} placeholders",
                    report.generated, report.reused, report.placeholders
                );
            }
            println!("🎉 Lyric video: {:?}", result.video_path);
        }
    }
    Ok(())
}
