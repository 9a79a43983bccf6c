//! `segcap` command line
//!
//! ```bash
//! # Record video + audio until Ctrl-C, tag the chunks "hvac"
//! segcap record --audio --category hvac
//!
//! # Record video only for 10 minutes with 50 MiB chunks
//! segcap record --duration 600 --threshold 52428800
//!
//! # Mux one video/audio pair by hand
//! segcap merge Videos/temp_vdo_16oct2026_101500_1.mp4 Audios/audio_seg_x.wav
//! ```

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use segcap::config::{load_config, SegmenterConfig};
use segcap::export::{FfmpegMuxer, MergeRequest, MuxSettings, Muxer};
use segcap::utils::paths::sanitize_category;
use segcap::SegmentationController;
use std::path::PathBuf;
use std::time::Duration;

/// Size-bounded segmented camera recording.
#[derive(Parser, Debug)]
#[command(name = "segcap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; defaults apply when it does not exist.
    #[arg(short, long, global = true, default_value = "segcap.json")]
    config: PathBuf,

    /// Directory holding Videos/ and Audios/.
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record until Ctrl-C (or --duration), then print the finalized chunks as JSON.
    Record {
        /// Capture audio per chunk and merge it into the video.
        #[arg(long, default_value_t = false)]
        audio: bool,

        /// Category tag embedded in every delivery filename.
        #[arg(long, default_value = "general")]
        category: String,

        /// Stop automatically after this many seconds.
        #[arg(long)]
        duration: Option<u64>,

        /// Rollover threshold in bytes.
        #[arg(long)]
        threshold: Option<u64>,
    },

    /// Merge one video file with one audio file.
    Merge {
        video: PathBuf,
        audio: PathBuf,

        #[arg(long)]
        category: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    segcap::init_logging();
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(base_dir) = cli.base_dir {
        config.base_dir = base_dir;
    }

    tracing::info!("Starting segcap v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Record {
            audio,
            category,
            duration,
            threshold,
        } => {
            if let Some(threshold) = threshold {
                config.rollover_threshold_bytes = threshold;
            }
            record(config, audio, &category, duration).await
        }
        Command::Merge {
            video,
            audio,
            category,
        } => merge(config, video, audio, category).await,
    }
}

async fn record(
    config: SegmenterConfig,
    with_audio: bool,
    category: &str,
    duration: Option<u64>,
) -> anyhow::Result<()> {
    config.validate()?;
    let mut controller = SegmentationController::with_ffmpeg(config);
    controller
        .start(with_audio)
        .await
        .context("starting recording")?;

    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    tracing::info!("Duration of {}s reached", secs);
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
            tracing::info!("Interrupted");
        }
    }

    let segments = loop {
        match controller.stop(category).await {
            Ok(segments) => break segments,
            Err(segcap::SegmentError::StopTimeout(waited)) => {
                tracing::warn!("Still finalizing after {:?}, waiting again", waited);
            }
            Err(e) => return Err(e).context("stopping recording"),
        }
    };

    println!("{}", serde_json::to_string_pretty(&segments)?);
    Ok(())
}

async fn merge(
    config: SegmenterConfig,
    video: PathBuf,
    audio: PathBuf,
    category: Option<String>,
) -> anyhow::Result<()> {
    let muxer = FfmpegMuxer::new(MuxSettings::from_config(&config));
    let now = Local::now();
    let request = MergeRequest {
        video,
        audio,
        session_id: 0,
        chunk_index: 0,
        start: now,
        end: now,
        category: category.as_deref().map(sanitize_category),
    };

    let merged = muxer.merge(&request).await.context("merging")?;
    println!("{}", merged.display());
    Ok(())
}
