//! posetrack CLI entry point.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use posetrack_rs::integration::{
    DirectorySnapshotStore, FrameOrchestrator, ImageSequenceSink, ImageSequenceSource,
    ReplayExtractor, StreamSummary,
};
use posetrack_rs::{PipelineConfig, render};

#[derive(Parser)]
#[command(name = "posetrack", version, about = "Track and annotate people in frame sequences")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one frame sequence
    Process {
        /// Directory of frame images
        #[arg(short, long)]
        input: PathBuf,
        /// Recorded keypoints, one JSON line per frame
        #[arg(short, long)]
        keypoints: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Process every `<name>/` frame directory that has a `<name>.jsonl` beside it
    Batch {
        #[arg(short, long)]
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Output directory; snapshots go to its `screenshots/` subdirectory
    #[arg(short, long)]
    output: PathBuf,
    /// Frame rate of the input sequences
    #[arg(long)]
    fps: Option<f64>,
    /// Font for identifiers and labels
    #[arg(long)]
    font: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Process {
            input,
            keypoints,
            output,
        } => {
            let config = apply_overrides(config, &output)?;
            let summary = process_stream(&config, &input, &keypoints, &output.output)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Batch { input, output } => {
            let config = apply_overrides(config, &output)?;
            let streams = discover_streams(&input)?;
            if streams.is_empty() {
                bail!("no frame directories with keypoints found in {}", input.display());
            }
            let mut failed = 0;
            for (frames, keypoints) in streams {
                // each stream gets its own orchestrator and engine
                if let Err(err) = process_stream(&config, &frames, &keypoints, &output.output) {
                    error!(stream = %frames.display(), "{err:#}");
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{failed} stream(s) failed");
            }
        }
    }

    Ok(())
}

fn apply_overrides(mut config: PipelineConfig, output: &OutputArgs) -> Result<PipelineConfig> {
    if let Some(fps) = output.fps {
        config.fps = fps;
    }
    if let Some(font) = &output.font {
        config.render.font_path = Some(font.clone());
    }
    config.validate()?;
    Ok(config)
}

fn discover_streams(input: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut streams = Vec::new();
    for entry in fs::read_dir(input).with_context(|| format!("reading {}", input.display()))? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let keypoints = path.with_extension("jsonl");
        if keypoints.is_file() {
            streams.push((path, keypoints));
        } else {
            info!(dir = %path.display(), "no keypoints file, skipping");
        }
    }
    streams.sort();
    Ok(streams)
}

fn process_stream(
    config: &PipelineConfig,
    frames: &Path,
    keypoints: &Path,
    output_dir: &Path,
) -> Result<StreamSummary> {
    let stem = frames
        .file_name()
        .and_then(|name| name.to_str())
        .context("input directory has no usable name")?
        .to_string();

    let extractor = ReplayExtractor::open(keypoints)?
        .with_confidence_threshold(config.keypoint_confidence_threshold);
    let mut orchestrator = FrameOrchestrator::new(extractor, config.clone());
    if let Some(font_path) = &config.render.font_path {
        orchestrator = orchestrator.with_font(render::load_font(font_path)?);
    }

    let mut source = ImageSequenceSource::open(frames, config.fps)
        .with_context(|| format!("opening frames in {}", frames.display()))?;
    let mut sink =
        ImageSequenceSink::create(output_dir.join(format!("processed_{stem}")), config.fps)?;
    let mut snapshots = DirectorySnapshotStore::create(output_dir.join("screenshots"))?;

    let mut summary = orchestrator.run(&stem, &mut source, &mut sink, &mut snapshots)?;
    summary.processed_output = Some(sink.dir().to_path_buf());

    let summary_path = output_dir.join(format!("processed_{stem}.json"));
    fs::write(&summary_path, serde_json::to_vec_pretty(&summary)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;
    Ok(summary)
}
