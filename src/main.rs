// Command-line runner for the `hero_tune` library.
//
// `analyze` tunes still images from disk the way image mode would on load.
// `page` runs a whole manifest of heroes through the registration pass; video
// heroes whose sources are still images are sampled as a looping frame
// sequence, any other video source is reported as a load failure because this
// runner carries no video decoder.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hero_tune::core_modules::frame_sampler::{FrameLoop, FrameSampler};
use hero_tune::core_modules::hero::HeroConfig;
use hero_tune::core_modules::style_sink::StyleMap;
use hero_tune::core_modules::tuning::TuningConfig;
use hero_tune::page::{HeroElement, Page};
use hero_tune::pipeline::{Attachment, HeroPipeline};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hero_tune", version, about = "Adaptive readability tuning for hero backgrounds")]
struct Cli {
    /// JSON file overriding any of the tuning constants.
    #[arg(long, global = true)]
    tuning: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Tune one or more background images and print their styling variables.
    Analyze {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Directory to write each sampled buffer into, as `<name>.sample.png`.
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Run every hero of a JSON page manifest.
    Page {
        manifest: PathBuf,
        /// How many sample intervals to let video heroes run.
        #[arg(long, default_value_t = 4)]
        ticks: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_tuning(cli.tuning.as_deref())?;
    let pipeline = HeroPipeline::new(config);

    match cli.command {
        Command::Analyze { images, dump } => analyze(&pipeline, &images, dump.as_deref()),
        Command::Page { manifest, ticks } => run_page(pipeline, &manifest, ticks).await,
    }
}

fn load_tuning(path: Option<&Path>) -> Result<TuningConfig> {
    let Some(path) = path else {
        return Ok(TuningConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading tuning file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing tuning file {}", path.display()))
}

fn decode(path: &Path) -> Result<RgbaImage, image::ImageError> {
    Ok(image::open(path)?.to_rgba8())
}

fn analyze(pipeline: &HeroPipeline, images: &[PathBuf], dump: Option<&Path>) -> Result<()> {
    for path in images {
        let id = path.display().to_string();
        let hero = HeroConfig {
            bg: Some(id.clone()),
            ..Default::default()
        };
        let mut style = StyleMap::new();
        if let Attachment::Image(tuner) = pipeline.attach(&id, &hero, &mut style) {
            match decode(path) {
                Ok(image) => {
                    // A failed sample has already fallen back to the safe defaults.
                    if let Err(err) = tuner.on_load(&image, &mut style) {
                        debug!(hero = %id, %err, "printing conservative defaults");
                    }
                    if let Some(dir) = dump {
                        dump_sample(pipeline, path, &image, dir)?;
                    }
                }
                Err(err) => {
                    tuner.on_error(&err.to_string(), &mut style);
                }
            }
        }
        println!("{id}: {style}");
    }
    Ok(())
}

fn dump_sample(pipeline: &HeroPipeline, path: &Path, image: &RgbaImage, dir: &Path) -> Result<()> {
    let sampler = FrameSampler::square(pipeline.config().image_buffer);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let target = dir.join(format!("{stem}.sample.png"));
    sampler
        .sample_image(image)?
        .save_png(&target)
        .with_context(|| format!("writing {}", target.display()))?;
    info!(path = %target.display(), "sample buffer written");
    Ok(())
}

async fn run_page(pipeline: HeroPipeline, manifest: &Path, ticks: u32) -> Result<()> {
    let raw = std::fs::read_to_string(manifest)
        .with_context(|| format!("reading manifest {}", manifest.display()))?;
    let elements: Vec<HeroElement> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing manifest {}", manifest.display()))?;
    let base = manifest.parent().unwrap_or_else(|| Path::new("."));
    let interval = Duration::from_millis(pipeline.config().sample_interval_ms);

    let mut page = Page::register(pipeline, elements);
    let ids: Vec<String> = page.ids().map(str::to_string).collect();

    for id in &ids {
        if let Some(src) = page.image_src(id).map(str::to_string) {
            match decode(&base.join(&src)) {
                Ok(image) => {
                    if let Err(err) = page.image_loaded(id, &image) {
                        debug!(hero = %id, %err, "image hero kept conservative defaults");
                    }
                }
                Err(err) => page.media_failed(id, &err.to_string())?,
            }
            continue;
        }

        let Some(playback) = page.playback(id).cloned() else {
            continue;
        };
        let frames: Result<Vec<RgbaImage>, _> = playback
            .sources
            .iter()
            .map(|source| decode(&base.join(&source.url)))
            .collect();
        match frames {
            Ok(frames) if !frames.is_empty() => {
                info!(hero = %id, frames = frames.len(), "sampling still-image sequence");
                page.start_video(id, FrameLoop::new(frames))?;
            }
            _ => {
                warn!(hero = %id, "no video decoder available");
                page.media_failed(id, "no video decoder available for these sources")?;
            }
        }
    }

    tokio::time::sleep(interval * ticks + Duration::from_millis(50)).await;
    page.shutdown().await;

    for id in &ids {
        let mode = page.mode(id).unwrap_or("unknown");
        let style = page.style(id).unwrap_or_default();
        println!("{id} [{mode}]: {style}");
    }
    Ok(())
}
