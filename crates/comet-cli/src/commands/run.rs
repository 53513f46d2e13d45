use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use comet_core::config::AlignmentConfig;
use comet_core::error::CometError;
use comet_core::interpolation::PixelInterpolation;
use comet_core::io::ImageCodec;
use comet_core::scheduler::Scheduler;
use tracing::debug;

use crate::progress::TerminalProgress;
use crate::summary::{print_run_summary, print_run_result};

#[derive(Clone, Copy, ValueEnum)]
pub enum InterpolationArg {
    Nearest,
    Bilinear,
    BicubicSpline,
    BicubicBSpline,
    Lanczos3,
    Lanczos4,
    Lanczos5,
    MitchellNetravali,
    CatmullRom,
    CubicBSpline,
}

impl From<InterpolationArg> for PixelInterpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::Nearest => PixelInterpolation::NearestNeighbor,
            InterpolationArg::Bilinear => PixelInterpolation::Bilinear,
            InterpolationArg::BicubicSpline => PixelInterpolation::BicubicSpline,
            InterpolationArg::BicubicBSpline => PixelInterpolation::BicubicBSpline,
            InterpolationArg::Lanczos3 => PixelInterpolation::Lanczos3,
            InterpolationArg::Lanczos4 => PixelInterpolation::Lanczos4,
            InterpolationArg::Lanczos5 => PixelInterpolation::Lanczos5,
            InterpolationArg::MitchellNetravali => PixelInterpolation::MitchellNetravali,
            InterpolationArg::CatmullRom => PixelInterpolation::CatmullRom,
            InterpolationArg::CubicBSpline => PixelInterpolation::CubicBSpline,
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// Alignment config file (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Write aligned frames to this directory instead of next to each source
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum number of frames processed at once
    #[arg(long)]
    pub threads: Option<usize>,

    /// Pixel interpolation used for every warp
    #[arg(long, value_enum)]
    pub interpolation: Option<InterpolationArg>,

    /// Overwrite existing output files
    #[arg(long)]
    pub overwrite: bool,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(ref dir) = args.output_dir {
        config.output.directory = dir.clone();
    }
    if let Some(threads) = args.threads {
        config.threads = Some(threads);
    }
    if let Some(method) = args.interpolation {
        config.interpolation.method = method.into();
    }
    if args.overwrite {
        config.output.overwrite = true;
    }
    config.validate().context("Invalid alignment config")?;

    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure the worker thread pool")?;
    }

    let codec = ImageCodec::new();
    let progress = TerminalProgress::new()?;
    let mut scheduler = Scheduler::new(&config, &codec, &progress);
    print_run_summary(&config, scheduler.slot_count());

    let start = Instant::now();
    let result = scheduler.run();
    progress.finish();
    let summary = result?;

    print_run_result(&summary, start.elapsed());
    Ok(())
}

/// Read and parse an alignment config file.
pub fn load_config(path: &Path) -> Result<AlignmentConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: AlignmentConfig = toml::from_str(&contents)
        .map_err(|e| CometError::Config(e.to_string()))
        .with_context(|| format!("Invalid alignment config {}", path.display()))?;
    debug!(path = %path.display(), "loaded alignment config");
    Ok(config)
}
