//! tagsmith-bench: CLI tool for preparation pipeline experiments.
//!
//! Runs the preparation pipeline on an image file with configurable
//! parameters, printing per-stage diagnostics. Useful for:
//!
//! - Tuning the isolator's color tolerance and border band on real logos
//! - Checking margin and canvas size against the centering rules
//! - Measuring per-stage durations to find slow stages
//!
//! With `--verdict-json` it also places the result on the blank the way
//! a session would after the gate answered, optionally applying edits,
//! and prints the clamped transform.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin tagsmith-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tagsmith_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use tagsmith_pipeline::{CanonicalImage, PipelineConfig, ResampleFilter};
use tagsmith_placement::{
    ManufacturabilityVerdict, PlacementEngine, PlacementError, PrintBounds, VerdictOutcome,
};

/// Logo preparation diagnostics for tagsmith.
///
/// Decodes, isolates, and centers a logo with configurable parameters and
/// prints per-stage timing and metrics.
#[derive(Parser)]
#[command(name = "tagsmith-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Working resolution (max dimension in pixels before isolation).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_WORKING_RESOLUTION, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    working_resolution: u32,

    /// Filter used for the working-resolution reduction.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    downsample_filter: Filter,

    /// Minimum RGB distance from the border color for subject pixels.
    #[arg(long, default_value_t = tagsmith_pipeline::IsolationConfig::DEFAULT_COLOR_TOLERANCE)]
    color_tolerance: f64,

    /// Margin around the content as a fraction of its longer side.
    #[arg(long, default_value_t = tagsmith_pipeline::CenteringConfig::DEFAULT_MARGIN_FRACTION)]
    margin: f64,

    /// Side length of the canonical canvas in pixels.
    #[arg(long, default_value_t = tagsmith_pipeline::CenteringConfig::DEFAULT_CANVAS_SIZE, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    canvas_size: u32,

    /// Write the canonical image to this PNG file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Manufacturability verdict as a JSON string. Enables the placement
    /// preview.
    #[arg(long)]
    verdict_json: Option<String>,

    /// Print bounds as a JSON string. Missing fields take defaults.
    #[arg(long)]
    bounds_json: Option<String>,

    /// Requested horizontal offset in millimetres.
    #[arg(long, allow_hyphen_values = true)]
    offset_x: Option<f64>,

    /// Requested vertical offset in millimetres.
    #[arg(long, allow_hyphen_values = true)]
    offset_y: Option<f64>,

    /// Requested printed canvas size in millimetres.
    #[arg(long)]
    scale: Option<f64>,

    /// Requested rotation in degrees.
    #[arg(long, allow_hyphen_values = true)]
    rotation: Option<f64>,

    /// Log pipeline and placement internals (debug level) to stderr.
    #[arg(short, long)]
    verbose: bool,
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl Filter {
    const fn from_pipeline(f: ResampleFilter) -> Self {
        match f {
            ResampleFilter::Nearest => Self::Nearest,
            ResampleFilter::Triangle => Self::Triangle,
            ResampleFilter::CatmullRom => Self::CatmullRom,
            ResampleFilter::Gaussian => Self::Gaussian,
            ResampleFilter::Lanczos3 => Self::Lanczos3,
        }
    }

    const fn to_pipeline(self) -> ResampleFilter {
        match self {
            Self::Nearest => ResampleFilter::Nearest,
            Self::Triangle => ResampleFilter::Triangle,
            Self::CatmullRom => ResampleFilter::CatmullRom,
            Self::Gaussian => ResampleFilter::Gaussian,
            Self::Lanczos3 => ResampleFilter::Lanczos3,
        }
    }
}

/// Follows [`PipelineConfig::DEFAULT_DOWNSAMPLE_FILTER`].
const CLI_DEFAULT_FILTER: Filter = Filter::from_pipeline(PipelineConfig::DEFAULT_DOWNSAMPLE_FILTER);

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// `--config-json` wins over the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let mut config = PipelineConfig {
        working_resolution: cli.working_resolution,
        downsample_filter: cli.downsample_filter.to_pipeline(),
        ..PipelineConfig::default()
    };
    config.isolation.color_tolerance = cli.color_tolerance;
    config.centering.margin_fraction = cli.margin;
    config.centering.canvas_size = cli.canvas_size;
    Ok(config)
}

fn bounds_from_cli(cli: &Cli) -> Result<PrintBounds, String> {
    cli.bounds_json.as_ref().map_or_else(
        || Ok(PrintBounds::default()),
        |json| serde_json::from_str(json).map_err(|e| format!("Error parsing --bounds-json: {e}")),
    )
}

/// Default `env_logger` filter. Progress lines log at info, so they show
/// unless `RUST_LOG` says otherwise.
const fn log_filter(cli: &Cli) -> &'static str {
    if cli.verbose { "debug" } else { "info" }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(&cli)))
        .init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let verdict: Option<ManufacturabilityVerdict> = match cli.verdict_json.as_deref().map(serde_json::from_str) {
        None => None,
        Some(Ok(v)) => Some(v),
        Some(Err(e)) => {
            eprintln!("Error parsing --verdict-json: {e}");
            return ExitCode::FAILURE;
        }
    };

    let bounds = match bounds_from_cli(&cli) {
        Ok(b) => b,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "image: {} ({} bytes), {} run(s)",
        cli.image_path.display(),
        image_bytes.len(),
        cli.runs,
    );
    log::debug!("config: {config:#?}");

    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    let mut first_canonical = None;

    for run in 0..cli.runs {
        if cli.runs > 1 {
            log::info!("run {}/{}", run + 1, cli.runs);
        }

        match tagsmith_pipeline::diagnostics::prepare_with_diagnostics(
            image_bytes.clone(),
            &config,
            &StdClock,
        ) {
            Ok((canonical, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                    println!("Fingerprint: {:016x}", canonical.fingerprint());
                }

                if first_canonical.is_none() {
                    first_canonical = Some(canonical);
                }
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    let Some(canonical) = first_canonical else {
        return ExitCode::FAILURE;
    };

    if let Some(ref path) = cli.output {
        match canonical.encode_png() {
            Ok(png) => match std::fs::write(path, &png) {
                Ok(()) => log::info!("PNG written to {} ({} bytes)", path.display(), png.len()),
                Err(e) => log::error!("writing PNG to {}: {e}", path.display()),
            },
            Err(e) => log::error!("encoding PNG: {e}"),
        }
    }

    if let Some(verdict) = verdict
        && let Err(e) = preview_placement(&cli, bounds, canonical, verdict)
    {
        eprintln!("Placement error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Place the canonical image with `verdict`, apply the requested edits,
/// and print where the design ended up.
fn preview_placement(
    cli: &Cli,
    bounds: PrintBounds,
    canonical: CanonicalImage,
    verdict: ManufacturabilityVerdict,
) -> Result<(), PlacementError> {
    let mut engine = PlacementEngine::new(bounds);
    engine.load_canonical(Arc::new(canonical));

    let placed = match engine.apply_verdict(verdict)? {
        VerdictOutcome::Placed(t) => t,
        VerdictOutcome::NotPrintable { reasoning } => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "placement": { "printable": false, "reasoning": reasoning } })
                );
            } else {
                println!();
                println!("Not printable: {reasoning}");
            }
            return Ok(());
        }
    };

    if cli.scale.is_some() || cli.rotation.is_some() || cli.offset_x.is_some() || cli.offset_y.is_some() {
        if let Some(scale) = cli.scale {
            engine.set_scale(scale)?;
        }
        if let Some(degrees) = cli.rotation {
            engine.set_rotation(degrees.to_radians())?;
        }
        engine.set_offset(
            cli.offset_x.unwrap_or(f64::NAN),
            cli.offset_y.unwrap_or(f64::NAN),
        )?;
    }

    let Some(view) = engine.view() else {
        return Err(PlacementError::NotReady);
    };
    let range = engine.offset_range();

    if cli.json {
        let mut report = serde_json::json!({
            "printable": true,
            "default": placed,
            "transform": view.transform,
            "rotation_degrees": view.transform.rotation_degrees(),
            "footprint": view.footprint,
            "state": view.state.to_string(),
            "suggested_colors": view.suggested_colors,
        });
        if let Some(r) = range {
            report["offset_range"] = serde_json::json!({
                "x": [r.x.min, r.x.max],
                "y": [r.y.min, r.y.max],
            });
        }
        println!("{}", serde_json::json!({ "placement": report }));
        return Ok(());
    }

    let t = view.transform;
    let fp = view.footprint;
    println!();
    println!("Placement\n{}", "=".repeat(60));
    println!("State:     {}", view.state);
    println!("Default:   scale {:.2}mm at origin", placed.scale);
    println!(
        "Transform: offset ({:+.2}, {:+.2})mm  scale {:.2}mm  rotation {:.1}°",
        t.offset_x,
        t.offset_y,
        t.scale,
        t.rotation_degrees(),
    );
    println!(
        "Footprint: x {:+.2}..{:+.2}mm  y {:+.2}..{:+.2}mm",
        fp.min_x, fp.max_x, fp.min_y, fp.max_y,
    );
    if let Some(r) = range {
        println!(
            "Offsets:   x {:+.2}..{:+.2}mm  y {:+.2}..{:+.2}mm",
            r.x.min, r.x.max, r.y.min, r.y.max,
        );
    }
    if !view.suggested_colors.is_empty() {
        println!("Colors:    {}", view.suggested_colors.join(", "));
    }
    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

type StageExtractor = fn(&PipelineDiagnostics) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Decode", |d| d.decode.duration),
        ("Downsample", |d| d.downsample.duration),
        ("Isolate", |d| d.isolate.duration),
        ("Center", |d| d.center.duration),
    ];

    for (name, extractor) in stage_extractors {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
