//! faceplate CLI: propose controls on a faceplate photo.

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};

use faceplate::detect::{detect_image, load_rgba};
use faceplate::{DetectReport, DetectRunConfig, DetectorConfig};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "faceplate")]
#[command(about = "Propose knobs, buttons, switches and lights on hardware faceplate photos")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect controls in an image and write a JSON report.
    Detect(CliDetectArgs),

    /// Print the detector configuration for a sensitivity as JSON.
    PrintConfig {
        /// Detection sensitivity in [0, 1].
        #[arg(long, default_value_t = 0.5)]
        sensitivity: f32,
    },
}

#[derive(Debug, Clone, Args)]
struct CliDetectArgs {
    /// Input image. Overrides `image_path` from --config.
    image: Option<PathBuf>,

    /// Detection sensitivity in [0, 1]. Overrides the config file.
    #[arg(long)]
    sensitivity: Option<f32>,

    /// JSON run config with optional detector field overrides.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report path. Defaults to the config's `output_path`, else stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug or trace. Defaults to
    /// `FACEPLATE_LOG`, else warn.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines through `tracing` (needs the `tracing` feature).
    #[arg(long)]
    json_log: bool,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Detect(args) => run_detect(&args),
        Commands::PrintConfig { sensitivity } => run_print_config(sensitivity),
    }
}

fn init_logging(args: &CliDetectArgs) -> CliResult<()> {
    let level = match &args.log_level {
        Some(name) => LevelFilter::from_str(name.trim())
            .map_err(|_| -> CliError { format!("invalid log level '{name}'").into() })?,
        None => faceplate::core::level_from_env(LevelFilter::Warn),
    };
    if args.json_log {
        #[cfg(feature = "tracing")]
        {
            faceplate::core::init_tracing(true);
            log::set_max_level(level);
            return Ok(());
        }
        #[cfg(not(feature = "tracing"))]
        {
            faceplate::core::init_with_level(level)?;
            log::warn!("--json-log needs the `tracing` feature; using plain logs");
            return Ok(());
        }
    }
    faceplate::core::init_with_level(level)?;
    Ok(())
}

fn run_detect(args: &CliDetectArgs) -> CliResult<()> {
    init_logging(args)?;

    let mut run = match &args.config {
        Some(path) => DetectRunConfig::load_json(path)
            .map_err(|e| -> CliError { format!("failed to read config {}: {}", path.display(), e).into() })?,
        None => DetectRunConfig::default(),
    };
    if let Some(image) = &args.image {
        run.image_path = image.display().to_string();
    }
    if run.image_path.is_empty() {
        return Err("no input image: pass IMAGE or set image_path in --config".into());
    }
    if args.sensitivity.is_some() {
        run.sensitivity = args.sensitivity;
    }
    let config = run.build_config()?;

    info!("loading image: {}", run.image_path);
    let img = load_rgba(&run.image_path)
        .map_err(|e| -> CliError { format!("failed to open image {}: {}", run.image_path, e).into() })?;
    let (w, h) = img.dimensions();
    info!("image size: {}x{}", w, h);

    let mut report = DetectReport::new(run.image_path.clone(), w, h, config);
    let started = Instant::now();
    let drafts = detect_image(&img, &report.config);
    report.set_drafts(drafts, started.elapsed());
    eprintln!(
        "{}: {} ({:.1} ms)",
        run.image_path,
        report.summary(),
        report.elapsed_ms
    );

    let out = args
        .out
        .clone()
        .or_else(|| run.output_path.as_ref().map(PathBuf::from));
    match out {
        Some(path) => {
            report.write_json(&path)?;
            info!("report written to {}", path.display());
        }
        None => {
            let json = serde_json::to_string_pretty(&report)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn run_print_config(sensitivity: f32) -> CliResult<()> {
    let config = DetectorConfig::from_sensitivity(sensitivity);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
