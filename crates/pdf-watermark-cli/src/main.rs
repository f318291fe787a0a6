//! PDF Watermark CLI - Command line tool for stamping watermark phrases onto PDFs.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_watermark_core::{
    AppConfig, Appearance, CompositorBackend, WatermarkPipeline, WatermarkRequest, package,
    parse_phrases,
};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendOption {
    Remote,
    Local,
}

impl From<BackendOption> for CompositorBackend {
    fn from(opt: BackendOption) -> Self {
        match opt {
            BackendOption::Remote => Self::Remote,
            BackendOption::Local => Self::Local,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pdf-watermark")]
#[command(author, version, about = "Stamp watermark phrases onto a PDF", long_about = None)]
struct Args {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Comma-separated watermark phrases, one output per phrase
    #[arg(short, long)]
    phrases: String,

    /// Output file (default: the generated PDF or ZIP name in the current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Font size in points
    #[arg(long)]
    font_size: Option<f32>,

    /// Rotation in degrees, counter-clockwise
    #[arg(long, allow_negative_numbers = true)]
    angle: Option<f32>,

    /// Opacity from 0.0 to 1.0
    #[arg(long)]
    opacity: Option<f32>,

    /// Horizontal position, percent of page width
    #[arg(long)]
    pos_x: Option<f32>,

    /// Vertical position, percent of page height from the bottom
    #[arg(long)]
    pos_y: Option<f32>,

    /// Compositor backend (default from config: remote)
    #[arg(long, value_enum)]
    backend: Option<BackendOption>,

    /// PDF services API base URL
    #[arg(long, env = "PDF_SERVICES_API_BASE")]
    api_base: Option<String>,

    /// PDF services client id
    #[arg(long, env = "PDF_SERVICES_CLIENT_ID")]
    client_id: Option<String>,

    /// PDF services client secret
    #[arg(long, env = "PDF_SERVICES_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Load or create config
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    // Override config with CLI arguments
    if let Some(backend) = args.backend {
        config.compositor.backend = backend.into();
    }
    if let Some(api_base) = args.api_base {
        config.compositor.api_base = api_base;
    }
    if args.client_id.is_some() {
        config.compositor.client_id = args.client_id;
    }
    if args.client_secret.is_some() {
        config.compositor.client_secret = args.client_secret;
    }

    // Load input PDF
    info!("Loading PDF: {}", args.input.display());
    let source = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let appearance = Appearance::from_values(
        args.font_size,
        args.angle,
        args.opacity,
        args.pos_x,
        args.pos_y,
    );
    let request = WatermarkRequest::new(source, parse_phrases(&args.phrases), appearance)
        .context("Invalid watermark request")?;

    let pipeline =
        WatermarkPipeline::new(&config).context("Failed to initialize compositor")?;
    info!("Using {} compositor", pipeline.compositor_info().name);

    let work_dir = tempfile::tempdir().context("Failed to create working directory")?;

    // Setup progress bar
    let pb = ProgressBar::new(request.effective_phrase_count() as u64);
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let progress = pb.clone();
    let outputs = pipeline
        .run_with_progress(
            &request,
            work_dir.path(),
            Some(Box::new(move |done, _total| progress.set_position(done as u64))),
        )
        .await
        .context("Watermarking failed")?;

    pb.finish_with_message("Watermarking complete");

    let bundle = package(&outputs, work_dir.path()).context("Failed to package results")?;

    // Determine output path
    let output_path = args
        .output
        .unwrap_or_else(|| PathBuf::from(bundle.file_name()));

    std::fs::copy(bundle.path(), &output_path)
        .with_context(|| format!("Failed to write output: {}", output_path.display()))?;

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!("Watermarked output saved to: {}", output_path.display());
    }

    Ok(())
}
