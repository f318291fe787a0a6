//! PDF Watermark Web - HTTP service stamping PDFs with watermark phrases.

mod helpers;
mod routes;
mod session_store;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use pdf_watermark_core::{AppConfig, CompositorBackend};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "pdf-watermark-web")]
#[command(author, version, about = "PDF Watermark Web Server", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Config file (defaults to ~/.config/pdf-watermark/config.toml or ./config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Compositor backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// PDF services API base URL
    #[arg(long, env = "PDF_SERVICES_API_BASE")]
    api_base: Option<String>,

    /// PDF services client id
    #[arg(long, env = "PDF_SERVICES_CLIENT_ID")]
    client_id: Option<String>,

    /// PDF services client secret
    #[arg(long, env = "PDF_SERVICES_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Root directory for per-request working directories
    #[arg(long, env = "WATERMARK_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Backend {
    Remote,
    Local,
}

impl From<Backend> for CompositorBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Remote => Self::Remote,
            Backend::Local => Self::Local,
        }
    }
}

impl Args {
    /// Load the config file and apply command-line/environment overrides.
    fn into_config(self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path).context("Failed to load config")?,
            None => AppConfig::load(),
        };

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(backend) = self.backend {
            config.compositor.backend = backend.into();
        }
        if let Some(api_base) = self.api_base {
            config.compositor.api_base = api_base;
        }
        if self.client_id.is_some() {
            config.compositor.client_id = self.client_id;
        }
        if self.client_secret.is_some() {
            config.compositor.client_secret = self.client_secret;
        }
        if self.work_dir.is_some() {
            config.sessions.root = self.work_dir;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},hyper=info,reqwest=info")));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = args.into_config()?;

    let state = Arc::new(
        AppState::new(config).context("Failed to initialize application state")?,
    );
    info!(
        "Compositor: {}, sessions under {}",
        state.pipeline.compositor_info().name,
        state.sessions.root().display()
    );

    // Spawn background task sweeping stale session directories
    let sweep_state = Arc::clone(&state);
    tokio::spawn(async move {
        let sweep_interval = Duration::from_secs(sweep_state.config.sessions.sweep_interval_secs.max(1));
        loop {
            tokio::time::sleep(sweep_interval).await;
            let removed = sweep_state.sessions.sweep().await;
            tracing::debug!("Completed session sweep ({} removed)", removed);
        }
    });

    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .context("Invalid listen address")?;
    let app = routes::router(Arc::clone(&state));

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
