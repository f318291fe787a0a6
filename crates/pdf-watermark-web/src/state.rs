use anyhow::{Context, Result};
use pdf_watermark_core::{AppConfig, WatermarkPipeline};
use std::sync::Arc;
use std::time::Duration;

use crate::session_store::SessionStore;

/// Global application state
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: WatermarkPipeline,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    /// Build the pipeline and session store described by `config`.
    pub fn new(config: AppConfig) -> Result<Self> {
        let pipeline =
            WatermarkPipeline::new(&config).context("Failed to initialize compositor")?;
        Self::with_pipeline(config, pipeline)
    }

    /// Create with a prebuilt pipeline (custom compositor).
    pub fn with_pipeline(config: AppConfig, pipeline: WatermarkPipeline) -> Result<Self> {
        let root = config.sessions.root_dir();
        let sessions = SessionStore::new(
            &root,
            Duration::from_secs(config.sessions.retention_secs),
        )
        .with_context(|| format!("Failed to create session root {}", root.display()))?;

        Ok(Self {
            config,
            pipeline,
            sessions: Arc::new(sessions),
        })
    }

    pub const fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.config.sessions.cleanup_delay_secs)
    }
}
