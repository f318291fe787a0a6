//! PDF Watermark Core Library
//!
//! This library provides the core functionality for watermarking PDF documents:
//! - Request validation (phrases, appearance options, PDF detection)
//! - Overlay generation sized to the source's reference page
//! - Compositing through a remote PDF service or locally with lopdf
//! - Packaging results as a single PDF or a ZIP archive

pub mod compositor;
pub mod config;
pub mod error;
pub mod package;
pub mod pdf;
pub mod request;
pub mod util;

pub use compositor::{Compositor, CompositorInfo, LocalCompositor, RemoteCompositor, create_compositor};
pub use config::{
    AppConfig, CompositorBackend, CompositorConfig, PipelineConfig, ServerConfig, SessionConfig,
};
pub use error::{Error, Result};
pub use package::{OutputBundle, package};
pub use pdf::{OverlayDocument, OverlayGenerator, PageIndex, PageSize, PdfDocument};
pub use request::{Appearance, WatermarkRequest, looks_like_pdf, parse_phrases};
pub use util::sanitize_filename;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Progress callback: `(completed, total)` phrases.
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send>;

/// High-level watermarking pipeline that combines all components.
///
/// Phrases are processed strictly one after another: each overlay is
/// generated, composited and written before the next phrase starts. The
/// remote compositor meters usage per call and throttles bursts, so running
/// jobs concurrently would only trade latency for quota errors.
pub struct WatermarkPipeline {
    compositor: Arc<dyn Compositor>,
    generator: OverlayGenerator,
    /// `None` means compositor calls are not bounded
    job_timeout: Option<Duration>,
}

impl WatermarkPipeline {
    /// Create a pipeline with the compositor selected by the configuration
    pub fn new(config: &AppConfig) -> Result<Self> {
        let compositor = create_compositor(&config.compositor)?;
        Ok(Self::with_compositor(compositor, &config.pipeline))
    }

    /// Create with a custom compositor
    pub fn with_compositor(compositor: Arc<dyn Compositor>, config: &PipelineConfig) -> Self {
        let job_timeout =
            (config.job_timeout_secs > 0).then(|| Duration::from_secs(config.job_timeout_secs));

        Self {
            compositor,
            generator: OverlayGenerator::new(),
            job_timeout,
        }
    }

    pub fn compositor_info(&self) -> CompositorInfo {
        self.compositor.info()
    }

    /// Watermark the source once per phrase, writing `<phrase slug>.pdf` files
    /// into `out_dir`. Returns the written paths in phrase order.
    pub async fn run(&self, request: &WatermarkRequest, out_dir: &Path) -> Result<Vec<PathBuf>> {
        self.run_with_progress(request, out_dir, None).await
    }

    /// Same as [`run`](Self::run), reporting progress after each phrase.
    ///
    /// The first failure aborts the run; files already written stay in
    /// `out_dir` for the caller to clean up.
    pub async fn run_with_progress(
        &self,
        request: &WatermarkRequest,
        out_dir: &Path,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<Vec<PathBuf>> {
        let doc = PdfDocument::from_bytes(request.source().clone())?;
        let total = request.effective_phrase_count();

        info!(
            "Watermarking {}-page document with {} phrase(s) via {}",
            doc.page_count(),
            total,
            self.compositor.name()
        );

        let mut used_stems = HashSet::new();
        let mut outputs = Vec::with_capacity(total);

        for phrase in request.phrases().iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            debug!("Phrase {}/{}: '{}'", outputs.len() + 1, total, phrase);

            let overlay = self.generator.generate(&doc, phrase, request.appearance())?;
            let stamped = self
                .composite(doc.bytes(), &overlay, request.appearance())
                .await?;

            let stem = util::unique_stem(&sanitize_filename(phrase), &mut used_stems);
            let path = out_dir.join(format!("{stem}.pdf"));
            tokio::fs::write(&path, &stamped).await?;
            outputs.push(path);

            if let Some(ref callback) = progress_callback {
                callback(outputs.len(), total);
            }
        }

        info!("Produced {} watermarked document(s)", outputs.len());
        Ok(outputs)
    }

    async fn composite(
        &self,
        source: &[u8],
        overlay: &OverlayDocument,
        appearance: &Appearance,
    ) -> Result<Vec<u8>> {
        let call = self.compositor.composite(source, overlay, appearance);

        match self.job_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::CompositorTimeout(limit.as_secs()))?,
            None => call.await,
        }
    }
}
