use thiserror::Error;

/// Unified error type for pdf-watermark-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - PDF operations (parsing the source, building overlays, merging)
/// - Request validation (missing phrases, non-PDF input)
/// - Compositor operations (authentication, quota, job submission, transfers)
/// - Packaging (ZIP assembly)
/// - Configuration and general I/O
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // PDF Errors
    // ==========================================================================
    /// Failed to open or parse a PDF file
    #[error("failed to open PDF: {0}")]
    PdfOpen(String),

    /// The document parsed but contains no pages
    #[error("PDF has no pages")]
    PdfNoPages,

    /// Invalid page number requested
    #[error("invalid page number {page} (document has {total} pages)")]
    PdfInvalidPage { page: usize, total: usize },

    /// Failed to build the watermark overlay
    #[error("failed to create watermark overlay: {0}")]
    PdfOverlay(String),

    /// Failed to save a PDF
    #[error("failed to save PDF: {0}")]
    PdfSave(String),

    /// Error from the lopdf library
    #[error("lopdf error: {0}")]
    Lopdf(String),

    // ==========================================================================
    // Request Errors
    // ==========================================================================
    /// No non-blank watermark phrase was supplied
    #[error("at least one non-empty watermark phrase is required")]
    NoPhrases,

    /// Uploaded bytes are not a PDF document
    #[error("only PDF files are allowed")]
    NotPdf,

    // ==========================================================================
    // Compositor Errors
    // ==========================================================================
    /// Compositor credentials are not configured
    #[error("compositor credentials not configured")]
    CompositorMissingCredentials,

    /// The compositing service rejected our credentials
    #[error("compositor authentication failed: {0}")]
    CompositorAuth(String),

    /// Usage quota exhausted or rate limited by the compositing service
    #[error("compositor quota exceeded{}", retry_after.map(|s| format!(", retry after {s} seconds")).unwrap_or_default())]
    CompositorQuota { retry_after: Option<u64> },

    /// The compositing service refused the job as malformed
    #[error("compositor rejected the watermark job: {0}")]
    CompositorInvalidJob(String),

    /// The job was accepted but finished in a failed state
    #[error("compositor job failed: {0}")]
    CompositorJobFailed(String),

    /// Upload, poll, or download failed
    #[error("compositor transfer failed: {0}")]
    CompositorTransfer(String),

    /// The compositor did not resolve in time
    #[error("compositor did not respond within {0} seconds")]
    CompositorTimeout(u64),

    // ==========================================================================
    // Packaging Errors
    // ==========================================================================
    /// Nothing was produced, so there is nothing to send back
    #[error("no watermarked documents were produced")]
    NothingToPackage,

    /// Failed to write the output archive
    #[error("failed to build archive: {0}")]
    Archive(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than by us
    /// or the compositing service.
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::NoPhrases | Self::NotPdf)
    }

    /// Whether the error originated at the remote compositing boundary.
    pub const fn is_compositor(&self) -> bool {
        matches!(
            self,
            Self::CompositorMissingCredentials
                | Self::CompositorAuth(_)
                | Self::CompositorQuota { .. }
                | Self::CompositorInvalidJob(_)
                | Self::CompositorJobFailed(_)
                | Self::CompositorTransfer(_)
                | Self::CompositorTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
