use async_trait::async_trait;

use crate::error::Result;
use crate::pdf::OverlayDocument;
use crate::request::Appearance;

/// Information about a compositor backend
#[derive(Debug, Clone)]
pub struct CompositorInfo {
    /// Human-readable name
    pub name: &'static str,
    /// Whether this backend talks to a remote service
    pub remote: bool,
    /// Whether this backend requires credentials
    pub requires_credentials: bool,
}

/// Merges a source PDF with a watermark overlay.
#[async_trait]
pub trait Compositor: Send + Sync {
    /// Get information about this compositor
    fn info(&self) -> CompositorInfo;

    /// Get the compositor name (convenience method)
    fn name(&self) -> &'static str {
        self.info().name
    }

    /// Stamp `overlay` onto every page of `source` and return the result.
    async fn composite(
        &self,
        source: &[u8],
        overlay: &OverlayDocument,
        appearance: &Appearance,
    ) -> Result<Vec<u8>>;
}
