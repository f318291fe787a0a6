mod traits;
mod local;
mod remote;

pub use traits::{Compositor, CompositorInfo};
pub use local::{LocalCompositor, stamp_background};
pub use remote::RemoteCompositor;

use crate::config::{CompositorBackend, CompositorConfig};
use crate::error::Result;
use std::sync::Arc;

/// Create a compositor from configuration
pub fn create_compositor(config: &CompositorConfig) -> Result<Arc<dyn Compositor>> {
    match config.backend {
        CompositorBackend::Remote => Ok(Arc::new(RemoteCompositor::new(config)?)),
        CompositorBackend::Local => Ok(Arc::new(LocalCompositor::new())),
    }
}
