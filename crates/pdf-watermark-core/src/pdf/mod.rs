mod document;
mod page_index;
pub mod overlay;

pub use document::{PageSize, PdfDocument};
pub(crate) use document::{inherited_attribute, media_box, resolve_dictionary};
#[cfg(test)]
pub(crate) use document::test_pdf;
pub use page_index::PageIndex;
pub use overlay::{OverlayDocument, OverlayGenerator};
