use std::sync::Arc;

use bytes::Bytes;
use lopdf::{Dictionary, Document, Object, ObjectId};

use super::page_index::PageIndex;
use crate::error::{Error, Result};

/// US Letter, used when a page tree declares no MediaBox at all.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Width and height of a page in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn from_media_box(media_box: [f32; 4]) -> Self {
        Self {
            width: (media_box[2] - media_box[0]).abs(),
            height: (media_box[3] - media_box[1]).abs(),
        }
    }
}

/// A parsed source PDF.
///
/// Parsing happens once; the raw bytes are kept for the compositor.
pub struct PdfDocument {
    bytes: Bytes,
    /// MediaBox size of every page, in page order
    page_sizes: Arc<Vec<PageSize>>,
}

impl PdfDocument {
    /// Open a PDF from bytes
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();

        let doc = Document::load_mem(&bytes)
            .map_err(|e| Error::PdfOpen(format!("Failed to parse PDF: {e}")))?;

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(Error::PdfNoPages);
        }

        let page_sizes = pages
            .values()
            .map(|&page_id| media_box(&doc, page_id).map(PageSize::from_media_box))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            bytes,
            page_sizes: Arc::new(page_sizes),
        })
    }

    /// Get number of pages
    pub fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    /// Size of the page at a 0-based index.
    pub fn page_size(&self, page_num: usize) -> Result<PageSize> {
        let index = PageIndex::try_from_page_num(page_num, self.page_count())?;
        Ok(self.page_sizes[index.as_usize()])
    }

    /// Index of the page overlays are sized from.
    pub fn reference_page_index(&self) -> Result<PageIndex> {
        PageIndex::reference(self.page_count())
    }

    /// Size of the page overlays are sized from.
    pub fn reference_page_size(&self) -> Result<PageSize> {
        let index = self.reference_page_index()?;
        Ok(self.page_sizes[index.as_usize()])
    }

    /// Get raw PDF bytes as a slice.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Clone for PdfDocument {
    /// O(1): both fields are reference counted.
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
            page_sizes: Arc::clone(&self.page_sizes),
        }
    }
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("page_count", &self.page_count())
            .field("bytes_len", &self.bytes.len())
            .finish()
    }
}

// =============================================================================
// Page tree helpers
// =============================================================================

/// Look up a page attribute, walking up the `Parent` chain for inheritable
/// keys such as MediaBox and Resources.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;

    // Page trees are shallow; the bound only guards against reference cycles.
    for _ in 0..64 {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let Ok(Object::Reference(parent_id)) = current.get(b"Parent") else {
            return None;
        };
        current = doc.get_dictionary(*parent_id).ok()?;
    }

    None
}

/// Resolve an object that may be an indirect reference to a dictionary.
pub(crate) fn resolve_dictionary(doc: &Document, object: &Object) -> Option<Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

/// Get the MediaBox of a page as `[x0, y0, x1, y1]`.
pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> Result<[f32; 4]> {
    let Some(object) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return Ok(DEFAULT_MEDIA_BOX);
    };

    let array = match &object {
        Object::Array(arr) => arr.clone(),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => return Ok(DEFAULT_MEDIA_BOX),
        },
        _ => return Ok(DEFAULT_MEDIA_BOX),
    };

    let values: Vec<f32> = array
        .iter()
        .filter_map(|o| match o {
            #[allow(clippy::cast_precision_loss)]
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r),
            _ => None,
        })
        .collect();

    if values.len() == 4 {
        Ok([values[0], values[1], values[2], values[3]])
    } else {
        Err(Error::Lopdf(format!(
            "malformed MediaBox on page object {} {}",
            page_id.0, page_id.1
        )))
    }
}

// =============================================================================
// Test fixtures
// =============================================================================

/// Build a PDF with one page per size, each showing its page number.
#[cfg(test)]
pub(crate) fn test_pdf(sizes: &[(f32, f32)]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{Stream, StringFormat};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let resources_id = doc.add_object(Dictionary::from_iter([(
        "Font",
        Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
    )]));

    let mut kids = Vec::new();
    for (i, (w, h)) in sizes.iter().enumerate() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(24)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(72)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(format!("Page {}", i + 1).into_bytes(), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().unwrap_or_default(),
        ));
        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Reference(resources_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(*w),
                    Object::Real(*h),
                ]),
            ),
        ]));
        kids.push(Object::Reference(page_id));
    }

    #[allow(clippy::cast_possible_wrap)]
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ])),
    );

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut output = Vec::new();
    doc.save_to(&mut output).unwrap_or_default();
    output
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_page_sizes() {
        let bytes = test_pdf(&[(612.0, 792.0), (595.0, 842.0)]);
        let doc = PdfDocument::from_bytes(bytes).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page_size(1).unwrap(), PageSize::new(595.0, 842.0));
        assert!(doc.page_size(2).is_err());
    }

    #[test]
    fn test_reference_page_is_third() {
        let bytes = test_pdf(&[(100.0, 100.0), (200.0, 200.0), (300.0, 400.0), (500.0, 500.0)]);
        let doc = PdfDocument::from_bytes(bytes).unwrap();
        assert_eq!(doc.reference_page_index().unwrap().as_usize(), 2);
        assert_eq!(doc.reference_page_size().unwrap(), PageSize::new(300.0, 400.0));
    }

    #[test]
    fn test_reference_page_falls_back_to_last() {
        let bytes = test_pdf(&[(100.0, 100.0), (200.0, 250.0)]);
        let doc = PdfDocument::from_bytes(bytes).unwrap();
        assert_eq!(doc.reference_page_size().unwrap(), PageSize::new(200.0, 250.0));
    }

    #[test]
    fn test_invalid_pdf_bytes() {
        assert!(matches!(
            PdfDocument::from_bytes(vec![0, 1, 2, 3]),
            Err(Error::PdfOpen(_))
        ));
        assert!(PdfDocument::from_bytes(Vec::new()).is_err());
    }

    #[test]
    fn test_media_box_inherited_from_parent() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
        ]));
        doc.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(vec![Object::Reference(page_id)])),
                ("Count", Object::Integer(1)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(420),
                        Object::Integer(595),
                    ]),
                ),
            ])),
        );

        assert_eq!(media_box(&doc, page_id).unwrap(), [0.0, 0.0, 420.0, 595.0]);
    }
}
