//! In-process compositing with lopdf.
//!
//! The overlay page becomes a Form XObject inside the source document and is
//! drawn first on every page, so the watermark sits behind existing content.
//! The form keeps the overlay's size and is anchored at each page's MediaBox
//! origin.

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info};

use super::traits::{Compositor, CompositorInfo};
use crate::error::{Error, Result};
use crate::pdf::{OverlayDocument, inherited_attribute, media_box, resolve_dictionary};
use crate::request::Appearance;

/// Preferred XObject resource name for the stamped form.
const FORM_RESOURCE: &str = "WmBg";

/// Stamps overlays without any network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCompositor;

impl LocalCompositor {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Compositor for LocalCompositor {
    fn info(&self) -> CompositorInfo {
        CompositorInfo {
            name: "Local",
            remote: false,
            requires_credentials: false,
        }
    }

    async fn composite(
        &self,
        source: &[u8],
        overlay: &OverlayDocument,
        _appearance: &Appearance,
    ) -> Result<Vec<u8>> {
        let source = source.to_vec();
        let overlay = overlay.clone();

        let output = tokio::task::spawn_blocking(move || stamp_background(&source, &overlay))
            .await
            .map_err(|e| Error::PdfOverlay(format!("Compositing task failed: {e}")))??;

        info!("Local watermark complete ({} bytes)", output.len());
        Ok(output)
    }
}

/// Draw the overlay's single page underneath every page of `source`.
pub fn stamp_background(source: &[u8], overlay: &OverlayDocument) -> Result<Vec<u8>> {
    let mut doc = Document::load_mem(source)
        .map_err(|e| Error::PdfOpen(format!("Failed to parse PDF: {e}")))?;
    let mut stamp = Document::load_mem(&overlay.bytes)
        .map_err(|e| Error::PdfOverlay(format!("Failed to parse overlay: {e}")))?;

    let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    if page_ids.is_empty() {
        return Err(Error::PdfNoPages);
    }

    stamp.renumber_objects_with(doc.max_id + 1);
    let form_id = import_overlay_form(&mut doc, stamp, overlay)?;

    for page_id in &page_ids {
        stamp_page(&mut doc, *page_id, form_id)?;
    }

    debug!("Stamped {} pages", page_ids.len());

    doc.compress();

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| Error::PdfSave(format!("Failed to save watermarked PDF: {e}")))?;

    Ok(output)
}

/// Move the overlay's objects into `doc` and wrap its page in a Form XObject.
///
/// `stamp` must already be renumbered past `doc.max_id`.
fn import_overlay_form(
    doc: &mut Document,
    stamp: Document,
    overlay: &OverlayDocument,
) -> Result<ObjectId> {
    let stamp_page_id = *stamp
        .get_pages()
        .get(&1)
        .ok_or_else(|| Error::PdfOverlay("Overlay has no page".to_string()))?;

    let content = stamp
        .get_page_content(stamp_page_id)
        .map_err(|e| Error::PdfOverlay(format!("Failed to read overlay content: {e}")))?;
    let resources = inherited_attribute(&stamp, stamp_page_id, b"Resources")
        .and_then(|o| resolve_dictionary(&stamp, &o))
        .unwrap_or_default();
    let content_ids = stamp.get_page_contents(stamp_page_id);

    doc.max_id = doc.max_id.max(stamp.max_id);

    for (object_id, object) in stamp.objects {
        if content_ids.contains(&object_id) {
            continue;
        }
        match object.type_name().unwrap_or(b"") {
            b"Catalog" | b"Pages" | b"Page" => {}
            _ => {
                doc.objects.insert(object_id, object);
            }
        }
    }

    let form = Dictionary::from_iter([
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Form".to_vec())),
        (
            "BBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(overlay.width),
                Object::Real(overlay.height),
            ]),
        ),
        ("Resources", Object::Dictionary(resources)),
    ]);

    Ok(doc.add_object(Stream::new(form, content)))
}

/// Register the form on one page and prepend a content stream drawing it.
fn stamp_page(doc: &mut Document, page_id: ObjectId, form_id: ObjectId) -> Result<()> {
    let [x0, y0, _, _] = media_box(doc, page_id)?;

    let mut resources = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|o| resolve_dictionary(doc, &o))
        .unwrap_or_default();
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve_dictionary(doc, o))
        .unwrap_or_default();

    let name = free_resource_name(&xobjects, FORM_RESOURCE);
    xobjects.set(name.as_bytes().to_vec(), Object::Reference(form_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let prefix = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(1),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(1),
                    Object::Real(x0),
                    Object::Real(y0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ],
    }
    .encode()
    .map_err(|e| Error::PdfOverlay(format!("Failed to encode stamp content: {e}")))?;
    let prefix_id = doc.add_object(Stream::new(Dictionary::new(), prefix));

    let existing = doc
        .get_dictionary(page_id)
        .map_err(|e| Error::Lopdf(e.to_string()))?
        .get(b"Contents")
        .ok()
        .cloned();

    let contents = match existing {
        Some(Object::Reference(id)) => match doc.get_object(id) {
            // Contents may point at an indirect array of streams
            Ok(Object::Array(streams)) => {
                let mut streams = streams.clone();
                streams.insert(0, Object::Reference(prefix_id));
                Object::Array(streams)
            }
            _ => Object::Array(vec![Object::Reference(prefix_id), Object::Reference(id)]),
        },
        Some(Object::Array(mut streams)) => {
            streams.insert(0, Object::Reference(prefix_id));
            Object::Array(streams)
        }
        _ => Object::Reference(prefix_id),
    };

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| Error::Lopdf(e.to_string()))?;
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", contents);

    Ok(())
}

/// Pick a resource name not already used in `dict`.
fn free_resource_name(dict: &Dictionary, preferred: &str) -> String {
    if !dict.has(preferred.as_bytes()) {
        return preferred.to_string();
    }

    (1u32..)
        .map(|n| format!("{preferred}{n}"))
        .find(|candidate| !dict.has(candidate.as_bytes()))
        .unwrap_or_else(|| preferred.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pdf::{OverlayGenerator, PdfDocument, test_pdf};

    fn overlay_for(source: &[u8], phrase: &str) -> OverlayDocument {
        OverlayGenerator::new()
            .generate_from_bytes(source, phrase, &Appearance::default())
            .unwrap()
    }

    #[test]
    fn test_every_page_is_stamped() {
        let source = test_pdf(&[(612.0, 792.0), (612.0, 792.0), (612.0, 792.0)]);
        let overlay = overlay_for(&source, "Confidential");

        let output = stamp_background(&source, &overlay).unwrap();
        let doc = Document::load_mem(&output).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 3);

        for page_id in pages.values() {
            let content = Content::decode(&doc.get_page_content(*page_id).unwrap()).unwrap();
            let ops: Vec<&str> = content.operations.iter().map(|op| op.operator.as_str()).collect();

            // Watermark first, original text afterwards
            let do_pos = ops.iter().position(|op| *op == "Do").unwrap();
            let tj_pos = ops.iter().position(|op| *op == "Tj").unwrap();
            assert!(do_pos < tj_pos);

            let resources = inherited_attribute(&doc, *page_id, b"Resources")
                .and_then(|o| resolve_dictionary(&doc, &o))
                .unwrap();
            let xobjects = resolve_dictionary(&doc, resources.get(b"XObject").unwrap()).unwrap();
            assert!(xobjects.has(FORM_RESOURCE.as_bytes()));
            // Original font resources survive
            assert!(resources.has(b"Font"));
        }
    }

    #[test]
    fn test_output_keeps_page_sizes() {
        let source = test_pdf(&[(300.0, 400.0), (842.0, 595.0)]);
        let overlay = overlay_for(&source, "Draft");

        let output = stamp_background(&source, &overlay).unwrap();
        let doc = PdfDocument::from_bytes(output).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page_size(0).unwrap().width, 300.0);
        assert_eq!(doc.page_size(1).unwrap().width, 842.0);
    }

    #[test]
    fn test_free_resource_name() {
        let mut dict = Dictionary::new();
        assert_eq!(free_resource_name(&dict, "WmBg"), "WmBg");
        dict.set("WmBg", Object::Null);
        dict.set("WmBg1", Object::Null);
        assert_eq!(free_resource_name(&dict, "WmBg"), "WmBg2");
    }

    #[test]
    fn test_corrupt_source() {
        let source = test_pdf(&[(200.0, 200.0)]);
        let overlay = overlay_for(&source, "x");
        assert!(matches!(
            stamp_background(b"not a pdf", &overlay),
            Err(Error::PdfOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_composite_trait() {
        let source = test_pdf(&[(200.0, 200.0)]);
        let overlay = overlay_for(&source, "x");
        let compositor = LocalCompositor::new();

        assert_eq!(compositor.name(), "Local");
        assert!(!compositor.info().remote);

        let output = compositor
            .composite(&source, &overlay, &Appearance::default())
            .await
            .unwrap();
        assert_eq!(PdfDocument::from_bytes(output).unwrap().page_count(), 1);
    }
}
