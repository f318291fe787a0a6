//! Single-page watermark overlay generation.
//!
//! # Coordinate System
//!
//! PDF uses a **bottom-left origin**: (0, 0) is the bottom-left corner of the
//! page, X grows to the right and Y grows upward. Appearance positions are
//! percentages of the page size in that same system, so `pos_y = 0` is the
//! bottom edge.
//!
//! # Overlay Layout
//!
//! The overlay page has the exact MediaBox size of the source's reference page
//! and a single text run:
//! ```text
//! q /GSwm gs 0.5 0.5 0.5 rg
//! BT /FWm <size> Tf cos sin -sin cos x y Tm (PHRASE) Tj ET Q
//! ```

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat};

use super::document::{PageSize, PdfDocument};
use crate::error::{Error, Result};
use crate::request::Appearance;

// =============================================================================
// Layout Constants
// =============================================================================

/// Base-14 serif font; every conforming reader ships it, so nothing is embedded.
const WATERMARK_FONT: &[u8] = b"Times-Roman";

/// Resource name of the font inside the overlay page.
const FONT_RESOURCE: &str = "FWm";

/// Resource name of the transparency graphics state.
const GS_RESOURCE: &str = "GSwm";

/// Fill colour of the watermark text (mid grey).
const TEXT_GRAY: f32 = 0.5;

/// Substitute for characters WinAnsiEncoding cannot represent.
const REPLACEMENT_BYTE: u8 = b'?';

// =============================================================================
// Public Types
// =============================================================================

/// A rendered single-page overlay carrying one phrase.
#[derive(Debug, Clone)]
pub struct OverlayDocument {
    /// The phrase as supplied (before uppercasing)
    pub phrase: String,
    pub width: f32,
    pub height: f32,
    /// Serialized PDF
    pub bytes: Vec<u8>,
}

impl OverlayDocument {
    pub const fn page_size(&self) -> PageSize {
        PageSize::new(self.width, self.height)
    }
}

/// Builds overlay PDFs with lopdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayGenerator;

impl OverlayGenerator {
    pub const fn new() -> Self {
        Self
    }

    /// Parse the source and build an overlay for one phrase.
    pub fn generate_from_bytes(
        &self,
        source: &[u8],
        phrase: &str,
        appearance: &Appearance,
    ) -> Result<OverlayDocument> {
        let doc = PdfDocument::from_bytes(source.to_vec())?;
        self.generate(&doc, phrase, appearance)
    }

    /// Build an overlay for one phrase, sized to the document's reference page.
    pub fn generate(
        &self,
        doc: &PdfDocument,
        phrase: &str,
        appearance: &Appearance,
    ) -> Result<OverlayDocument> {
        let size = doc.reference_page_size()?;
        let bytes = build_overlay_pdf(size, phrase, appearance)?;

        Ok(OverlayDocument {
            phrase: phrase.to_string(),
            width: size.width,
            height: size.height,
            bytes,
        })
    }
}

// =============================================================================
// PDF Construction
// =============================================================================

fn build_overlay_pdf(size: PageSize, phrase: &str, appearance: &Appearance) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(WATERMARK_FONT.to_vec())),
        ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
    ]));

    let gs_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"ExtGState".to_vec())),
        ("ca", Object::Real(appearance.opacity)),
        ("CA", Object::Real(appearance.opacity)),
    ]));

    let resources = Dictionary::from_iter([
        (
            "Font",
            Object::Dictionary(Dictionary::from_iter([(FONT_RESOURCE, Object::Reference(font_id))])),
        ),
        (
            "ExtGState",
            Object::Dictionary(Dictionary::from_iter([(GS_RESOURCE, Object::Reference(gs_id))])),
        ),
    ]);

    let content = overlay_content(size, phrase, appearance)
        .encode()
        .map_err(|e| Error::PdfOverlay(format!("Failed to encode content stream: {e}")))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

    let page_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(size.width),
                Object::Real(size.height),
            ]),
        ),
        ("Resources", Object::Dictionary(resources)),
        ("Contents", Object::Reference(content_id)),
    ]));

    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(vec![Object::Reference(page_id)])),
            ("Count", Object::Integer(1)),
        ])),
    );

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| Error::PdfSave(format!("Failed to save overlay: {e}")))?;

    Ok(output)
}

/// Content stream drawing the rotated, uppercased phrase.
fn overlay_content(size: PageSize, phrase: &str, appearance: &Appearance) -> Content {
    let x = appearance.pos_x / 100.0 * size.width;
    let y = appearance.pos_y / 100.0 * size.height;
    let (sin, cos) = appearance.angle.to_radians().sin_cos();

    Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(GS_RESOURCE.as_bytes().to_vec())]),
            Operation::new(
                "rg",
                vec![
                    Object::Real(TEXT_GRAY),
                    Object::Real(TEXT_GRAY),
                    Object::Real(TEXT_GRAY),
                ],
            ),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
                    Object::Real(appearance.font_size),
                ],
            ),
            Operation::new(
                "Tm",
                vec![
                    Object::Real(cos),
                    Object::Real(sin),
                    Object::Real(-sin),
                    Object::Real(cos),
                    Object::Real(x),
                    Object::Real(y),
                ],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(&phrase.to_uppercase()), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    }
}

/// Encode text for a WinAnsiEncoding base-14 font.
///
/// Latin-1 code points map to themselves (WinAnsi agrees with Latin-1 outside
/// 0x80..0x9F); everything else becomes `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            #[allow(clippy::cast_possible_truncation)]
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            _ => REPLACEMENT_BYTE,
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pdf::document::test_pdf;

    fn overlay_text(overlay: &OverlayDocument) -> (Document, Content) {
        let doc = Document::load_mem(&overlay.bytes).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        (doc, content)
    }

    #[test]
    fn test_overlay_matches_reference_page_size() {
        let source = test_pdf(&[(612.0, 792.0), (612.0, 792.0), (842.0, 595.0)]);
        let overlay = OverlayGenerator::new()
            .generate_from_bytes(&source, "Draft", &Appearance::default())
            .unwrap();

        assert_eq!(overlay.page_size(), PageSize::new(842.0, 595.0));

        let parsed = PdfDocument::from_bytes(overlay.bytes).unwrap();
        assert_eq!(parsed.page_count(), 1);
        assert_eq!(parsed.page_size(0).unwrap(), PageSize::new(842.0, 595.0));
    }

    #[test]
    fn test_short_document_uses_last_page() {
        let source = test_pdf(&[(300.0, 300.0), (400.0, 500.0)]);
        let overlay = OverlayGenerator::new()
            .generate_from_bytes(&source, "Draft", &Appearance::default())
            .unwrap();
        assert_eq!(overlay.page_size(), PageSize::new(400.0, 500.0));
    }

    #[test]
    fn test_phrase_is_uppercased_and_positioned() {
        let source = test_pdf(&[(200.0, 400.0)]);
        let appearance = Appearance {
            font_size: 18.0,
            angle: 0.0,
            opacity: 0.25,
            pos_x: 25.0,
            pos_y: 75.0,
        };
        let overlay = OverlayGenerator::new()
            .generate_from_bytes(&source, "for alice", &appearance)
            .unwrap();

        let (_, content) = overlay_text(&overlay);

        let tj = content.operations.iter().find(|op| op.operator == "Tj").unwrap();
        assert_eq!(tj.operands[0].as_str().unwrap(), b"FOR ALICE");

        let tm = content.operations.iter().find(|op| op.operator == "Tm").unwrap();
        let values: Vec<f32> = tm.operands.iter().map(|o| o.as_float().unwrap()).collect();
        assert_eq!(values, vec![1.0, 0.0, 0.0, 1.0, 50.0, 300.0]);

        let tf = content.operations.iter().find(|op| op.operator == "Tf").unwrap();
        assert_eq!(tf.operands[1].as_float().unwrap(), 18.0);
    }

    #[test]
    fn test_opacity_in_graphics_state() {
        let source = test_pdf(&[(200.0, 200.0)]);
        let appearance = Appearance {
            opacity: 0.3,
            ..Appearance::default()
        };
        let overlay = OverlayGenerator::new()
            .generate_from_bytes(&source, "x", &appearance)
            .unwrap();

        let doc = Document::load_mem(&overlay.bytes).unwrap();
        let gs = doc
            .objects
            .values()
            .filter_map(|o| o.as_dict().ok())
            .find(|d| d.get(b"Type").and_then(Object::as_name).ok() == Some(b"ExtGState".as_slice()))
            .unwrap();
        assert!((gs.get(b"ca").unwrap().as_float().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_matrix() {
        let size = PageSize::new(100.0, 100.0);
        let appearance = Appearance {
            angle: 90.0,
            ..Appearance::default()
        };
        let content = overlay_content(size, "x", &appearance);
        let tm = content.operations.iter().find(|op| op.operator == "Tm").unwrap();
        let values: Vec<f32> = tm.operands.iter().map(|o| o.as_float().unwrap()).collect();
        assert!(values[0].abs() < 1e-6);
        assert!((values[1] - 1.0).abs() < 1e-6);
        assert!((values[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("ÉTÉ (1)"), b"\xC9T\xC9 (1)".to_vec());
        assert_eq!(encode_win_ansi("日本"), b"??".to_vec());
    }

    #[test]
    fn test_corrupt_source_is_an_error() {
        let result = OverlayGenerator::new().generate_from_bytes(b"%PDF-1.4 garbage", "x", &Appearance::default());
        assert!(result.is_err());
    }
}
