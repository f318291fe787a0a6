//! Watermark request model and input normalisation.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_FONT_SIZE: f32 = 30.0;
pub const DEFAULT_ANGLE: f32 = 55.0;
pub const DEFAULT_OPACITY: f32 = 0.5;
pub const DEFAULT_POS_X: f32 = 50.0;
pub const DEFAULT_POS_Y: f32 = 50.0;

/// How far into the file we look for the `%PDF-` marker.
const PDF_HEADER_WINDOW: usize = 1024;

/// Visual settings for the watermark text
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    /// Font size in points
    pub font_size: f32,
    /// Counter-clockwise rotation in degrees
    pub angle: f32,
    /// 0.0 (invisible) to 1.0 (opaque)
    pub opacity: f32,
    /// Horizontal anchor as a percentage of page width
    pub pos_x: f32,
    /// Vertical anchor as a percentage of page height, from the bottom
    pub pos_y: f32,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            angle: DEFAULT_ANGLE,
            opacity: DEFAULT_OPACITY,
            pos_x: DEFAULT_POS_X,
            pos_y: DEFAULT_POS_Y,
        }
    }
}

impl Appearance {
    /// Build from optional values; anything absent or out of range falls back
    /// to its default.
    pub fn from_values(
        font_size: Option<f32>,
        angle: Option<f32>,
        opacity: Option<f32>,
        pos_x: Option<f32>,
        pos_y: Option<f32>,
    ) -> Self {
        Self {
            font_size: valid_or(font_size, DEFAULT_FONT_SIZE, |v| v > 0.0),
            angle: valid_or(angle, DEFAULT_ANGLE, |_| true),
            opacity: valid_or(opacity, DEFAULT_OPACITY, |v| (0.0..=1.0).contains(&v)),
            pos_x: valid_or(pos_x, DEFAULT_POS_X, is_percentage),
            pos_y: valid_or(pos_y, DEFAULT_POS_Y, is_percentage),
        }
    }

    /// Build from raw form fields. Unparseable strings count as invalid.
    pub fn from_fields(
        font_size: Option<&str>,
        angle: Option<&str>,
        opacity: Option<&str>,
        pos_x: Option<&str>,
        pos_y: Option<&str>,
    ) -> Self {
        Self::from_values(
            parse_number(font_size),
            parse_number(angle),
            parse_number(opacity),
            parse_number(pos_x),
            parse_number(pos_y),
        )
    }
}

fn parse_number(raw: Option<&str>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
}

fn valid_or(value: Option<f32>, default: f32, valid: impl Fn(f32) -> bool) -> f32 {
    value
        .filter(|v| v.is_finite() && valid(*v))
        .unwrap_or(default)
}

fn is_percentage(v: f32) -> bool {
    (0.0..=100.0).contains(&v)
}

/// Split a comma-delimited phrase list, trimming entries and dropping blanks.
pub fn parse_phrases(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether the bytes look like a PDF file.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// A validated watermarking job: one source document and the phrases to stamp
/// onto it, in output order.
#[derive(Debug, Clone)]
pub struct WatermarkRequest {
    source: Bytes,
    phrases: Vec<String>,
    appearance: Appearance,
}

impl WatermarkRequest {
    pub fn new(
        source: impl Into<Bytes>,
        phrases: Vec<String>,
        appearance: Appearance,
    ) -> Result<Self> {
        let source = source.into();

        if !looks_like_pdf(&source) {
            return Err(Error::NotPdf);
        }

        if phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(Error::NoPhrases);
        }

        Ok(Self {
            source,
            phrases,
            appearance,
        })
    }

    pub fn source(&self) -> &Bytes {
        &self.source
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub const fn appearance(&self) -> &Appearance {
        &self.appearance
    }

    /// Number of phrases that will actually produce an output.
    pub fn effective_phrase_count(&self) -> usize {
        self.phrases.iter().filter(|p| !p.trim().is_empty()).count()
    }
}
