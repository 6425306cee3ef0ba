use thiserror::Error;

use crate::types::{BoundingBox, TextFragment};

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
}

/// Abstraction over a text recognizer.
/// Implementations accept raw image bytes and return positioned fragments in
/// any order; an empty list means nothing was recognized.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<Vec<TextFragment>, OcrError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set fragment list, ignoring the image.
pub struct MockRecognizer {
    pub fragments: Vec<TextFragment>,
}

impl MockRecognizer {
    pub fn new(fragments: Vec<TextFragment>) -> Self {
        Self { fragments }
    }

    /// Lay out each line as a single full-width fragment, top to bottom, and
    /// hand them out in reverse so callers cannot rely on emission order.
    pub fn from_lines(lines: &[&str]) -> Self {
        const PITCH: f64 = 0.03;
        let mut fragments: Vec<TextFragment> = lines
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let y = 0.97 - PITCH * i as f64;
                TextFragment::new(*text, BoundingBox::new(0.05, y, 0.9, 0.01))
            })
            .collect();
        fragments.reverse();
        Self { fragments }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<Vec<TextFragment>, OcrError> {
        Ok(self.fragments.clone())
    }
}

// ── JSON backend ─────────────────────────────────────────────────────────────

/// Reads the payload as a JSON array of fragments, as dumped by an external
/// recognizer service.
#[derive(Debug, Default)]
pub struct JsonRecognizer;

impl OcrBackend for JsonRecognizer {
    fn recognize(&self, image_bytes: &[u8]) -> Result<Vec<TextFragment>, OcrError> {
        serde_json::from_slice(image_bytes).map_err(|e| OcrError::ImageDecode(e.to_string()))
    }
}
