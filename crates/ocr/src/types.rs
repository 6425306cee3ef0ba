use serde::{Deserialize, Serialize};
use tally_core::Money;

/// A normalized rectangle in image space.
///
/// All coordinates are fractions of the image size (0.0–1.0). The origin is
/// the bottom-left corner and `y` grows upward, so larger `y` means closer to
/// the top of the receipt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Vertical center of the box.
    pub fn mid_y(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

/// One recognized text span as emitted by the recognizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextFragment {
    pub text: String,
    #[serde(rename = "box")]
    pub bounds: BoundingBox,
    /// Position among the recognizer's candidates for this box (0 = best).
    #[serde(default)]
    pub candidate_rank: u32,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, bounds: BoundingBox) -> Self {
        Self { text: text.into(), bounds, candidate_rank: 0 }
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        self.candidate_rank = rank;
        self
    }

    pub fn is_top_candidate(&self) -> bool {
        self.candidate_rank == 0
    }
}

/// A reconstructed row of fragments, ordered left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    fragments: Vec<TextFragment>,
}

impl Line {
    pub(crate) fn new(fragments: Vec<TextFragment>) -> Self {
        Self { fragments }
    }

    pub fn fragments(&self) -> &[TextFragment] {
        &self.fragments
    }

    /// Fragment texts joined by a single space.
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Terminal output of one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReceiptScanResult {
    /// Gross total, or `None` when nothing usable was found.
    pub amount: Option<Money>,
    /// Reconstructed line texts, top to bottom.
    pub lines: Vec<String>,
}

impl ReceiptScanResult {
    pub fn not_found() -> Self {
        Self::default()
    }

    /// The caller should fall back to manual entry.
    pub fn needs_manual_entry(&self) -> bool {
        self.amount.is_none()
    }
}
