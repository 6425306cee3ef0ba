//! Reading-order reconstruction for positioned text fragments.
//!
//! Fragments are ordered top to bottom by vertical center. Neighbours whose
//! centers lie within `tolerance` of each other are then settled left to
//! right, so the leftmost of a near-tie opens its row. Grouping is greedy: a
//! fragment joins the open row while its center lies within `tolerance` of
//! the row's first fragment. Each row is finally ordered left to right.

use std::cmp::Ordering;

use crate::types::{Line, TextFragment};

/// Default row tolerance, in normalized box units.
pub const DEFAULT_LINE_TOLERANCE: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineReconstructor {
    tolerance: f64,
}

impl Default for LineReconstructor {
    fn default() -> Self {
        Self { tolerance: DEFAULT_LINE_TOLERANCE }
    }
}

impl LineReconstructor {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Group fragments into lines in reading order.
    ///
    /// Only top-ranked candidates are placed; alternates for the same box are
    /// ignored. The result depends only on the fragment set, never on the
    /// order the recognizer emitted it in.
    pub fn reconstruct(&self, fragments: &[TextFragment]) -> Vec<Line> {
        let mut sorted: Vec<&TextFragment> =
            fragments.iter().filter(|f| f.is_top_candidate()).collect();
        sorted.sort_by(|a, b| reading_order(a, b));
        settle_near_ties(&mut sorted, self.tolerance);

        let mut rows: Vec<Vec<&TextFragment>> = Vec::new();
        for frag in sorted {
            let center = frag.bounds.mid_y();
            match rows.last_mut() {
                Some(row) if (center - row[0].bounds.mid_y()).abs() < self.tolerance => {
                    row.push(frag)
                }
                _ => rows.push(vec![frag]),
            }
        }

        let lines: Vec<Line> = rows
            .into_iter()
            .map(|mut row| {
                row.sort_by(|a, b| left_to_right(a, b));
                Line::new(row.into_iter().cloned().collect())
            })
            .collect();

        tracing::debug!(
            fragments = fragments.len(),
            lines = lines.len(),
            "reconstructed receipt lines"
        );
        lines
    }

    /// Reconstructed lines joined with `\n`.
    pub fn reconstruct_text(&self, fragments: &[TextFragment]) -> String {
        self.reconstruct(fragments)
            .iter()
            .map(Line::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Descending vertical center, then ascending `x`, then text.
fn reading_order(a: &TextFragment, b: &TextFragment) -> Ordering {
    b.bounds
        .mid_y()
        .total_cmp(&a.bounds.mid_y())
        .then_with(|| left_to_right(a, b))
}

/// Stable insertion pass over an already sorted slice: a fragment moves ahead
/// of its predecessor while their centers differ by less than `tolerance` and
/// it sits further left.
fn settle_near_ties(sorted: &mut [&TextFragment], tolerance: f64) {
    for i in 1..sorted.len() {
        let mut j = i;
        while j > 0 {
            let (prev, cur) = (&sorted[j - 1].bounds, &sorted[j].bounds);
            let near = (cur.mid_y() - prev.mid_y()).abs() < tolerance;
            if !near || cur.x.total_cmp(&prev.x) != Ordering::Less {
                break;
            }
            sorted.swap(j, j - 1);
            j -= 1;
        }
    }
}

fn left_to_right(a: &TextFragment, b: &TextFragment) -> Ordering {
    a.bounds
        .x
        .total_cmp(&b.bounds.x)
        .then_with(|| a.text.cmp(&b.text))
}
