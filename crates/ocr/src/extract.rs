use regex::Regex;
use tally_core::Money;
use thiserror::Error;

use crate::amount::AmountParser;
use crate::config::Vocabulary;

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("Vocabulary has no total keywords")]
    NoTotalKeywords,
    #[error("Failed to compile keyword pattern: {0}")]
    Regex(#[from] regex::Error),
}

/// Why no gross total was found. Diagnostic only: callers see `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no total keyword on any line")]
    NoKeywordMatch,
    #[error("keyword on line {line} but no amount on or below it")]
    NoAmountAfterKeyword { line: usize },
    #[error("token '{token}' on line {line} is not a two-decimal amount")]
    UnparsableToken { line: usize, token: String },
}

// ── Public extraction API ─────────────────────────────────────────────────────

/// Finds the gross total payable on a receipt from its reconstructed lines.
///
/// One forward pass, stopping at the first decision:
///
/// 1. Tax-breakdown rows (a breakdown keyword plus a tax marker such as `%`)
///    are skipped.
/// 2. Tip adjustment: an amount `Y`, a tip line below it, and an amount `Z`
///    on the line after that with `Z > Y` yields `Z`.
/// 3. The first keyword line yields its last amount, or failing that the
///    first amount on any following line. It is the only attempt: a keyword
///    line without an amount ends the scan.
#[derive(Debug, Clone)]
pub struct TotalExtractor {
    keyword_re: Regex,
    breakdown_keywords: Vec<String>,
    tax_context_markers: Vec<String>,
    gratuity_terms: Vec<String>,
}

impl Default for TotalExtractor {
    fn default() -> Self {
        Self::new(&Vocabulary::default()).expect("built-in vocabulary compiles")
    }
}

impl TotalExtractor {
    pub fn new(vocabulary: &Vocabulary) -> Result<Self, VocabularyError> {
        let keywords = normalize_terms(&vocabulary.total_keywords);
        if keywords.is_empty() {
            return Err(VocabularyError::NoTotalKeywords);
        }
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let keyword_re = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))?;

        Ok(Self {
            keyword_re,
            breakdown_keywords: normalize_terms(&vocabulary.breakdown_keywords),
            tax_context_markers: normalize_terms(&vocabulary.tax_context_markers),
            gratuity_terms: normalize_terms(&vocabulary.gratuity_terms),
        })
    }

    /// The gross total, or `None` when the heuristics find nothing.
    pub fn extract<S: AsRef<str>>(&self, lines: &[S]) -> Option<Money> {
        match self.try_extract(lines) {
            Ok(total) => {
                tracing::debug!(%total, "gross total extracted");
                Some(total)
            }
            Err(e) => {
                tracing::debug!("no gross total: {e}");
                None
            }
        }
    }

    /// Convenience for newline-separated text.
    pub fn extract_from_text(&self, text: &str) -> Option<Money> {
        self.extract(&text.lines().collect::<Vec<_>>())
    }

    /// Like [`extract`](Self::extract) but reports why nothing was found.
    ///
    /// Lines are trimmed and lowercased and blank lines dropped before the
    /// scan; line numbers in errors index that cleaned sequence.
    pub fn try_extract<S: AsRef<str>>(&self, lines: &[S]) -> Result<Money, ExtractError> {
        let lines: Vec<String> = lines
            .iter()
            .map(|l| l.as_ref().trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();

        for (i, line) in lines.iter().enumerate() {
            if self.is_breakdown_row(line) {
                tracing::trace!(line = i, "skipping tax breakdown row");
                continue;
            }
            if let Some(total) = self.tip_adjusted_total(&lines, i)? {
                return Ok(total);
            }
            if self.keyword_re.is_match(line) {
                return amount_for_keyword(&lines, i);
            }
        }
        Err(ExtractError::NoKeywordMatch)
    }

    // ── Exclusion ─────────────────────────────────────────────────────────────

    fn is_breakdown_row(&self, line: &str) -> bool {
        contains_any(line, &self.breakdown_keywords) && contains_any(line, &self.tax_context_markers)
    }

    // ── Tip adjustment ────────────────────────────────────────────────────────

    /// Subtotal on line `i`, tip on `i + 1`, adjusted total on `i + 2`.
    fn tip_adjusted_total(&self, lines: &[String], i: usize) -> Result<Option<Money>, ExtractError> {
        let Some(token) = AmountParser::first_token(&lines[i]) else {
            return Ok(None);
        };
        let base = AmountParser::normalize(token).ok_or_else(|| unparsable(i, token))?;

        let (Some(tip_line), Some(total_line)) = (lines.get(i + 1), lines.get(i + 2)) else {
            return Ok(None);
        };
        if !contains_any(tip_line, &self.gratuity_terms) {
            return Ok(None);
        }

        let tip = match AmountParser::first_token(tip_line) {
            Some(t) => AmountParser::normalize(t),
            None => AmountParser::split_cents(tip_line),
        };
        let Some(tip) = tip else {
            return Ok(None);
        };
        let Some(total) = AmountParser::parse_first(total_line) else {
            return Ok(None);
        };
        if total <= base {
            return Ok(None);
        }

        if base + tip != total {
            tracing::debug!(%base, %tip, %total, "tip-adjusted total does not add up");
        }
        tracing::debug!(line = i + 2, %total, "using tip-adjusted total");
        Ok(Some(total))
    }
}

// ── Keyword lines ─────────────────────────────────────────────────────────────

fn amount_for_keyword(lines: &[String], i: usize) -> Result<Money, ExtractError> {
    // Last token: a VAT rate or partial amount tends to precede the total.
    if let Some(token) = AmountParser::last_token(&lines[i]) {
        return AmountParser::normalize(token).ok_or_else(|| unparsable(i, token));
    }

    for (j, next) in lines.iter().enumerate().skip(i + 1) {
        if let Some(token) = AmountParser::first_token(next) {
            return AmountParser::normalize(token).ok_or_else(|| unparsable(j, token));
        }
    }

    Err(ExtractError::NoAmountAfterKeyword { line: i })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn unparsable(line: usize, token: &str) -> ExtractError {
    ExtractError::UnparsableToken { line, token: token.to_string() }
}

fn contains_any(line: &str, terms: &[String]) -> bool {
    terms.iter().any(|t| line.contains(t.as_str()))
}

fn normalize_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
