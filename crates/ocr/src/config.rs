use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::{TotalExtractor, VocabularyError};
use crate::layout::DEFAULT_LINE_TOLERANCE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid vocabulary: {0}")]
    Vocabulary(#[from] VocabularyError),
    #[error("Line tolerance must be a positive number, got {0}")]
    Tolerance(f64),
}

/// Receipt vocabulary. Terms are trimmed and matched case-insensitively;
/// blank entries are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Vocabulary {
    /// Words that mark a line as stating the total (matched as whole words).
    pub total_keywords: Vec<String>,
    /// Words that open a tax-breakdown row when combined with a context marker.
    pub breakdown_keywords: Vec<String>,
    /// Markers of a tax-breakdown row (substring match).
    pub tax_context_markers: Vec<String>,
    /// Terms that mark a tip line (substring match).
    pub gratuity_terms: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        let owned = |terms: &[&str]| terms.iter().map(|t| t.to_string()).collect();
        Self {
            total_keywords: owned(&[
                "summe",
                "zu zahlen",
                "total",
                "zws-summe",
                "endsumme",
                "gesamt",
                "betrag",
                "zwischensumme",
                "gesamtsumme",
            ]),
            breakdown_keywords: owned(&["gesamtsumme"]),
            tax_context_markers: owned(&["ust", "%", "netto", "brutto"]),
            gratuity_terms: owned(&["trinkgeld", "tip"]),
        }
    }
}

/// Tunables for a scan: row tolerance and the keyword vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    pub line_tolerance: f64,
    pub vocabulary: Vocabulary,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            line_tolerance: DEFAULT_LINE_TOLERANCE,
            vocabulary: Vocabulary::default(),
        }
    }
}

impl ScanConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ScanConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Checks the tolerance and that the vocabulary compiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.line_tolerance.is_finite() && self.line_tolerance > 0.0) {
            return Err(ConfigError::Tolerance(self.line_tolerance));
        }
        TotalExtractor::new(&self.vocabulary)?;
        Ok(())
    }
}
