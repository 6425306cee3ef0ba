pub mod amount;
pub mod config;
pub mod extract;
pub mod layout;
pub mod pipeline;
pub mod recognizer;
pub mod types;

pub use amount::AmountParser;
pub use config::{ConfigError, ScanConfig, Vocabulary};
pub use extract::{ExtractError, TotalExtractor, VocabularyError};
pub use layout::{LineReconstructor, DEFAULT_LINE_TOLERANCE};
pub use pipeline::{ResultSink, ScanError, ScanOrchestrator, SubmitError};
pub use recognizer::{JsonRecognizer, MockRecognizer, OcrBackend, OcrError};
pub use types::{BoundingBox, Line, ReceiptScanResult, TextFragment};

pub use tally_core::Money;
