use std::sync::{Arc, Weak};

use tally_core::Money;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, ScanConfig};
use crate::extract::{ExtractError, TotalExtractor};
use crate::layout::LineReconstructor;
use crate::recognizer::{OcrBackend, OcrError};
use crate::types::{Line, ReceiptScanResult, TextFragment};

/// Why a scan produced no amount. Logged, never surfaced: every variant
/// reaches the caller as `amount: None`.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Recognizer produced no text")]
    NoTextRecognized,
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("Recognizer task failed: {0}")]
    Task(String),
    #[error("No gross total: {0}")]
    Extract(#[from] ExtractError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("A scan is already in progress")]
    Busy,
}

/// Receives the outcome of a submitted scan.
pub trait ResultSink: Send + Sync {
    fn deliver(&self, result: ReceiptScanResult);
}

impl<F> ResultSink for F
where
    F: Fn(ReceiptScanResult) + Send + Sync,
{
    fn deliver(&self, result: ReceiptScanResult) {
        self(result)
    }
}

/// Orchestrates: recognize → reconstruct lines → extract total, one scan at a
/// time.
///
/// The `processing` flag is observable through [`subscribe`](Self::subscribe).
/// While it is set, new scans are rejected with [`SubmitError::Busy`].
pub struct ScanOrchestrator<R: OcrBackend> {
    recognizer: Arc<R>,
    reconstructor: LineReconstructor,
    extractor: Arc<TotalExtractor>,
    processing: Arc<watch::Sender<bool>>,
}

impl<R: OcrBackend + 'static> ScanOrchestrator<R> {
    pub fn new(recognizer: R, reconstructor: LineReconstructor, extractor: TotalExtractor) -> Self {
        let (processing, _) = watch::channel(false);
        Self {
            recognizer: Arc::new(recognizer),
            reconstructor,
            extractor: Arc::new(extractor),
            processing: Arc::new(processing),
        }
    }

    pub fn with_defaults(recognizer: R) -> Self {
        Self::new(recognizer, LineReconstructor::default(), TotalExtractor::default())
    }

    pub fn from_config(recognizer: R, config: &ScanConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let extractor = TotalExtractor::new(&config.vocabulary)?;
        Ok(Self::new(recognizer, LineReconstructor::new(config.line_tolerance), extractor))
    }

    pub fn is_processing(&self) -> bool {
        *self.processing.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.processing.subscribe()
    }

    /// Run one scan to completion.
    ///
    /// Dropping the returned future before it finishes clears the
    /// `processing` flag; a recognizer already running on the blocking pool
    /// finishes on its own and its output is discarded.
    pub async fn scan(&self, image: Vec<u8>) -> Result<ReceiptScanResult, SubmitError> {
        let _in_flight = InFlight::acquire(&self.processing)?;
        Ok(run_scan(
            Arc::clone(&self.recognizer),
            self.reconstructor,
            Arc::clone(&self.extractor),
            image,
        )
        .await)
    }

    /// Start a scan in the background and deliver its result to `sink`.
    ///
    /// Only a weak reference to the sink is kept: if the caller has dropped it
    /// by the time the scan finishes, the result is discarded. Must be called
    /// from within a Tokio runtime.
    pub fn submit<S>(&self, image: Vec<u8>, sink: &Arc<S>) -> Result<JoinHandle<()>, SubmitError>
    where
        S: ResultSink + ?Sized + 'static,
    {
        let in_flight = InFlight::acquire(&self.processing)?;
        let sink: Weak<S> = Arc::downgrade(sink);
        let recognizer = Arc::clone(&self.recognizer);
        let reconstructor = self.reconstructor;
        let extractor = Arc::clone(&self.extractor);

        Ok(tokio::spawn(async move {
            let result = run_scan(recognizer, reconstructor, extractor, image).await;
            drop(in_flight);
            match sink.upgrade() {
                Some(sink) => sink.deliver(result),
                None => tracing::debug!("Result sink gone, discarding scan result"),
            }
        }))
    }
}

// ── Single-flight guard ───────────────────────────────────────────────────────

/// Holds the `processing` flag; clears it exactly once on drop.
struct InFlight {
    processing: Arc<watch::Sender<bool>>,
}

impl InFlight {
    fn acquire(processing: &Arc<watch::Sender<bool>>) -> Result<Self, SubmitError> {
        let acquired = processing.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        if !acquired {
            return Err(SubmitError::Busy);
        }
        Ok(Self { processing: Arc::clone(processing) })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.processing.send_replace(false);
    }
}

// ── Stages ────────────────────────────────────────────────────────────────────

async fn run_scan<R: OcrBackend + 'static>(
    recognizer: Arc<R>,
    reconstructor: LineReconstructor,
    extractor: Arc<TotalExtractor>,
    image: Vec<u8>,
) -> ReceiptScanResult {
    tracing::info!("Scanning receipt ({} bytes)", image.len());
    let mut result = ReceiptScanResult::not_found();

    match scan_stages(recognizer, reconstructor, &extractor, image, &mut result.lines).await {
        Ok(amount) => {
            tracing::info!("Receipt total: {amount}");
            result.amount = Some(amount);
        }
        Err(e @ (ScanError::Ocr(_) | ScanError::Task(_))) => {
            tracing::warn!("Receipt scan failed: {e}");
        }
        Err(e) => {
            tracing::info!("Receipt scanned without amount: {e}");
        }
    }
    result
}

async fn scan_stages<R: OcrBackend + 'static>(
    recognizer: Arc<R>,
    reconstructor: LineReconstructor,
    extractor: &TotalExtractor,
    image: Vec<u8>,
    lines: &mut Vec<String>,
) -> Result<Money, ScanError> {
    let fragments = recognize(recognizer, image).await?;
    *lines = reconstructor.reconstruct(&fragments).iter().map(Line::text).collect();
    tracing::debug!("Recognized text:\n{}", lines.join("\n"));
    Ok(extractor.try_extract(lines.as_slice())?)
}

async fn recognize<R: OcrBackend + 'static>(
    recognizer: Arc<R>,
    image: Vec<u8>,
) -> Result<Vec<TextFragment>, ScanError> {
    let fragments = tokio::task::spawn_blocking(move || recognizer.recognize(&image))
        .await
        .map_err(|e| ScanError::Task(e.to_string()))??;
    if fragments.is_empty() {
        return Err(ScanError::NoTextRecognized);
    }
    Ok(fragments)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{JsonRecognizer, MockRecognizer};
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Duration;

    const TIP_RECEIPT: &[&str] = &["Pizzeria Roma", "Summe 45,00", "Trinkgeld 5,00", "Gesamt 50,00"];

    #[derive(Default)]
    struct CollectingSink {
        results: Mutex<Vec<ReceiptScanResult>>,
    }

    impl ResultSink for CollectingSink {
        fn deliver(&self, result: ReceiptScanResult) {
            self.results.lock().unwrap().push(result);
        }
    }

    /// Blocks inside `recognize` until the test releases it.
    struct GatedRecognizer {
        gate: Mutex<mpsc::Receiver<()>>,
        inner: MockRecognizer,
    }

    impl GatedRecognizer {
        fn new(lines: &[&str]) -> (Self, mpsc::Sender<()>) {
            let (tx, rx) = mpsc::channel();
            let r = Self { gate: Mutex::new(rx), inner: MockRecognizer::from_lines(lines) };
            (r, tx)
        }
    }

    impl OcrBackend for GatedRecognizer {
        fn recognize(&self, image_bytes: &[u8]) -> Result<Vec<TextFragment>, OcrError> {
            let _ = self.gate.lock().unwrap().recv();
            self.inner.recognize(image_bytes)
        }
    }

    struct FailingRecognizer;

    impl OcrBackend for FailingRecognizer {
        fn recognize(&self, _image_bytes: &[u8]) -> Result<Vec<TextFragment>, OcrError> {
            Err(OcrError::Engine("model not loaded".into()))
        }
    }

    struct PanickingRecognizer;

    impl OcrBackend for PanickingRecognizer {
        fn recognize(&self, _image_bytes: &[u8]) -> Result<Vec<TextFragment>, OcrError> {
            panic!("recognizer crashed")
        }
    }

    #[tokio::test]
    async fn scan_produces_tip_adjusted_total() {
        let orchestrator = ScanOrchestrator::with_defaults(MockRecognizer::from_lines(TIP_RECEIPT));

        let result = orchestrator.scan(b"jpeg".to_vec()).await.unwrap();

        assert_eq!(result.amount, Some(Money::from_cents(5000)));
        assert_eq!(result.lines, TIP_RECEIPT);
        assert!(!orchestrator.is_processing());
    }

    #[tokio::test]
    async fn recognizer_failure_is_no_amount() {
        let orchestrator = ScanOrchestrator::with_defaults(FailingRecognizer);
        let result = orchestrator.scan(vec![]).await.unwrap();
        assert!(result.needs_manual_entry());
        assert!(!orchestrator.is_processing());
    }

    #[tokio::test]
    async fn empty_recognition_is_no_amount() {
        let orchestrator = ScanOrchestrator::with_defaults(MockRecognizer::new(vec![]));
        let result = orchestrator.scan(vec![]).await.unwrap();
        assert_eq!(result, ReceiptScanResult::not_found());
    }

    #[tokio::test]
    async fn no_keyword_keeps_lines_for_diagnostics() {
        let orchestrator =
            ScanOrchestrator::with_defaults(MockRecognizer::from_lines(&["REWE", "Milch 1,19"]));
        let result = orchestrator.scan(vec![]).await.unwrap();
        assert_eq!(result.amount, None);
        assert_eq!(result.lines, vec!["REWE", "Milch 1,19"]);
    }

    #[tokio::test]
    async fn recognizer_panic_is_no_amount_and_resets_flag() {
        let orchestrator = ScanOrchestrator::with_defaults(PanickingRecognizer);
        let result = orchestrator.scan(vec![]).await.unwrap();
        assert_eq!(result.amount, None);
        assert!(!orchestrator.is_processing());
    }

    #[tokio::test]
    async fn second_scan_is_rejected_while_busy() {
        let (recognizer, release) = GatedRecognizer::new(TIP_RECEIPT);
        let orchestrator = ScanOrchestrator::with_defaults(recognizer);
        let sink = Arc::new(CollectingSink::default());

        let handle = orchestrator.submit(vec![], &sink).unwrap();
        assert!(orchestrator.is_processing());
        assert_eq!(orchestrator.submit(vec![], &sink).unwrap_err(), SubmitError::Busy);
        assert_eq!(orchestrator.scan(vec![]).await.unwrap_err(), SubmitError::Busy);

        release.send(()).unwrap();
        handle.await.unwrap();

        assert!(!orchestrator.is_processing());
        let results = sink.results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].amount, Some(Money::from_cents(5000)));
    }

    #[tokio::test]
    async fn processing_flag_is_observable() {
        let (recognizer, release) = GatedRecognizer::new(&["Total 9,99"]);
        let orchestrator = ScanOrchestrator::with_defaults(recognizer);
        let sink = Arc::new(CollectingSink::default());
        let mut processing = orchestrator.subscribe();
        assert!(!*processing.borrow_and_update());

        let handle = orchestrator.submit(vec![], &sink).unwrap();
        assert!(*processing.borrow_and_update());

        release.send(()).unwrap();
        processing.changed().await.unwrap();
        assert!(!*processing.borrow());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn result_for_dropped_sink_is_discarded() {
        let (recognizer, release) = GatedRecognizer::new(TIP_RECEIPT);
        let orchestrator = ScanOrchestrator::with_defaults(recognizer);
        let sink = Arc::new(CollectingSink::default());

        let handle = orchestrator.submit(vec![], &sink).unwrap();
        drop(sink);
        release.send(()).unwrap();

        handle.await.unwrap();
        assert!(!orchestrator.is_processing());
    }

    #[tokio::test]
    async fn closure_sink_receives_result() {
        let orchestrator = ScanOrchestrator::with_defaults(MockRecognizer::from_lines(&["Total", "22,90"]));
        let seen = Arc::new(Mutex::new(None));
        let seen_by_sink = Arc::clone(&seen);
        let sink = Arc::new(move |r: ReceiptScanResult| {
            *seen_by_sink.lock().unwrap() = r.amount;
        });

        orchestrator.submit(vec![], &sink).unwrap().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(Money::from_cents(2290)));
    }

    #[tokio::test]
    async fn cancelled_scan_clears_processing() {
        let (recognizer, release) = GatedRecognizer::new(TIP_RECEIPT);
        let orchestrator = ScanOrchestrator::with_defaults(recognizer);

        let outcome = tokio::time::timeout(Duration::from_millis(20), orchestrator.scan(vec![])).await;
        assert!(outcome.is_err());
        assert!(!orchestrator.is_processing());

        release.send(()).unwrap();
    }

    #[tokio::test]
    async fn from_config_applies_vocabulary() {
        let config = ScanConfig::from_toml("[vocabulary]\ntotal_keywords = [\"amount due\"]").unwrap();
        let orchestrator = ScanOrchestrator::from_config(
            MockRecognizer::from_lines(&["Total 9,99", "Amount due 12.00"]),
            &config,
        )
        .unwrap();
        let result = orchestrator.scan(vec![]).await.unwrap();
        assert_eq!(result.amount, Some(Money::from_cents(1200)));
    }

    #[test]
    fn from_config_rejects_invalid_tolerance() {
        for line_tolerance in [0.0, -0.01, f64::NAN] {
            let config = ScanConfig { line_tolerance, ..ScanConfig::default() };
            let result = ScanOrchestrator::from_config(MockRecognizer::from_lines(&["Total 1,00"]), &config);
            assert!(matches!(result, Err(ConfigError::Tolerance(_))));
        }
    }

    #[tokio::test]
    async fn json_dump_end_to_end() {
        let json = br#"[
            {"text": "22,90", "box": {"x": 0.70, "y": 0.300, "width": 0.1, "height": 0.02}},
            {"text": "MwSt 19%", "box": {"x": 0.10, "y": 0.400, "width": 0.2, "height": 0.02}},
            {"text": "Total", "box": {"x": 0.10, "y": 0.302, "width": 0.2, "height": 0.02}},
            {"text": "3,50", "box": {"x": 0.70, "y": 0.398, "width": 0.1, "height": 0.02}}
        ]"#;
        let orchestrator = ScanOrchestrator::with_defaults(JsonRecognizer);
        let result = orchestrator.scan(json.to_vec()).await.unwrap();
        assert_eq!(result.lines, vec!["MwSt 19% 3,50", "Total 22,90"]);
        assert_eq!(result.amount, Some(Money::from_cents(2290)));
    }
}
