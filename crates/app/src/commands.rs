use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tally_ocr::{
    JsonRecognizer, LineReconstructor, OcrBackend, ReceiptScanResult, ScanConfig,
    ScanOrchestrator, TotalExtractor,
};

const MANUAL_ENTRY_HINT: &str = "No amount found, enter the total manually";

/// `<config dir>/config.toml`, e.g. `~/.config/tally/config.toml` on Linux.
pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "tally", "Tally")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// An explicit path must exist; the default location is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<ScanConfig> {
    let path = match (explicit, config_path()) {
        (Some(p), _) => p.to_path_buf(),
        (None, Some(p)) if p.exists() => p,
        _ => {
            tracing::debug!("No config file, using built-in vocabulary");
            return Ok(ScanConfig::default());
        }
    };
    tracing::debug!("Loading config from {}", path.display());
    ScanConfig::load(&path).with_context(|| format!("load config {}", path.display()))
}

pub async fn scan(config: &ScanConfig, path: &Path, show_lines: bool, json: bool) -> Result<()> {
    let payload = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let orchestrator = ScanOrchestrator::from_config(JsonRecognizer, config)?;
    let result = orchestrator.scan(payload).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    if show_lines {
        for line in &result.lines {
            println!("{line}");
        }
        println!();
    }
    println!("{}", render(&result));
    Ok(())
}

pub fn lines(config: &ScanConfig, path: &Path) -> Result<()> {
    let payload = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let fragments = JsonRecognizer
        .recognize(&payload)
        .with_context(|| format!("parse fragments in {}", path.display()))?;
    for line in LineReconstructor::new(config.line_tolerance).reconstruct(&fragments) {
        println!("{}", line.text());
    }
    Ok(())
}

pub fn extract(config: &ScanConfig, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let extractor = TotalExtractor::new(&config.vocabulary)?;
    match extractor.try_extract(&text.lines().collect::<Vec<_>>()) {
        Ok(total) => println!("Gross total: {total}"),
        Err(e) => {
            tracing::info!("{e}");
            println!("{MANUAL_ENTRY_HINT}");
        }
    }
    Ok(())
}

fn render(result: &ReceiptScanResult) -> String {
    match result.amount {
        Some(total) => format!("Gross total: {total}"),
        None => MANUAL_ENTRY_HINT.to_string(),
    }
}
