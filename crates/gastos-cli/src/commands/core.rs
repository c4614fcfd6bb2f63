//! Shared command utilities
//!
//! This module contains:
//! - `resolve_config` - Config file + environment + CLI flag overrides
//! - `open_store` - Build the receipt store and load the current list
//! - `find_receipt` - Look up a receipt by id or unique id prefix

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use gastos_core::{
    Config, Extractor, FileSlot, LocalSnapshot, OllamaExtractor, Receipt, ReceiptStore,
    RemoteBridge,
};
use tracing::debug;

/// Used when no OLLAMA_HOST is configured
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Load config from the data directory and environment, then apply CLI flags
pub fn resolve_config(data_dir: Option<&Path>, endpoint: Option<&str>) -> Result<Config> {
    let mut config = Config::load(data_dir).context("Failed to load configuration")?;
    if let Some(endpoint) = endpoint {
        config.endpoint = Some(endpoint.to_string());
    }
    Ok(config)
}

/// Extractor from config, falling back to a local Ollama
pub fn build_extractor(config: &Config) -> Extractor {
    Extractor::from_config(&config.extractor).unwrap_or_else(|| {
        debug!("OLLAMA_HOST not set, using {}", DEFAULT_OLLAMA_HOST);
        Extractor::Ollama(OllamaExtractor::new(
            DEFAULT_OLLAMA_HOST,
            &config.extractor.model,
            &config.extractor.vision_model,
        ))
    })
}

/// Open the receipt store and load receipts from the bridge (or the local
/// snapshot when no bridge is configured)
pub async fn open_store(config: &Config) -> Result<ReceiptStore> {
    let slot = FileSlot::new(&config.data_dir).with_context(|| {
        format!(
            "Failed to open data directory {}",
            config.data_dir.display()
        )
    })?;
    let bridge = RemoteBridge::http(config.endpoint.clone());
    let store = ReceiptStore::new(
        Arc::new(bridge),
        Arc::new(build_extractor(config)),
        LocalSnapshot::new(Arc::new(slot)),
    );
    store.initial_load().await;
    Ok(store)
}

/// Find a receipt by full id or unique id prefix
pub fn find_receipt(store: &ReceiptStore, id: &str) -> Result<Receipt> {
    let id = id.trim();
    if id.is_empty() {
        bail!("Receipt id is empty");
    }
    let receipts = store.receipts();
    if let Some(exact) = receipts.iter().find(|r| r.id == id) {
        return Ok(exact.clone());
    }

    let matches: Vec<&Receipt> = receipts.iter().filter(|r| r.id.starts_with(id)).collect();
    match matches.as_slice() {
        [] => bail!("Receipt not found: {}", id),
        [one] => Ok((*one).clone()),
        many => bail!("Receipt id '{}' is ambiguous ({} matches)", id, many.len()),
    }
}

/// Warn once if any bridge call failed to connect
pub fn warn_if_offline(store: &ReceiptStore) {
    if store.connection_error() {
        println!("⚠️  Could not reach the spreadsheet bridge; unsynced changes were not saved");
    }
}

/// Require a configured bridge for remote-only commands
pub fn require_remote(store: &ReceiptStore) -> Result<()> {
    if !store.is_remote_configured() {
        bail!("No spreadsheet bridge configured. Set one with `gastos config set-endpoint <url>` or GASTOS_SHEETS_URL");
    }
    Ok(())
}
