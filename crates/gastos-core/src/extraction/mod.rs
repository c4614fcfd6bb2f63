//! Receipt extraction backends
//!
//! Two capabilities, each fallible and independently retryable:
//!
//! - `url_to_fields`: read the NFC-e page behind a URL and return structured
//!   store, total and item data
//! - `image_to_url`: read the QR code / printed URL from a receipt photo
//!
//! # Architecture
//!
//! - `ExtractionGateway` trait: the interface the receipt store depends on
//! - `Extractor` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaExtractor`, `MockExtractor`
//!
//! # Configuration
//!
//! Environment variables (see also `crate::config`):
//! - `GASTOS_EXTRACTOR`: Backend to use (ollama, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Text model for page extraction (default: llama3.2)
//! - `OLLAMA_VISION_MODEL`: Vision model for photos (default: llava)

mod mock;
mod ollama;
pub mod parsing;

pub use mock::MockExtractor;
pub use ollama::OllamaExtractor;

use async_trait::async_trait;

use crate::config::ExtractorConfig;
use crate::error::Result;
use crate::models::ExtractedFields;

/// Interface to the AI extraction collaborator
#[async_trait]
pub trait ExtractionGateway: Send + Sync {
    /// Derive structured receipt fields from the page at `url`
    async fn url_to_fields(&self, url: &str) -> Result<ExtractedFields>;

    /// Derive the receipt URL from a photographed receipt
    async fn image_to_url(&self, photo: &[u8]) -> Result<String>;

    /// Backend name (for logging)
    fn name(&self) -> &str;
}

/// Concrete extractor enum
#[derive(Clone)]
pub enum Extractor {
    /// Ollama backend (HTTP API)
    Ollama(OllamaExtractor),
    /// Mock backend for testing
    Mock(MockExtractor),
}

impl Extractor {
    /// Build the backend named in the config.
    ///
    /// Returns None if the chosen backend is missing required settings.
    pub fn from_config(config: &ExtractorConfig) -> Option<Self> {
        match config.backend.to_lowercase().as_str() {
            "mock" => Some(Extractor::Mock(MockExtractor::new())),
            "ollama" => OllamaExtractor::from_config(config).map(Extractor::Ollama),
            other => {
                tracing::warn!(backend = %other, "Unknown extractor backend, falling back to ollama");
                OllamaExtractor::from_config(config).map(Extractor::Ollama)
            }
        }
    }

    pub fn mock() -> Self {
        Extractor::Mock(MockExtractor::new())
    }
}

#[async_trait]
impl ExtractionGateway for Extractor {
    async fn url_to_fields(&self, url: &str) -> Result<ExtractedFields> {
        match self {
            Extractor::Ollama(b) => b.url_to_fields(url).await,
            Extractor::Mock(b) => b.url_to_fields(url).await,
        }
    }

    async fn image_to_url(&self, photo: &[u8]) -> Result<String> {
        match self {
            Extractor::Ollama(b) => b.image_to_url(photo).await,
            Extractor::Mock(b) => b.image_to_url(photo).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Extractor::Ollama(b) => b.name(),
            Extractor::Mock(b) => b.name(),
        }
    }
}
