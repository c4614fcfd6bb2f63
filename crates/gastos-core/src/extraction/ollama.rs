//! Ollama extraction backend
//!
//! Page extraction fetches the NFC-e page, strips it to text and asks a text
//! model for a JSON object. Photo extraction sends the image to a vision model
//! and asks for the URL printed under (or encoded in) the QR code.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parsing::{page_text, parse_fields_response, parse_url_response};
use super::ExtractionGateway;
use crate::config::ExtractorConfig;
use crate::error::{Error, Result};
use crate::models::ExtractedFields;

const FIELDS_PROMPT: &str = r#"You read Brazilian NFC-e consumer receipts.
Return only a JSON object with these keys:
{"storeName": string, "storeCnpj": string, "storeAddress": string,
 "date": "DD/MM/YYYY HH:MM:SS", "totalAmount": number,
 "items": [{"name": string, "quantity": number, "unit": string,
            "unitPrice": number, "totalPrice": number, "category": string}]}
Use a short Portuguese grocery category for each item (Mercearia, Hortifruti,
Laticínios, Carnes, Bebidas, Limpeza, Higiene, Padaria, Outros).

Receipt page:
"#;

const URL_PROMPT: &str = r#"This is a photo of a Brazilian NFC-e receipt.
Find the consultation URL encoded in the QR code or printed near it.
Return only a JSON object: {"url": "<the full URL>"}. Use null if there is none."#;

/// Page fetch and model calls share this limit
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Clone)]
pub struct OllamaExtractor {
    http_client: Client,
    base_url: String,
    model: String,
    vision_model: String,
}

impl OllamaExtractor {
    pub fn new(base_url: &str, model: &str, vision_model: &str) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            vision_model: vision_model.to_string(),
        }
    }

    /// Returns None when no host is configured
    pub fn from_config(config: &ExtractorConfig) -> Option<Self> {
        let host = config.host.as_deref().filter(|h| !h.trim().is_empty())?;
        Some(Self::new(host, &config.model, &config.vision_model))
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Extraction(format!("Failed to fetch receipt page: {}", e)))?;
        let html = response.text().await?;
        Ok(page_text(&html))
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        let reply: GenerateResponse = response.json().await?;
        debug!(model = %request.model, "Ollama reply: {}", reply.response);
        Ok(reply.response)
    }
}

/// Request to Ollama's generate API
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    format: &'static str,
    stream: bool,
}

/// Response from Ollama's generate API
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl ExtractionGateway for OllamaExtractor {
    async fn url_to_fields(&self, url: &str) -> Result<ExtractedFields> {
        let text = self.fetch_page(url).await?;
        if text.is_empty() {
            return Err(Error::Extraction("Receipt page was empty".into()));
        }

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: format!("{}{}", FIELDS_PROMPT, text),
            images: Vec::new(),
            format: "json",
            stream: false,
        };
        let reply = self.generate(&request).await?;
        parse_fields_response(&reply)
    }

    async fn image_to_url(&self, photo: &[u8]) -> Result<String> {
        if photo.is_empty() {
            return Err(Error::Extraction("Photo is empty".into()));
        }

        let request = GenerateRequest {
            model: self.vision_model.clone(),
            prompt: URL_PROMPT.to_string(),
            images: vec![base64::engine::general_purpose::STANDARD.encode(photo)],
            format: "json",
            stream: false,
        };
        let reply = self.generate(&request).await?;
        parse_url_response(&reply)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
