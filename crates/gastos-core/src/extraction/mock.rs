//! Mock extraction backend for testing
//!
//! Returns predictable results without a model server. Individual URLs and
//! the photo result can be scripted; clones share the script and counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::parsing::find_url;
use super::ExtractionGateway;
use crate::error::{Error, Result};
use crate::models::{ExtractedFields, Item};

type Scripted<T> = std::result::Result<T, String>;

#[derive(Default)]
struct Script {
    fields: Mutex<HashMap<String, Scripted<ExtractedFields>>>,
    photo: Mutex<Option<Scripted<String>>>,
    url_calls: AtomicUsize,
    photo_calls: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MockExtractor {
    script: Arc<Script>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `fields` for `url`
    pub fn with_fields(self, url: &str, fields: ExtractedFields) -> Self {
        self.script
            .fields
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), Ok(fields));
        self
    }

    /// Fail extraction of `url` with `message`
    pub fn with_failure(self, url: &str, message: &str) -> Self {
        self.script
            .fields
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), Err(message.to_string()));
        self
    }

    /// Every photo decodes to `url`
    pub fn with_photo_url(self, url: &str) -> Self {
        *self.script.photo.lock().unwrap_or_else(|e| e.into_inner()) = Some(Ok(url.to_string()));
        self
    }

    /// Every photo fails with `message`
    pub fn with_photo_failure(self, message: &str) -> Self {
        *self.script.photo.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(Err(message.to_string()));
        self
    }

    pub fn url_calls(&self) -> usize {
        self.script.url_calls.load(Ordering::SeqCst)
    }

    pub fn photo_calls(&self) -> usize {
        self.script.photo_calls.load(Ordering::SeqCst)
    }

    fn default_fields() -> ExtractedFields {
        ExtractedFields {
            store_name: Some("Mercado Mock".into()),
            store_cnpj: Some("00.000.000/0001-00".into()),
            store_address: Some("Rua das Flores, 100, Centro".into()),
            date: Some("15/01/2024 18:30:00".into()),
            total_amount: Some(30.9),
            payer: None,
            items: vec![
                Item {
                    name: "Arroz Tipo 1 5kg".into(),
                    quantity: 1.0,
                    unit: "UN".into(),
                    unit_price: 25.9,
                    total_price: 25.9,
                    category: "Mercearia".into(),
                },
                Item {
                    name: "Leite Integral 1L".into(),
                    quantity: 1.0,
                    unit: "UN".into(),
                    unit_price: 5.0,
                    total_price: 5.0,
                    category: "Laticínios".into(),
                },
            ],
        }
    }
}

#[async_trait]
impl ExtractionGateway for MockExtractor {
    async fn url_to_fields(&self, url: &str) -> Result<ExtractedFields> {
        self.script.url_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .script
            .fields
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned();
        match scripted {
            Some(Ok(fields)) => Ok(fields),
            Some(Err(message)) => Err(Error::Extraction(message)),
            None => Ok(Self::default_fields()),
        }
    }

    /// Unscripted photos are read as text and must contain a URL
    async fn image_to_url(&self, photo: &[u8]) -> Result<String> {
        self.script.photo_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .script
            .photo
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match scripted {
            Some(Ok(url)) => Ok(url),
            Some(Err(message)) => Err(Error::Extraction(message)),
            None => std::str::from_utf8(photo)
                .ok()
                .and_then(find_url)
                .ok_or_else(|| Error::Extraction("No receipt URL found in photo".into())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
