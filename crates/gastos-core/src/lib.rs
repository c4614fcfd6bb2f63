//! Gastos Core Library
//!
//! Shared functionality for the Gastos NFC-e expense tracker:
//! - Receipt model with a tagged processing lifecycle
//! - Receipt store with a one-at-a-time extraction queue
//! - Spreadsheet bridge client (HTTP, callback-wrapped) and in-memory spreadsheet
//! - Local snapshot fallback when no bridge is configured
//! - Pluggable extraction backends (Ollama, mock)
//! - Spending, product, store and shopping-list analytics
//! - Configuration from `config.toml` and the environment

pub mod analytics;
pub mod bridge;
pub mod config;
pub mod error;
pub mod extraction;
pub mod geocode;
pub mod models;
pub mod sheet;
pub mod snapshot;
pub mod store;

/// Test utilities including a mock spreadsheet bridge server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use analytics::{AnalyticsProjection, Dashboard, StoreQuote};
pub use bridge::{BridgeRequest, HttpTransport, MigrateReport, RemoteBridge, Transport};
pub use config::{Config, ExtractorConfig};
pub use error::{Error, Result};
pub use extraction::{ExtractionGateway, Extractor, MockExtractor, OllamaExtractor};
pub use geocode::{CachedGeocoder, Coordinates, Geocoder};
pub use models::{
    ExtractedFields, Item, Receipt, ReceiptDetails, ReceiptId, ReceiptRecord, ReceiptState,
    ReceiptStatus,
};
pub use sheet::Spreadsheet;
pub use snapshot::{FileSlot, LocalSnapshot, MemorySlot, SnapshotSlot};
pub use store::{ReceiptList, ReceiptStore, SyncSummary};
