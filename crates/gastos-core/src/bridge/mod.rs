//! Spreadsheet bridge client
//!
//! The remote store is a spreadsheet reached through a small web bridge that
//! understands four actions: `get`, `save`, `delete` and `migrate`. This module
//! owns the protocol types and the [`RemoteBridge`] client.
//!
//! # Architecture
//!
//! - `Transport` trait: sends one [`BridgeRequest`] to an endpoint and returns
//!   the decoded JSON reply
//! - `HttpTransport`: callback-wrapped GET requests (the bridge only answers
//!   cross-origin GETs)
//! - `Spreadsheet` (in `crate::sheet`): in-memory implementation of the server
//!   side, usable as a transport
//!
//! # Failure handling
//!
//! The `try_*` methods return typed errors. The plain methods never fail: they
//! log and fall back to an empty list or `None`, and a network failure raises a
//! one-shot connection-error flag read with [`RemoteBridge::take_connection_error`].
//! Without an endpoint every call short-circuits without touching the transport.

mod http;

pub use http::HttpTransport;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{ReceiptId, ReceiptRecord};

/// One bridge call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum BridgeRequest {
    Get,
    Save { data: ReceiptRecord },
    Delete { id: ReceiptId },
    Migrate,
}

impl BridgeRequest {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Save { .. } => "save",
            Self::Delete { .. } => "delete",
            Self::Migrate => "migrate",
        }
    }

    /// Query-string form used by the HTTP transport
    pub fn query_pairs(&self) -> Result<Vec<(&'static str, String)>> {
        let mut pairs = vec![("action", self.action().to_string())];
        match self {
            Self::Save { data } => pairs.push(("data", serde_json::to_string(data)?)),
            Self::Delete { id } => pairs.push(("id", id.clone())),
            Self::Get | Self::Migrate => {}
        }
        Ok(pairs)
    }

    /// Parse the query-string form (server side)
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self> {
        let action = params
            .get("action")
            .ok_or_else(|| Error::Validation("Missing action".into()))?;

        match action.as_str() {
            "get" => Ok(Self::Get),
            "migrate" => Ok(Self::Migrate),
            "save" => {
                let raw = params
                    .get("data")
                    .ok_or_else(|| Error::Validation("Missing data for save".into()))?;
                let data: ReceiptRecord = serde_json::from_str(raw)
                    .map_err(|e| Error::Validation(format!("Invalid receipt data: {}", e)))?;
                Ok(Self::Save { data })
            }
            "delete" => {
                let id = params
                    .get("id")
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| Error::Validation("Missing id for delete".into()))?;
                Ok(Self::Delete { id: id.clone() })
            }
            other => Err(Error::Validation(format!("Unknown action: {}", other))),
        }
    }
}

/// Reply to `save`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveAck {
    pub success: bool,
    pub id: ReceiptId,
}

/// Reply to `delete`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteAck {
    pub success: bool,
    pub id: ReceiptId,
}

/// Reply to `migrate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateReport {
    pub success: bool,
    pub migrated_count: usize,
    pub message: String,
}

/// Error reply shape: `{error, details?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&Error> for BridgeErrorBody {
    fn from(err: &Error) -> Self {
        match err {
            Error::Validation(message) => Self {
                error: message.clone(),
                details: None,
            },
            Error::Remote { message, details } => Self {
                error: message.clone(),
                details: details.clone(),
            },
            other => Self {
                error: "Request failed".into(),
                details: Some(other.to_string()),
            },
        }
    }
}

/// Decode a bridge reply, turning `{error}` objects into [`Error::Remote`]
pub fn decode_reply<T: DeserializeOwned>(value: Value) -> Result<T> {
    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        let details = value
            .get("details")
            .and_then(Value::as_str)
            .map(str::to_string);
        return Err(Error::Remote {
            message: err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string()),
            details,
        });
    }
    Ok(serde_json::from_value(value)?)
}

/// Wire-level seam between the bridge client and the remote store
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request to `endpoint` and return the decoded reply body
    async fn call(&self, endpoint: &str, request: &BridgeRequest) -> Result<Value>;
}

/// Client for the spreadsheet bridge
pub struct RemoteBridge {
    transport: Arc<dyn Transport>,
    endpoint: RwLock<Option<String>>,
    connection_error: AtomicBool,
}

impl RemoteBridge {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Option<String>) -> Self {
        Self {
            transport,
            endpoint: RwLock::new(normalize_endpoint(endpoint)),
            connection_error: AtomicBool::new(false),
        }
    }

    /// Bridge over HTTP
    pub fn http(endpoint: Option<String>) -> Self {
        Self::new(Arc::new(HttpTransport::new()), endpoint)
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint().is_some()
    }

    pub fn endpoint(&self) -> Option<String> {
        self.endpoint
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the endpoint. Requests already issued keep the old one.
    pub fn set_endpoint(&self, endpoint: Option<String>) {
        let endpoint = normalize_endpoint(endpoint);
        debug!(configured = endpoint.is_some(), "Bridge endpoint changed");
        *self.endpoint.write().unwrap_or_else(|e| e.into_inner()) = endpoint;
    }

    /// Read and clear the connection-error flag
    pub fn take_connection_error(&self) -> bool {
        self.connection_error.swap(false, Ordering::SeqCst)
    }

    async fn call<T: DeserializeOwned>(&self, request: BridgeRequest) -> Result<T> {
        let endpoint = self
            .endpoint()
            .ok_or_else(|| Error::Configuration("Spreadsheet bridge URL not set".into()))?;

        debug!(action = request.action(), "Bridge request");
        let reply = match self.transport.call(&endpoint, &request).await {
            Ok(reply) => reply,
            Err(e) => {
                if matches!(e, Error::Http(_) | Error::Io(_)) {
                    self.connection_error.store(true, Ordering::SeqCst);
                }
                return Err(e);
            }
        };
        decode_reply(reply)
    }

    pub async fn try_list(&self) -> Result<Vec<ReceiptRecord>> {
        self.call(BridgeRequest::Get).await
    }

    pub async fn try_save(&self, record: &ReceiptRecord) -> Result<SaveAck> {
        if record.id.trim().is_empty() {
            return Err(Error::Validation("Receipt id is required for save".into()));
        }
        let ack: SaveAck = self
            .call(BridgeRequest::Save {
                data: record.clone(),
            })
            .await?;
        if !ack.success {
            return Err(Error::Remote {
                message: format!("Save of {} was not acknowledged", record.id),
                details: None,
            });
        }
        Ok(ack)
    }

    pub async fn try_delete(&self, id: &str) -> Result<DeleteAck> {
        if id.trim().is_empty() {
            return Err(Error::Validation("Receipt id is required for delete".into()));
        }
        self.call(BridgeRequest::Delete { id: id.to_string() })
            .await
    }

    pub async fn try_migrate(&self) -> Result<MigrateReport> {
        self.call(BridgeRequest::Migrate).await
    }

    /// All remote receipts, or an empty list on any failure
    pub async fn list_receipts(&self) -> Vec<ReceiptRecord> {
        if !self.is_configured() {
            return Vec::new();
        }
        self.try_list().await.unwrap_or_else(|e| {
            warn!("Failed to list remote receipts: {}", e);
            Vec::new()
        })
    }

    /// Upsert a receipt; `None` on any failure
    pub async fn save_receipt(&self, record: &ReceiptRecord) -> Option<SaveAck> {
        if !self.is_configured() {
            return None;
        }
        self.try_save(record)
            .await
            .map_err(|e| warn!(id = %record.id, "Failed to save receipt: {}", e))
            .ok()
    }

    /// Delete a receipt and its items; `None` on any failure
    pub async fn delete_receipt(&self, id: &str) -> Option<DeleteAck> {
        if !self.is_configured() {
            return None;
        }
        self.try_delete(id)
            .await
            .map_err(|e| warn!(id = %id, "Failed to delete receipt: {}", e))
            .ok()
    }

    /// Rebuild item rows from embedded item lists; `None` on any failure
    pub async fn migrate(&self) -> Option<MigrateReport> {
        if !self.is_configured() {
            return None;
        }
        self.try_migrate()
            .await
            .map_err(|e| warn!("Migration failed: {}", e))
            .ok()
    }
}

fn normalize_endpoint(endpoint: Option<String>) -> Option<String> {
    endpoint
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReceiptStatus;
    use std::sync::atomic::AtomicUsize;

    /// Transport that counts calls and replays a fixed reply
    struct FixedTransport {
        reply: std::result::Result<Value, String>,
        calls: AtomicUsize,
    }

    impl FixedTransport {
        fn ok(reply: Value) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply),
                calls: AtomicUsize::new(0),
            })
        }

        fn io_failure() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("connection refused".into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn call(&self, _endpoint: &str, _request: &BridgeRequest) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(v) => Ok(v.clone()),
                Err(msg) => Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    msg.clone(),
                ))),
            }
        }
    }

    fn record(id: &str) -> ReceiptRecord {
        ReceiptRecord {
            id: id.into(),
            url: Some("http://x/1".into()),
            status: ReceiptStatus::Processing,
            ..Default::default()
        }
    }

    #[test]
    fn test_query_pairs_round_trip() {
        let request = BridgeRequest::Save { data: record("r1") };
        let params: HashMap<String, String> = request
            .query_pairs()
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(BridgeRequest::from_query(&params).unwrap(), request);
    }

    #[test]
    fn test_from_query_validation() {
        let mut params = HashMap::new();
        assert!(matches!(
            BridgeRequest::from_query(&params),
            Err(Error::Validation(_))
        ));
        params.insert("action".to_string(), "save".to_string());
        assert!(matches!(
            BridgeRequest::from_query(&params),
            Err(Error::Validation(_))
        ));
        params.insert("action".to_string(), "delete".to_string());
        params.insert("id".to_string(), " ".to_string());
        assert!(matches!(
            BridgeRequest::from_query(&params),
            Err(Error::Validation(_))
        ));
        params.insert("action".to_string(), "drop".to_string());
        assert!(BridgeRequest::from_query(&params).is_err());
    }

    #[test]
    fn test_decode_reply_error_body() {
        let value = serde_json::json!({"error": "Missing receipt id", "details": "no id"});
        let err = decode_reply::<SaveAck>(value).unwrap_err();
        match err {
            Error::Remote { message, details } => {
                assert_eq!(message, "Missing receipt id");
                assert_eq!(details.as_deref(), Some("no id"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_short_circuits() {
        let transport = FixedTransport::ok(serde_json::json!([]));
        let bridge = RemoteBridge::new(transport.clone(), Some("  ".into()));
        assert!(!bridge.is_configured());

        assert!(bridge.list_receipts().await.is_empty());
        assert!(bridge.save_receipt(&record("r1")).await.is_none());
        assert!(bridge.delete_receipt("r1").await.is_none());
        assert!(bridge.migrate().await.is_none());
        assert!(matches!(
            bridge.try_list().await,
            Err(Error::Configuration(_))
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert!(!bridge.take_connection_error());
    }

    #[tokio::test]
    async fn test_connection_error_is_one_shot() {
        let bridge = RemoteBridge::new(FixedTransport::io_failure(), Some("http://bridge".into()));
        assert!(bridge.list_receipts().await.is_empty());
        assert!(bridge.take_connection_error());
        assert!(!bridge.take_connection_error());
    }

    #[tokio::test]
    async fn test_save_requires_id() {
        let transport = FixedTransport::ok(serde_json::json!({"success": true, "id": ""}));
        let bridge = RemoteBridge::new(transport.clone(), Some("http://bridge".into()));
        assert!(bridge.save_receipt(&record("")).await.is_none());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unacknowledged_save_is_failure() {
        let transport = FixedTransport::ok(serde_json::json!({"success": false, "id": "r1"}));
        let bridge = RemoteBridge::new(transport, Some("http://bridge".into()));
        assert!(bridge.save_receipt(&record("r1")).await.is_none());
        assert!(!bridge.take_connection_error());
    }

    #[tokio::test]
    async fn test_set_endpoint() {
        let bridge = RemoteBridge::new(FixedTransport::ok(serde_json::json!([])), None);
        assert!(!bridge.is_configured());
        bridge.set_endpoint(Some(" http://bridge/exec ".into()));
        assert_eq!(bridge.endpoint().as_deref(), Some("http://bridge/exec"));
        bridge.set_endpoint(None);
        assert!(!bridge.is_configured());
    }
}
