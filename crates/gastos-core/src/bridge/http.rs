//! HTTP transport for the spreadsheet bridge
//!
//! The bridge is a web app that only answers GET requests and wraps its JSON
//! reply in a caller-named callback (`cb_7({...})`) so it can be loaded across
//! origins. Each request gets a fresh callback name and the wrapper is stripped
//! before decoding.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{BridgeRequest, Transport};
use crate::error::{Error, Result};

/// Requests that take longer than this fail instead of hanging the sync flags
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct HttpTransport {
    http_client: Client,
    callback_seq: AtomicU64,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http_client,
            callback_seq: AtomicU64::new(0),
        }
    }

    fn next_callback(&self) -> String {
        format!("gastos_cb_{}", self.callback_seq.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, endpoint: &str, request: &BridgeRequest) -> Result<Value> {
        let callback = self.next_callback();
        let mut query = request.query_pairs()?;
        query.push(("callback", callback.clone()));

        let response = self
            .http_client
            .get(endpoint)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        debug!(action = request.action(), bytes = body.len(), "Bridge reply");
        unwrap_callback(&body, &callback)
    }
}

/// Strip `callback( ... );` and parse the JSON inside. Plain JSON bodies are
/// accepted as-is.
pub(crate) fn unwrap_callback(body: &str, callback: &str) -> Result<Value> {
    let body = body.trim().trim_end_matches(';').trim_end();

    let json = match body.strip_prefix(callback) {
        Some(rest) => rest
            .trim_start()
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(|| Error::Remote {
                message: "Malformed callback reply".into(),
                details: Some(truncate(body)),
            })?,
        None if body.starts_with('{') || body.starts_with('[') => body,
        None => {
            return Err(Error::Remote {
                message: "Unexpected bridge reply".into(),
                details: Some(truncate(body)),
            })
        }
    };

    Ok(serde_json::from_str(json)?)
}

fn truncate(body: &str) -> String {
    if body.len() > 200 {
        let cut = (0..=200).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_callback() {
        let value = unwrap_callback(r#"cb_1({"success":true,"id":"a"});"#, "cb_1").unwrap();
        assert_eq!(value["id"], "a");
    }

    #[test]
    fn test_unwrap_plain_json() {
        let value = unwrap_callback(r#"[{"id":"a"}]"#, "cb_1").unwrap();
        assert!(value.is_array());
    }

    #[test]
    fn test_unwrap_rejects_html() {
        let err = unwrap_callback("<html>Sign in</html>", "cb_1").unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
    }

    #[test]
    fn test_unwrap_rejects_unbalanced_wrapper() {
        assert!(unwrap_callback(r#"cb_1({"a":1}"#, "cb_1").is_err());
    }

    #[test]
    fn test_callback_names_are_unique() {
        let transport = HttpTransport::new();
        assert_ne!(transport.next_callback(), transport.next_callback());
    }
}
