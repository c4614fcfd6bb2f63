//! Test utilities for gastos-core
//!
//! This module provides a mock spreadsheet bridge server that speaks the
//! callback-wrapped GET protocol over an in-memory [`Spreadsheet`], for
//! development and integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::bridge::{BridgeErrorBody, BridgeRequest};
use crate::sheet::Spreadsheet;

#[derive(Clone)]
struct ServerState {
    sheet: Arc<Spreadsheet>,
    requests: Arc<AtomicUsize>,
}

/// Mock spreadsheet bridge for testing and development
pub struct MockBridgeServer {
    addr: SocketAddr,
    sheet: Arc<Spreadsheet>,
    requests: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockBridgeServer {
    /// Start the mock server on an available port with an empty spreadsheet
    pub async fn start() -> Self {
        Self::with_sheet(Arc::new(Spreadsheet::new())).await
    }

    /// Start the mock server over an existing spreadsheet
    pub async fn with_sheet(sheet: Arc<Spreadsheet>) -> Self {
        let requests = Arc::new(AtomicUsize::new(0));
        let state = ServerState {
            sheet: sheet.clone(),
            requests: requests.clone(),
        };
        let app = Router::new()
            .route("/exec", get(handle_exec))
            .route("/broken", get(handle_broken))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            sheet,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Bridge endpoint URL
    pub fn url(&self) -> String {
        format!("http://{}/exec", self.addr)
    }

    /// Endpoint that answers every request with an HTML error page
    pub fn broken_url(&self) -> String {
        format!("http://{}/broken", self.addr)
    }

    /// The spreadsheet behind the server
    pub fn sheet(&self) -> &Spreadsheet {
        &self.sheet
    }

    /// Requests answered so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockBridgeServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The bridge's single entry point: `?action=...&callback=...`
async fn handle_exec(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let reply = match BridgeRequest::from_query(&params) {
        Ok(request) => state.sheet.handle(&request),
        Err(e) => serde_json::to_value(BridgeErrorBody::from(&e)).unwrap_or(Value::Null),
    };

    let body = match params.get("callback") {
        Some(callback) => format!("{}({})", callback, reply),
        None => reply.to_string(),
    };
    ([(header::CONTENT_TYPE, "application/javascript")], body).into_response()
}

/// Mimics a bridge deployment that lost its permissions
async fn handle_broken() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html")],
        "<!DOCTYPE html><html><body>Sorry, unable to open the file at this time.</body></html>",
    )
        .into_response()
}
