//! Shared test utilities for newrelic-telemetry integration tests.
//!
//! Provides an in-process ingest collector built on axum. It records every
//! request it receives, with gzip bodies decoded, and replies with scripted
//! responses before falling back to `202 Accepted`.

#![allow(dead_code)]

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A request captured by the collector.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub json: serde_json::Value,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Clone, Default)]
struct CollectorState {
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    script: Arc<Mutex<VecDeque<(u16, Vec<(&'static str, String)>)>>>,
}

/// An ingest collector listening on an ephemeral local port.
pub struct MockCollector {
    addr: SocketAddr,
    state: CollectorState,
    handle: JoinHandle<()>,
}

impl MockCollector {
    pub async fn start() -> Self {
        let state = CollectorState::default();
        let router = Router::new().fallback(ingest).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock collector");
        let addr = listener.local_addr().expect("Failed to read local address");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("Mock collector failed");
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Queues a reply for the next unanswered request.
    pub fn respond_with(&self, status: u16, headers: Vec<(&'static str, String)>) {
        self.state.script.lock().push_back((status, headers));
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.state.received.lock().clone()
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn ingest(
    State(state): State<CollectorState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut decoded = String::new();
    GzDecoder::new(&body[..])
        .read_to_string(&mut decoded)
        .expect("Request body is not gzip");
    let json = serde_json::from_str(&decoded).expect("Request body is not JSON");

    state.received.lock().push(ReceivedRequest {
        path: uri.path().to_string(),
        headers,
        json,
    });

    let (status, reply_headers) = state
        .script
        .lock()
        .pop_front()
        .unwrap_or((202, Vec::new()));

    let mut response = (
        StatusCode::from_u16(status).expect("Invalid scripted status"),
        r#"{"requestId":"mock"}"#,
    )
        .into_response();
    for (name, value) in reply_headers {
        response.headers_mut().insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(&value).expect("Invalid scripted header"),
        );
    }
    response
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
