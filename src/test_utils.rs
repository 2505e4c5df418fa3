//! In-process stand-in for the backends, used by the async tests.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use dashmap::DashMap;
use serde_json::Value;
use tokio::net::TcpListener;
use url::Url;

#[derive(Clone, Debug)]
struct Canned {
    status: StatusCode,
    content_type: String,
    body: Vec<u8>,
}

/// One request the mock received
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub method: Method,
    pub query: Option<String>,
    pub body: Value,
}

#[derive(Default)]
struct MockState {
    // path -> queued replies; the last one keeps answering
    replies: DashMap<String, VecDeque<Canned>>,
    calls: DashMap<String, Vec<RecordedCall>>,
}

/// Axum server on an ephemeral localhost port with canned replies per path.
///
/// Paths without a canned reply answer `404`.
#[derive(Clone)]
pub struct MockBackend {
    base: Url,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .fallback(answer)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: Url::parse(&format!("http://{}", addr)).unwrap(),
            state,
        }
    }

    pub fn base_url(&self) -> Url {
        self.base.clone()
    }

    /// Queue a JSON reply for `path`.
    pub fn respond(self, path: &str, status: StatusCode, body: Value) -> Self {
        self.respond_raw(path, status, "application/json", body.to_string().into_bytes())
    }

    /// Queue a plain-text reply for `path`.
    pub fn respond_text(self, path: &str, status: StatusCode, body: &str) -> Self {
        self.respond_raw(path, status, "text/plain; charset=utf-8", body.as_bytes().to_vec())
    }

    /// Queue a reply with an arbitrary content type and body bytes.
    pub fn respond_raw(self, path: &str, status: StatusCode, content_type: &str, body: Vec<u8>) -> Self {
        self.state
            .replies
            .entry(path.to_string())
            .or_default()
            .push_back(Canned {
                status,
                content_type: content_type.to_string(),
                body,
            });
        self
    }

    /// Request bodies received on `path`, oldest first.
    pub fn calls(&self, path: &str) -> Vec<Value> {
        self.recorded(path).into_iter().map(|c| c.body).collect()
    }

    pub fn recorded(&self, path: &str) -> Vec<RecordedCall> {
        self.state
            .calls
            .get(path)
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.state.calls.get(path).map(|c| c.len()).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.calls.iter().map(|entry| entry.value().len()).sum()
    }
}

async fn answer(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let parsed = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };

    state.calls.entry(path.clone()).or_default().push(RecordedCall {
        method,
        query: uri.query().map(str::to_string),
        body: parsed,
    });

    let canned = state.replies.get_mut(&path).and_then(|mut queue| {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    });

    match canned {
        Some(Canned {
            status,
            content_type,
            body,
        }) => (
            status,
            [(axum::http::header::CONTENT_TYPE, content_type)],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
