//! Transport seam for the REST backend.
//!
//! `ApiClient` talks to a `dyn Backend`; production uses `HttpBackend`
//! (reqwest), tests use `RecordingBackend` to capture calls and script
//! responses per endpoint.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use pushapp_core::{SdkError, SdkResult};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::debug;

pub type Headers = BTreeMap<String, String>;

#[async_trait]
pub trait Backend: Send + Sync {
    /// POST a JSON body. Returns the raw response body on a 2xx status.
    async fn post_json(&self, url: &str, headers: &Headers, body: &Value) -> SdkResult<String>;
}

/// reqwest-backed transport. One client is shared for connection pooling.
#[derive(Debug, Clone, Default)]
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn post_json(&self, url: &str, headers: &Headers, body: &Value) -> SdkResult<String> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| SdkError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SdkError::Transport(e.to_string()))?;

        debug!(url = %url, status = status.as_u16(), "Backend response");

        if status.is_success() {
            Ok(text)
        } else {
            Err(SdkError::Http {
                status: status.as_u16(),
                body: text,
            })
        }
    }
}

/// A captured backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub url: String,
    pub headers: Headers,
    pub body: Value,
}

impl RecordedCall {
    pub fn path_ends_with(&self, suffix: &str) -> bool {
        self.url.ends_with(suffix)
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Body(String),
    Status(u16),
}

/// In-memory backend that records calls; for tests and offline hosts.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<RecordedCall>>,
    responses: DashMap<String, Scripted>,
    notify: Notify,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to any URL ending in `suffix` with `body`.
    pub fn respond(&self, suffix: &str, body: Value) {
        self.responses
            .insert(suffix.to_string(), Scripted::Body(body.to_string()));
    }

    pub fn respond_raw(&self, suffix: &str, body: &str) {
        self.responses
            .insert(suffix.to_string(), Scripted::Body(body.to_string()));
    }

    /// Reply to any URL ending in `suffix` with a non-2xx status.
    pub fn fail(&self, suffix: &str, status: u16) {
        self.responses
            .insert(suffix.to_string(), Scripted::Status(status));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, suffix: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.path_ends_with(suffix))
            .cloned()
            .collect()
    }

    pub fn count(&self, suffix: &str) -> usize {
        self.calls_to(suffix).len()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Wait until at least `n` calls to `suffix` were made. Returns false on timeout.
    pub async fn wait_for(&self, suffix: &str, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.count(suffix) >= n {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.count(suffix) >= n;
            }
        }
    }

    fn scripted_for(&self, url: &str) -> Option<Scripted> {
        self.responses
            .iter()
            .filter(|entry| url.ends_with(entry.key().as_str()))
            .max_by_key(|entry| entry.key().len())
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    async fn post_json(&self, url: &str, headers: &Headers, body: &Value) -> SdkResult<String> {
        self.calls.lock().push(RecordedCall {
            url: url.to_string(),
            headers: headers.clone(),
            body: body.clone(),
        });
        self.notify.notify_waiters();

        match self.scripted_for(url) {
            Some(Scripted::Body(body)) => Ok(body),
            Some(Scripted::Status(status)) => Err(SdkError::Http {
                status,
                body: String::new(),
            }),
            None => Ok("{}".to_string()),
        }
    }
}
