//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use specline_common::event::RunEvent;
use specline_engine::{Error, HttpRequest, HttpResponse, Result, Transport};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Scripted transport.
///
/// Answers by the first route whose fragment appears in the request URL and
/// records every request it sees. Tracks how many requests overlap.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<(String, Reply)>>,
    delay: Mutex<Option<Duration>>,
    cookies: Mutex<BTreeMap<String, String>>,
    calls: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Clone)]
pub enum Reply {
    Status(u16, String),
    Fail(String),
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, fragment: &str, status: u16, body: &str) -> &Self {
        self.routes
            .lock()
            .push((fragment.to_string(), Reply::Status(status, body.to_string())));
        self
    }

    pub fn fail(&self, fragment: &str, message: &str) -> &Self {
        self.routes
            .lock()
            .push((fragment.to_string(), Reply::Fail(message.to_string())));
        self
    }

    pub fn delay(&self, delay: Duration) -> &Self {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Cookie set on every response
    pub fn cookie(&self, name: &str, value: &str) -> &Self {
        self.cookies
            .lock()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.calls.lock().push(request.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .routes
            .lock()
            .iter()
            .find(|(fragment, _)| request.url.contains(fragment.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::Status(200, "{}".to_string()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Reply::Status(status, body) => Ok(HttpResponse {
                status,
                headers: BTreeMap::from([(
                    "content-type".to_string(),
                    "application/json".to_string(),
                )]),
                cookies: self.cookies.lock().clone(),
                body,
                duration_ms: 1,
            }),
            Reply::Fail(message) => Err(Error::Request(message)),
        }
    }
}

/// Write `yaml` to `dir/name` and return the path
pub fn write_suite(dir: &Path, name: &str, yaml: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, yaml).unwrap();
    path
}

/// Minimal suite with one GET spec per `(name, path)` pair
pub fn simple_suite(name: &str, specs: &[(&str, &str)]) -> String {
    let mut yaml = format!(
        "meta:\n  name: {name}\nconfiguration:\n  scheme: http\n  host: api.test\nspecs:\n"
    );
    for (spec, path) in specs {
        yaml.push_str(&format!(
            "  - name: {spec}\n    request:\n      method: get\n      path: {path}\n    response:\n      status_code: 200\n"
        ));
    }
    yaml
}

/// Drain a finished run's event stream
pub async fn collect(mut events: UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.recv().await {
        out.push(event);
    }
    out
}
