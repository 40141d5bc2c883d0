//! Scriptable adapter for tests.

use super::ProbeAdapter;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vigil_common::{BackendKind, ProbeError, RawSnapshot, Session};

#[derive(Debug, Clone)]
pub enum MockBehavior {
    Respond(Result<RawSnapshot, ProbeError>),
    /// Respond after a delay.
    Delay(Duration, Result<RawSnapshot, ProbeError>),
    /// Never respond.
    Hang,
    Panic,
}

pub struct MockAdapter {
    kind: BackendKind,
    default: MockBehavior,
    by_backend_id: Mutex<HashMap<String, MockBehavior>>,
    calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            default: MockBehavior::Respond(Err(ProbeError::Malformed(
                "mock has no scripted response".to_string(),
            ))),
            by_backend_id: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_default(mut self, response: Result<RawSnapshot, ProbeError>) -> Self {
        self.default = MockBehavior::Respond(response);
        self
    }

    pub fn with(self, backend_id: &str, behavior: MockBehavior) -> Self {
        self.by_backend_id
            .lock()
            .unwrap()
            .insert(backend_id.to_string(), behavior);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbeAdapter for MockAdapter {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn probe(&self, session: &Session) -> Result<RawSnapshot, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = session
            .backend_id
            .as_ref()
            .and_then(|id| self.by_backend_id.lock().unwrap().get(id).cloned())
            .unwrap_or_else(|| self.default.clone());

        match behavior {
            MockBehavior::Respond(response) => response,
            MockBehavior::Delay(delay, response) => {
                tokio::time::sleep(delay).await;
                response
            }
            MockBehavior::Hang => std::future::pending().await,
            MockBehavior::Panic => panic!("mock adapter panicked for {}", session.id),
        }
    }
}

/// Shares one mock between the registry and the test body.
#[async_trait]
impl ProbeAdapter for std::sync::Arc<MockAdapter> {
    fn kind(&self) -> BackendKind {
        self.as_ref().kind()
    }

    async fn probe(&self, session: &Session) -> Result<RawSnapshot, ProbeError> {
        self.as_ref().probe(session).await
    }
}
