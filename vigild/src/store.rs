//! Read-only access to the session list.
//!
//! The session manager owns the sessions; the daemon only reads them.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};
use vigil_common::{BackendKind, ErrorCode, Session, SessionId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read sessions from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse sessions in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("session not found: {0}")]
    NotFound(SessionId),
}

impl StoreError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::StoreReadFailed,
            Self::Parse { .. } => ErrorCode::StoreParseFailed,
            Self::NotFound(_) => ErrorCode::StoreSessionNotFound,
        }
    }
}

/// Source of sessions to evaluate.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All sessions, in a stable order.
    async fn list(&self) -> Result<Vec<Session>, StoreError>;

    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.list()
            .await?
            .into_iter()
            .find(|session| &session.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

/// Records stay raw JSON until each is parsed on its own, so one bad record
/// cannot hide the rest.
#[derive(Deserialize)]
#[serde(untagged)]
enum SessionFile {
    List(Vec<serde_json::Value>),
    Wrapped { sessions: Vec<serde_json::Value> },
}

/// Sessions from a JSON file, re-read on every call so edits by the session
/// manager show up on the next sweep.
///
/// The file holds either an array of sessions or `{"sessions": [...]}`. A
/// missing file means no sessions yet. Records that do not parse are logged
/// and skipped.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<Session>, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Session file does not exist yet");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let file: SessionFile =
            serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        let records = match file {
            SessionFile::List(records) | SessionFile::Wrapped { sessions: records } => records,
        };
        let mut sessions: Vec<Session> = records
            .into_iter()
            .filter_map(|record| self.parse_record(record))
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }
}

impl JsonFileStore {
    fn parse_record(&self, record: serde_json::Value) -> Option<Session> {
        let backend = record
            .get("backend")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let id = record
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        match serde_json::from_value::<Session>(record) {
            Ok(session) => {
                if session.backend == BackendKind::Unsupported {
                    warn!(
                        session_id = %session.id,
                        backend = backend.as_deref().unwrap_or("?"),
                        "Session uses a backend with no probe adapter"
                    );
                }
                Some(session)
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    session_id = id.as_deref().unwrap_or("?"),
                    code = %ErrorCode::StoreParseFailed.code_string(),
                    "Skipping unreadable session record: {}",
                    err
                );
                None
            }
        }
    }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: tokio::sync::RwLock<std::collections::BTreeMap<SessionId, Session>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new(sessions: impl IntoIterator<Item = Session>) -> Self {
        Self {
            sessions: tokio::sync::RwLock::new(
                sessions
                    .into_iter()
                    .map(|session| (session.id.clone(), session))
                    .collect(),
            ),
        }
    }

    pub async fn upsert(&self, session: Session) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    pub async fn remove(&self, id: &SessionId) -> Option<Session> {
        self.sessions.write().await.remove(id)
    }
}

#[cfg(test)]
#[async_trait]
impl SessionStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.sessions.read().await.values().cloned().collect())
    }

    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}
