//! State classifier: raw backend snapshot to [`ResourceState`].

use super::snapshot::{
    ContainerSnapshot, MultiplexerSnapshot, PodPhase, PodSnapshot, RawSnapshot, VmSnapshot,
    VolumeStatus,
};
use super::state::ResourceState;
use crate::errors::ErrorCode;
use crate::types::BackendKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether the session's local worktree exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorktreePresence {
    Present,
    Missing,
    /// The backend keeps the code remotely; there is no local worktree to check.
    NotTracked,
}

impl WorktreePresence {
    /// Interpret a `try_exists` result for a backend with a local worktree.
    ///
    /// An unreadable path counts as present: only a confirmed absence is
    /// reported.
    pub fn from_exists(exists: std::io::Result<bool>) -> Self {
        match exists {
            Ok(false) => Self::Missing,
            Ok(true) | Err(_) => Self::Present,
        }
    }
}

/// Context the classifier needs beyond the snapshot itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContext {
    pub worktree: WorktreePresence,
}

impl SessionContext {
    pub fn new(worktree: WorktreePresence) -> Self {
        Self { worktree }
    }
}

/// A snapshot the classifier refuses to map.
///
/// Never defaulted to a healthy state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("unrecognized {backend} state '{state}'")]
    Unrecognized { backend: BackendKind, state: String },
    #[error("{expected} session received a {actual} snapshot")]
    BackendMismatch {
        expected: BackendKind,
        actual: BackendKind,
    },
}

impl ClassificationError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Unrecognized { .. } => ErrorCode::ClassifyUnrecognizedState,
            Self::BackendMismatch { .. } => ErrorCode::ClassifyBackendMismatch,
        }
    }
}

/// Classify a snapshot for a session on `kind`.
///
/// A missing local worktree takes precedence over everything the backend says.
pub fn classify(
    kind: BackendKind,
    snapshot: &RawSnapshot,
    ctx: &SessionContext,
) -> Result<ResourceState, ClassificationError> {
    if ctx.worktree == WorktreePresence::Missing {
        return Ok(ResourceState::WorktreeMissing);
    }
    if snapshot.kind() != kind {
        return Err(ClassificationError::BackendMismatch {
            expected: kind,
            actual: snapshot.kind(),
        });
    }

    match snapshot {
        RawSnapshot::Container(container) => classify_container(container),
        RawSnapshot::Pod(pod) => classify_pod(pod),
        RawSnapshot::Multiplexer(mux) => classify_multiplexer(mux),
        RawSnapshot::Vm(vm) => classify_vm(vm),
    }
}

fn classify_container(snapshot: &ContainerSnapshot) -> Result<ResourceState, ClassificationError> {
    Ok(match snapshot {
        ContainerSnapshot::Running => ResourceState::Healthy,
        ContainerSnapshot::Restarting => ResourceState::Pending,
        ContainerSnapshot::Stopped => ResourceState::Stopped,
        ContainerSnapshot::NotFound => ResourceState::Missing,
        ContainerSnapshot::Vanished => ResourceState::DeletedExternally,
        ContainerSnapshot::Unrecognized { state } => {
            return Err(unrecognized(BackendKind::Container, state));
        }
    })
}

fn classify_pod(snapshot: &PodSnapshot) -> Result<ResourceState, ClassificationError> {
    if let VolumeStatus::Deleted { name } = &snapshot.volume {
        return Ok(ResourceState::DataLost {
            reason: format!("persistent volume claim '{name}' was deleted"),
        });
    }

    Ok(match &snapshot.pod {
        PodPhase::Running { ready: true } => ResourceState::Healthy,
        PodPhase::Running { ready: false } | PodPhase::Pending => ResourceState::Pending,
        PodPhase::CrashLoopBackOff => ResourceState::CrashLoop,
        PodPhase::Succeeded => ResourceState::Stopped,
        PodPhase::Failed { message } | PodPhase::Unknown { message } => ResourceState::Error {
            message: message.clone(),
        },
        PodPhase::NotFound => ResourceState::Missing,
        PodPhase::Unrecognized { raw } => return Err(unrecognized(BackendKind::Pod, raw)),
    })
}

fn classify_multiplexer(
    snapshot: &MultiplexerSnapshot,
) -> Result<ResourceState, ClassificationError> {
    Ok(match snapshot {
        MultiplexerSnapshot::Running => ResourceState::Healthy,
        MultiplexerSnapshot::Exited => ResourceState::Stopped,
        MultiplexerSnapshot::NotFound => ResourceState::Missing,
        MultiplexerSnapshot::Unrecognized { line } => {
            return Err(unrecognized(BackendKind::Multiplexer, line));
        }
    })
}

fn classify_vm(snapshot: &VmSnapshot) -> Result<ResourceState, ClassificationError> {
    Ok(match snapshot {
        VmSnapshot::Active => ResourceState::Healthy,
        VmSnapshot::Hibernated => ResourceState::Hibernated,
        VmSnapshot::Stopped => ResourceState::Stopped,
        VmSnapshot::Error { message } => ResourceState::Error {
            message: message.clone(),
        },
        VmSnapshot::NotFound => ResourceState::DeletedExternally,
        VmSnapshot::Unrecognized { raw } => return Err(unrecognized(BackendKind::Vm, raw)),
    })
}

fn unrecognized(backend: BackendKind, state: &str) -> ClassificationError {
    ClassificationError::Unrecognized {
        backend,
        state: state.to_string(),
    }
}
