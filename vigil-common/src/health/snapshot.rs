//! Raw backend observations as reported by probe adapters.
//!
//! A snapshot is a faithful, backend-specific record of what the backend
//! said. "Not found" is a legitimate snapshot value; only transport failures
//! are [`ProbeError`]s.

use crate::errors::ErrorCode;
use crate::types::BackendKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Container status from `docker inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContainerSnapshot {
    Running,
    Restarting,
    /// `created` or `exited`.
    Stopped,
    NotFound,
    /// `removing` or `dead`: the container is going away with nothing to restart.
    Vanished,
    Unrecognized { state: String },
}

impl ContainerSnapshot {
    /// Map a Docker `State.Status` string.
    pub fn from_docker_status(status: &str) -> Self {
        match status {
            "running" => Self::Running,
            "restarting" => Self::Restarting,
            "created" | "exited" => Self::Stopped,
            "removing" | "dead" => Self::Vanished,
            other => Self::Unrecognized {
                state: other.to_string(),
            },
        }
    }
}

/// Pod phase from `kubectl get pod`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PodPhase {
    Running { ready: bool },
    Pending,
    CrashLoopBackOff,
    Succeeded,
    Failed { message: String },
    Unknown { message: String },
    NotFound,
    /// Phase string this build does not know.
    Unrecognized { raw: String },
}

/// Persistent volume claim backing a pod session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VolumeStatus {
    Present { name: String },
    Deleted { name: String },
}

/// Pod plus its persistent volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub pod: PodPhase,
    pub volume: VolumeStatus,
}

/// Session state from `zellij list-sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MultiplexerSnapshot {
    Running,
    /// Listed as exited; zellij can resurrect it.
    Exited,
    NotFound,
    Unrecognized { line: String },
}

/// VM status from the provider API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VmSnapshot {
    Active,
    Hibernated,
    Stopped,
    Error { message: String },
    NotFound,
    Unrecognized { raw: String },
}

impl VmSnapshot {
    /// Map a provider status string.
    pub fn from_provider_status(status: &str, message: Option<&str>) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "running" | "warm" | "active" => Self::Active,
            "cold" | "hibernated" | "sleeping" => Self::Hibernated,
            "stopped" => Self::Stopped,
            "error" | "failed" => Self::Error {
                message: message.unwrap_or("provider reported an error").to_string(),
            },
            _ => Self::Unrecognized {
                raw: status.to_string(),
            },
        }
    }
}

/// Backend-specific snapshot, tagged with the backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", content = "snapshot", rename_all = "snake_case")]
pub enum RawSnapshot {
    Container(ContainerSnapshot),
    Pod(PodSnapshot),
    Multiplexer(MultiplexerSnapshot),
    Vm(VmSnapshot),
}

impl RawSnapshot {
    /// Backend that produced this snapshot.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Container(_) => BackendKind::Container,
            Self::Pod(_) => BackendKind::Pod,
            Self::Multiplexer(_) => BackendKind::Multiplexer,
            Self::Vm(_) => BackendKind::Vm,
        }
    }
}

/// Transport-level probe failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to run {program}: {message}")]
    Spawn { program: String, message: String },
    #[error("{program} exited with {}: {stderr}", exit_label(.status))]
    CommandFailed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("provider rejected credentials (HTTP {status})")]
    Auth { status: u16 },
    #[error("provider request failed: {0}")]
    Http(String),
    #[error("malformed backend output: {0}")]
    Malformed(String),
    #[error("no probe adapter registered for {0} backend")]
    NoAdapter(BackendKind),
    #[error("session has no backend resource id")]
    MissingBackendId,
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}

impl ProbeError {
    /// Catalog code for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::ProbeTimeout,
            Self::Spawn { .. } => ErrorCode::ProbeSpawnFailed,
            Self::CommandFailed { .. } | Self::MissingBackendId => ErrorCode::ProbeCommandFailed,
            Self::Auth { .. } => ErrorCode::ProbeAuthFailed,
            Self::Http(_) => ErrorCode::ProbeHttpFailed,
            Self::Malformed(_) => ErrorCode::ProbeMalformedOutput,
            Self::NoAdapter(_) => ErrorCode::ProbeNoAdapter,
        }
    }
}
