//! Common types used across Vigil components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution substrate hosting a session's workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Container with the worktree bind-mounted from the host (Docker).
    #[serde(alias = "docker")]
    Container,
    /// Orchestrated pod backed by a persistent volume claim (Kubernetes).
    #[serde(alias = "kubernetes")]
    Pod,
    /// Local terminal multiplexer session (Zellij).
    #[serde(alias = "zellij")]
    Multiplexer,
    /// Remote VM that can hibernate (Sprites).
    #[serde(alias = "sprites")]
    Vm,
    /// Any backend this build has no adapter for. Such sessions still get a
    /// report, degraded to an error.
    #[serde(other)]
    Unsupported,
}

impl BackendKind {
    /// Every backend Vigil can probe.
    pub const ALL: [BackendKind; 4] = [Self::Container, Self::Pod, Self::Multiplexer, Self::Vm];

    /// Whether sessions on this backend own a working tree on the local host.
    pub const fn tracks_local_worktree(self) -> bool {
        matches!(self, Self::Container | Self::Multiplexer)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Pod => "pod",
            Self::Multiplexer => "multiplexer",
            Self::Vm => "vm",
            Self::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Session lifecycle status, owned by the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is being created.
    Creating,
    /// Agent is actively working.
    Running,
    /// Agent is waiting for input.
    Idle,
    /// Work is done.
    Completed,
    /// Something went wrong during a lifecycle operation.
    Failed,
    /// User archived the session; it has no live resources.
    Archived,
    /// Session is being deleted.
    Deleting,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl SessionStatus {
    /// Sessions mid-creation or mid-deletion are skipped by sweeps.
    pub const fn is_transitioning(self) -> bool {
        matches!(self, Self::Creating | Self::Deleting)
    }
}

/// Pull-request check status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pending,
    Passing,
    Failing,
    Mergeable,
    Merged,
}

impl CheckStatus {
    /// Map a GitHub `statusCheckRollup` state to a check status.
    pub fn from_github_rollup(state: &str) -> Option<Self> {
        match state.to_ascii_uppercase().as_str() {
            "SUCCESS" => Some(Self::Passing),
            "FAILURE" | "ERROR" => Some(Self::Failing),
            "PENDING" | "EXPECTED" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// Pull-request review decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    ChangesRequested,
    ReviewRequired,
}

impl ReviewDecision {
    /// Map GitHub's `reviewDecision` field. GitHub reports `null` when no
    /// review is required; callers keep that as `None`.
    pub fn from_github(decision: &str) -> Option<Self> {
        match decision.to_ascii_uppercase().as_str() {
            "APPROVED" => Some(Self::Approved),
            "CHANGES_REQUESTED" => Some(Self::ChangesRequested),
            "REVIEW_REQUIRED" => Some(Self::ReviewRequired),
            _ => None,
        }
    }
}

/// A development session as recorded by the session manager.
///
/// Vigil treats sessions as read-only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// Human-friendly name.
    pub name: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: SessionStatus,
    /// Execution backend.
    pub backend: BackendKind,
    /// Backend-specific resource identifier (container name, pod name, ...).
    #[serde(default)]
    pub backend_id: Option<String>,
    /// Local git worktree owned by the session.
    pub worktree_path: PathBuf,
    /// Persistent volume claim backing a pod session.
    #[serde(default)]
    pub volume_name: Option<String>,
    /// Stopping the backing resource also destroys its storage.
    #[serde(default, alias = "auto_destroy")]
    pub destroy_on_stop: bool,
    /// URL of the associated pull request.
    #[serde(default)]
    pub pr_url: Option<String>,
    /// Status of pull-request checks.
    #[serde(default)]
    pub pr_check_status: Option<CheckStatus>,
    /// Pull-request review decision.
    #[serde(default)]
    pub pr_review_decision: Option<ReviewDecision>,
    /// Branch conflicts with the base branch.
    #[serde(default)]
    pub merge_conflict: bool,
    /// Worktree has uncommitted changes.
    #[serde(default, alias = "worktree_dirty")]
    pub uncommitted_changes: bool,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a running session with no pull request attached.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        backend: BackendKind,
        worktree_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: SessionId::new(id),
            name: name.into(),
            status: SessionStatus::Running,
            backend,
            backend_id: None,
            worktree_path: worktree_path.into(),
            volume_name: None,
            destroy_on_stop: false,
            pr_url: None,
            pr_check_status: None,
            pr_review_decision: None,
            merge_conflict: false,
            uncommitted_changes: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_backend_id(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = Some(backend_id.into());
        self
    }

    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_destroy_on_stop(mut self, destroy_on_stop: bool) -> Self {
        self.destroy_on_stop = destroy_on_stop;
        self
    }

    /// Name of the persistent volume claim for pod sessions.
    ///
    /// Falls back to `<backend_id>-workspace` when the session record does not
    /// name one explicitly.
    pub fn volume_claim(&self) -> Option<String> {
        self.volume_name
            .clone()
            .or_else(|| self.backend_id.as_ref().map(|id| format!("{id}-workspace")))
    }
}
