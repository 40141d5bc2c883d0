//! Resource states and recovery actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Health state of a session's backing resource.
///
/// Derived fresh on every evaluation; nothing about previous states is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceState {
    /// Resource is running and usable.
    Healthy,
    /// Resource exists but is not running.
    Stopped,
    /// VM is suspended and can be woken.
    Hibernated,
    /// Resource is starting up or restarting.
    Pending,
    /// Resource does not exist; its data is held elsewhere.
    Missing,
    /// Backend reported an error, or the probe failed.
    Error { message: String },
    /// Pod keeps crashing and restarting.
    CrashLoop,
    /// Resource was removed outside of the session manager.
    DeletedExternally,
    /// Persistent storage is gone; work cannot be recovered.
    DataLost { reason: String },
    /// The session's local git worktree was deleted.
    WorktreeMissing,
}

impl ResourceState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Whether this state should be surfaced to the user.
    ///
    /// `Pending` is transient and does not count.
    pub fn needs_attention(&self) -> bool {
        !matches!(self, Self::Healthy | Self::Pending)
    }

    /// Stable snake_case label, matching the serialized `type` tag.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Stopped => "stopped",
            Self::Hibernated => "hibernated",
            Self::Pending => "pending",
            Self::Missing => "missing",
            Self::Error { .. } => "error",
            Self::CrashLoop => "crash_loop",
            Self::DeletedExternally => "deleted_externally",
            Self::DataLost { .. } => "data_lost",
            Self::WorktreeMissing => "worktree_missing",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error { message } => write!(f, "error: {message}"),
            Self::DataLost { reason } => write!(f, "data lost: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Recovery action that can be offered for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailableAction {
    /// Start a stopped resource.
    Start,
    /// Wake a hibernated VM.
    Wake,
    /// Recreate the resource, keeping data that lives outside it.
    Recreate,
    /// Recreate from scratch; nothing is carried over.
    RecreateFresh,
    /// Recreate with the latest image, keeping data.
    UpdateImage,
    /// Remove the session and whatever is left of its resources.
    Cleanup,
}

impl AvailableAction {
    /// Actions that may discard work and require a warning when data is not safe.
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::Recreate | Self::RecreateFresh | Self::Cleanup)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Wake => "wake",
            Self::Recreate => "recreate",
            Self::RecreateFresh => "recreate_fresh",
            Self::UpdateImage => "update_image",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for AvailableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
