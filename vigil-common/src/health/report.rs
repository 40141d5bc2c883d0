//! Health report assembly.
//!
//! [`evaluate_observation`] is the pure half of the aggregator: given what was
//! observed about a session it classifies, evaluates safety, consults the
//! policy table and builds the report. It holds no state, so calling it twice
//! with the same inputs yields the same report.

use super::classify::{SessionContext, WorktreePresence, classify};
use super::policy::{self, BackendCapabilities};
use super::safety::is_data_safe;
use super::snapshot::{ProbeError, RawSnapshot};
use super::state::{AvailableAction, ResourceState};
use crate::errors::ErrorCode;
use crate::types::{BackendKind, Session, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health of one session plus the recovery actions that are safe to offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHealthReport {
    pub session_id: SessionId,
    pub session_name: String,
    pub backend: BackendKind,
    pub state: ResourceState,
    /// Ordered by preference.
    pub available_actions: Vec<AvailableAction>,
    pub recommended_action: Option<AvailableAction>,
    /// Short human-readable summary. Never empty.
    pub description: String,
    pub details: Option<String>,
    /// `false` means destructive actions need a warning before they run.
    pub data_safe: bool,
}

impl SessionHealthReport {
    /// Nothing can be offered and the data is at risk.
    pub fn is_blocked(&self) -> bool {
        self.available_actions.is_empty() && !self.data_safe
    }

    pub fn needs_attention(&self) -> bool {
        self.state.needs_attention()
    }

    /// Whether running `action` must be preceded by a data-loss warning.
    pub fn requires_destructive_warning(&self, action: AvailableAction) -> bool {
        !self.data_safe && action.is_destructive()
    }

    /// Why `Recreate` is refused for this session, if it is.
    pub fn recreate_blocked_reason(&self) -> Option<String> {
        if self.available_actions.contains(&AvailableAction::Recreate) {
            return None;
        }
        if self.is_blocked() {
            return Some(self.description.clone());
        }
        Some(match &self.state {
            ResourceState::Pending => "The resource is still starting; wait for it to settle.".to_string(),
            ResourceState::DataLost { .. } => {
                "The session's storage is gone; only a fresh recreate is possible.".to_string()
            }
            ResourceState::WorktreeMissing => {
                "The worktree was deleted; the session can only be cleaned up.".to_string()
            }
            other => format!("Recreate is not offered while the resource is {}.", other.label()),
        })
    }
}

/// What was learned about a session before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The backend was probed.
    Probed {
        worktree: WorktreePresence,
        snapshot: Result<RawSnapshot, ProbeError>,
    },
    /// The local worktree is gone; the backend was not probed.
    WorktreeMissing,
    /// The session never got a backend resource.
    NoBackendResource,
    /// The session is archived and has no live resources.
    Archived,
}

impl Observation {
    pub fn probed(worktree: WorktreePresence, snapshot: Result<RawSnapshot, ProbeError>) -> Self {
        Self::Probed { worktree, snapshot }
    }
}

/// Build the report for a session from an observation.
///
/// # Panics
///
/// Panics if the policy table has no entry for the derived state. The
/// classifier and safety evaluator never produce such a combination, so a
/// panic here is a bug in this crate.
pub fn evaluate_observation(session: &Session, observation: Observation) -> SessionHealthReport {
    let (state, description, details) = match observation {
        Observation::Archived => (
            ResourceState::Healthy,
            "Session is archived.".to_string(),
            None,
        ),
        Observation::WorktreeMissing => worktree_missing(session),
        Observation::NoBackendResource => (
            ResourceState::Missing,
            "The backend resource is missing.".to_string(),
            Some("No backend resource created yet.".to_string()),
        ),
        Observation::Probed {
            worktree: WorktreePresence::Missing,
            ..
        } => worktree_missing(session),
        Observation::Probed {
            worktree: _,
            snapshot: Err(err),
        } => probe_failed(&err),
        Observation::Probed {
            worktree,
            snapshot: Ok(snapshot),
        } => match classify(session.backend, &snapshot, &SessionContext::new(worktree)) {
            Ok(state) => describe(session, state),
            Err(err) => (
                ResourceState::Error {
                    message: err.to_string(),
                },
                "The backend reported a state that could not be classified.".to_string(),
                Some(with_code(err.error_code(), &err.to_string())),
            ),
        },
    };

    assemble(session, state, description, details)
}

/// Degraded report for a session whose evaluation itself failed.
///
/// Safety is still computed by the normal rule for an `Error` state.
pub fn evaluation_failed(session: &Session, code: ErrorCode, message: &str) -> SessionHealthReport {
    assemble(
        session,
        ResourceState::Error {
            message: message.to_string(),
        },
        "Could not determine backend status.".to_string(),
        Some(with_code(code, message)),
    )
}

fn assemble(
    session: &Session,
    state: ResourceState,
    description: String,
    details: Option<String>,
) -> SessionHealthReport {
    let data_safe = is_data_safe(session.backend, &state, session.destroy_on_stop);
    let plan = match policy::plan(session.backend, &state, data_safe) {
        Ok(plan) => plan,
        Err(miss) => panic!("[{}] {miss}", miss.error_code().code_string()),
    };

    let details = if !data_safe && session.uncommitted_changes {
        let note = "The worktree had uncommitted changes that may not be recoverable.";
        Some(match details {
            Some(details) => format!("{details}\n\n{note}"),
            None => note.to_string(),
        })
    } else {
        details
    };

    SessionHealthReport {
        session_id: session.id.clone(),
        session_name: session.name.clone(),
        backend: session.backend,
        state,
        available_actions: plan.actions,
        recommended_action: plan.recommended,
        description,
        details,
        data_safe,
    }
}

fn worktree_missing(session: &Session) -> (ResourceState, String, Option<String>) {
    (
        ResourceState::WorktreeMissing,
        "The git worktree was deleted.".to_string(),
        Some(format!(
            "The worktree at {} no longer exists. The session should be cleaned up.",
            session.worktree_path.display()
        )),
    )
}

fn probe_failed(err: &ProbeError) -> (ResourceState, String, Option<String>) {
    (
        ResourceState::Error {
            message: err.to_string(),
        },
        "Could not determine backend status.".to_string(),
        Some(with_code(err.error_code(), &err.to_string())),
    )
}

fn with_code(code: ErrorCode, message: &str) -> String {
    format!("[{}] {}: {message}", code.code_string(), code.message())
}

fn describe(session: &Session, state: ResourceState) -> (ResourceState, String, Option<String>) {
    let preservation = BackendCapabilities::of(session.backend).data_preservation_description;
    let vm_storage_gone = session.backend == BackendKind::Vm && session.destroy_on_stop;

    let (description, details) = match &state {
        ResourceState::Healthy => (
            "Session is running normally.".to_string(),
            Some(preservation.to_string()),
        ),
        ResourceState::Stopped if vm_storage_gone => (
            "The VM is stopped and its storage was destroyed with it.".to_string(),
            Some(
                "This session destroys its disk on stop. Recovery actions are withheld \
                 until the session's data has been reviewed."
                    .to_string(),
            ),
        ),
        ResourceState::Stopped => (
            "The resource is stopped.".to_string(),
            Some(format!(
                "{preservation}\n\nYou can start it again or recreate it."
            )),
        ),
        ResourceState::Hibernated => (
            "The VM is hibernated.".to_string(),
            Some("Waking will restore the VM to its previous state.".to_string()),
        ),
        ResourceState::Pending => (
            "The resource is starting up.".to_string(),
            Some("Please wait for the resource to become ready.".to_string()),
        ),
        ResourceState::Missing => (
            "The backend resource is missing.".to_string(),
            Some(format!(
                "{preservation}\n\nThe resource was deleted but your data is preserved."
            )),
        ),
        ResourceState::Error { message } if vm_storage_gone => (
            format!("The resource is in an error state: {message}"),
            Some(
                "This session destroys its disk on stop, so recreating it would \
                 discard the session's work. Recovery actions are withheld."
                    .to_string(),
            ),
        ),
        ResourceState::Error { message } => (
            format!("The resource is in an error state: {message}"),
            Some(preservation.to_string()),
        ),
        ResourceState::CrashLoop => (
            "The pod is in a crash loop.".to_string(),
            Some(format!(
                "{preservation}\n\nThe container keeps crashing and restarting. \
                 Recreation may fix the issue."
            )),
        ),
        ResourceState::DeletedExternally => (
            "The resource was deleted externally.".to_string(),
            Some("The backend resource was removed outside of the session manager.".to_string()),
        ),
        ResourceState::DataLost { reason } => (
            "The session's persistent storage was lost.".to_string(),
            Some(format!(
                "{reason}. Any uncommitted work is gone; clean up the session or \
                 recreate it from scratch."
            )),
        ),
        ResourceState::WorktreeMissing => return worktree_missing(session),
    };

    (state, description, details)
}

/// Result of one sweep across all sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSweep {
    pub reports: BTreeMap<SessionId, SessionHealthReport>,
    /// Sessions whose previous probe was still in flight. Their entry in
    /// `reports`, if any, is the last known report.
    #[serde(default)]
    pub coalesced: Vec<SessionId>,
}

impl HealthSweep {
    pub fn healthy_count(&self) -> usize {
        self.reports.values().filter(|r| r.state.is_healthy()).count()
    }

    pub fn needs_attention_count(&self) -> usize {
        self.reports.values().filter(|r| r.needs_attention()).count()
    }

    pub fn blocked_count(&self) -> usize {
        self.reports.values().filter(|r| r.is_blocked()).count()
    }

    pub fn needing_attention(&self) -> Vec<&SessionHealthReport> {
        self.reports.values().filter(|r| r.needs_attention()).collect()
    }

    pub fn summary(&self) -> SweepSummary {
        SweepSummary {
            total: self.reports.len(),
            healthy: self.healthy_count(),
            needs_attention: self.needs_attention_count(),
            blocked: self.blocked_count(),
            coalesced: self.coalesced.len(),
        }
    }
}

/// Counts for a sweep, used in events and API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub total: usize,
    pub healthy: usize,
    pub needs_attention: usize,
    pub blocked: usize,
    pub coalesced: usize,
}
