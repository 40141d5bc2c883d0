//! Action policy: which recovery actions to offer for a state.
//!
//! This table is the only place that decides actions. Callers query it and
//! never re-derive the rules from backend or state themselves.

use super::state::{AvailableAction, ResourceState};
use crate::errors::ErrorCode;
use crate::types::BackendKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use AvailableAction::{Cleanup, Recreate, RecreateFresh, Start, UpdateImage, Wake};

/// Ordered actions plus the one to suggest by default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionPlan {
    pub actions: Vec<AvailableAction>,
    pub recommended: Option<AvailableAction>,
}

impl ActionPlan {
    fn new(actions: &[AvailableAction], recommended: Option<AvailableAction>) -> Self {
        Self {
            actions: actions.to_vec(),
            recommended,
        }
    }

    /// No action can be offered.
    pub fn blocked() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// A state/safety combination the policy table has no entry for.
///
/// Always a programming error: the classifier and safety evaluator should
/// never produce it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no recovery policy for {state} on {kind} backend (data_safe={data_safe})")]
pub struct PolicyMiss {
    pub kind: BackendKind,
    pub state: &'static str,
    pub data_safe: bool,
}

impl PolicyMiss {
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::InternalPolicyMiss
    }
}

/// Look up the base table entry for a state.
pub fn lookup(
    kind: BackendKind,
    state: &ResourceState,
    data_safe: bool,
) -> Result<ActionPlan, PolicyMiss> {
    let plan = match (state, data_safe) {
        (ResourceState::Healthy, true) => ActionPlan::new(&[UpdateImage, Recreate], None),
        (ResourceState::Stopped, true) => ActionPlan::new(&[Start, Recreate], Some(Start)),
        (ResourceState::Stopped, false) => ActionPlan::blocked(),
        (ResourceState::Hibernated, _) => ActionPlan::new(&[Wake, Recreate], Some(Wake)),
        (ResourceState::Pending, _) => ActionPlan::blocked(),
        (ResourceState::Missing, true) => ActionPlan::new(&[Recreate], Some(Recreate)),
        (ResourceState::Error { .. }, false) => ActionPlan::blocked(),
        (ResourceState::Error { .. }, true) => ActionPlan::new(&[Recreate], Some(Recreate)),
        (ResourceState::CrashLoop, true) if kind == BackendKind::Pod => {
            ActionPlan::new(&[Recreate], Some(Recreate))
        }
        (ResourceState::DeletedExternally, true) => ActionPlan::new(&[Recreate], Some(Recreate)),
        (ResourceState::DataLost { .. }, false) => ActionPlan::new(&[Cleanup, RecreateFresh], None),
        (ResourceState::WorktreeMissing, false) => ActionPlan::new(&[Cleanup], None),
        _ => {
            return Err(PolicyMiss {
                kind,
                state: state.label(),
                data_safe,
            });
        }
    };
    Ok(plan)
}

/// Look up a state and drop actions the backend cannot perform.
pub fn plan(
    kind: BackendKind,
    state: &ResourceState,
    data_safe: bool,
) -> Result<ActionPlan, PolicyMiss> {
    lookup(kind, state, data_safe).map(|plan| BackendCapabilities::of(kind).filter(plan))
}

/// What a backend can physically do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub can_start: bool,
    pub can_wake: bool,
    pub can_update_image: bool,
    /// Where the session's work lives when the resource is replaced.
    pub data_preservation_description: &'static str,
}

impl BackendCapabilities {
    pub const fn of(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Container => Self {
                can_start: true,
                can_wake: false,
                can_update_image: true,
                data_preservation_description: "Your code is safe (bind-mounted from the host worktree). Only container-local files will be lost.",
            },
            BackendKind::Pod => Self {
                can_start: false,
                can_wake: false,
                can_update_image: true,
                data_preservation_description: "Your code is safe (stored in persistent volume). Only pod-local files will be lost.",
            },
            BackendKind::Multiplexer => Self {
                can_start: true,
                can_wake: false,
                can_update_image: false,
                data_preservation_description: "Your code is safe (the worktree lives on this machine). Only the terminal layout will be lost.",
            },
            BackendKind::Vm => Self {
                can_start: true,
                can_wake: true,
                can_update_image: false,
                data_preservation_description: "Your code lives on the VM disk. Recreating replaces the VM and its disk.",
            },
            BackendKind::Unsupported => Self {
                can_start: false,
                can_wake: false,
                can_update_image: false,
                data_preservation_description: "Vigil cannot tell where this backend keeps the session's work.",
            },
        }
    }

    pub const fn supports(&self, action: AvailableAction) -> bool {
        match action {
            Start => self.can_start,
            Wake => self.can_wake,
            UpdateImage => self.can_update_image,
            Recreate | RecreateFresh | Cleanup => true,
        }
    }

    /// Remove unsupported actions. A filtered-out recommendation falls back to
    /// the first remaining action.
    pub fn filter(&self, plan: ActionPlan) -> ActionPlan {
        let actions: Vec<_> = plan
            .actions
            .into_iter()
            .filter(|action| self.supports(*action))
            .collect();
        let recommended = match plan.recommended {
            Some(action) if actions.contains(&action) => Some(action),
            Some(_) => actions.first().copied(),
            None => None,
        };
        ActionPlan {
            actions,
            recommended,
        }
    }
}
