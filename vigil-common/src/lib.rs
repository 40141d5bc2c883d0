//! Shared types and decision engines for Vigil.
//!
//! The engines here are synchronous and keep no state. Probing live backends,
//! caching and polling live in `vigild`; this crate turns observations into
//! health reports and pull-request metadata into workflow stages.

pub mod config;
pub mod errors;
pub mod health;
pub mod testing;
pub mod types;
pub mod workflow;

pub use config::{ConfigError, DaemonConfig};
pub use errors::{ErrorCategory, ErrorCode, ErrorEntry};
pub use health::{
    ActionPlan, AvailableAction, BackendCapabilities, ClassificationError, HealthSweep,
    Observation, PolicyMiss, ProbeError, RawSnapshot, ResourceState, SessionContext,
    SessionHealthReport, SweepSummary, WorktreePresence, classify, evaluate_observation,
    evaluation_failed, is_data_safe,
};
pub use types::{BackendKind, CheckStatus, ReviewDecision, Session, SessionId, SessionStatus};
pub use workflow::{BlockerKind, WorkflowClassification, WorkflowStage, classify_workflow};
