//! Resource health reconciliation.
//!
//! Probe adapters (in `vigild`) produce a [`RawSnapshot`]; this module turns
//! it into a [`SessionHealthReport`]:
//!
//! 1. [`classify`] maps the snapshot to a [`ResourceState`].
//! 2. [`is_data_safe`] decides whether destructive recovery keeps the user's work.
//! 3. [`policy::plan`] looks up the recovery actions and filters them by what
//!    the backend can do.
//! 4. [`evaluate_observation`] assembles the report.

mod classify;
pub mod policy;
mod report;
mod safety;
mod snapshot;
mod state;

pub use classify::{ClassificationError, SessionContext, WorktreePresence, classify};
pub use policy::{ActionPlan, BackendCapabilities, PolicyMiss};
pub use report::{
    HealthSweep, Observation, SessionHealthReport, SweepSummary, evaluate_observation,
    evaluation_failed,
};
pub use safety::is_data_safe;
pub use snapshot::{
    ContainerSnapshot, MultiplexerSnapshot, PodPhase, PodSnapshot, ProbeError, RawSnapshot,
    VmSnapshot, VolumeStatus,
};
pub use state::{AvailableAction, ResourceState};
