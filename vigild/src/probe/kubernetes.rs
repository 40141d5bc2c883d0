//! Pod and volume-claim probing through `kubectl get -o json`.
//!
//! Lookups pass `--ignore-not-found`, so a missing resource is an empty
//! successful response. Every non-zero exit is a transport failure, including
//! errors that merely mention "not found" such as an unknown context.

use super::command;
use super::{ProbeAdapter, backend_id};
use async_trait::async_trait;
use serde::Deserialize;
use vigil_common::health::{PodPhase, PodSnapshot, VolumeStatus};
use vigil_common::{BackendKind, ProbeError, RawSnapshot, Session};

const CRASH_LOOP_REASON: &str = "CrashLoopBackOff";

pub struct KubernetesAdapter {
    program: String,
    namespace: String,
    context: Option<String>,
}

impl KubernetesAdapter {
    pub fn new(program: impl Into<String>, namespace: impl Into<String>, context: Option<String>) -> Self {
        Self {
            program: program.into(),
            namespace: namespace.into(),
            context,
        }
    }

    /// The resource document, or `None` when the resource does not exist.
    async fn get(&self, resource: &str, name: &str) -> Result<Option<String>, ProbeError> {
        let mut args = vec![
            "get",
            resource,
            name,
            "--namespace",
            self.namespace.as_str(),
            "--ignore-not-found",
            "-o",
            "json",
        ];
        if let Some(context) = &self.context {
            args.extend(["--context", context.as_str()]);
        }
        let output = command::run(&self.program, &args).await?;
        if !output.success {
            return Err(output.into_failure(&self.program));
        }
        let document = output.stdout.trim();
        Ok((!document.is_empty()).then(|| document.to_string()))
    }
}

#[async_trait]
impl ProbeAdapter for KubernetesAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Pod
    }

    async fn probe(&self, session: &Session) -> Result<RawSnapshot, ProbeError> {
        let pod_name = backend_id(session)?;
        let claim = session
            .volume_claim()
            .ok_or(ProbeError::MissingBackendId)?;

        let pod = match self.get("pod", pod_name).await? {
            Some(document) => parse_pod(&document)?,
            None => PodPhase::NotFound,
        };
        let volume = match self.get("pvc", &claim).await? {
            Some(_) => VolumeStatus::Present { name: claim },
            None => VolumeStatus::Deleted { name: claim },
        };

        Ok(RawSnapshot::Pod(PodSnapshot { pod, volume }))
    }
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    phase: Option<String>,
    message: Option<String>,
    reason: Option<String>,
    #[serde(default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: ContainerState,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerState {
    waiting: Option<Waiting>,
}

#[derive(Debug, Deserialize)]
struct Waiting {
    reason: Option<String>,
}

/// Map a pod document to a phase. A container waiting in `CrashLoopBackOff`
/// wins over whatever phase the pod reports.
fn parse_pod(json: &str) -> Result<PodPhase, ProbeError> {
    let pod: Pod = serde_json::from_str(json)
        .map_err(|err| ProbeError::Malformed(format!("kubectl pod output: {err}")))?;
    let status = pod.status;

    let crash_looping = status.container_statuses.iter().any(|container| {
        container
            .state
            .waiting
            .as_ref()
            .and_then(|waiting| waiting.reason.as_deref())
            == Some(CRASH_LOOP_REASON)
    });
    if crash_looping {
        return Ok(PodPhase::CrashLoopBackOff);
    }

    let message = || {
        status
            .message
            .clone()
            .or_else(|| status.reason.clone())
            .unwrap_or_default()
    };

    let phase = match status.phase.as_deref() {
        Some("Running") => PodPhase::Running {
            ready: !status.container_statuses.is_empty()
                && status.container_statuses.iter().all(|c| c.ready),
        },
        Some("Pending") => PodPhase::Pending,
        Some("Succeeded") => PodPhase::Succeeded,
        Some("Failed") => PodPhase::Failed { message: message() },
        Some("Unknown") => PodPhase::Unknown { message: message() },
        Some(other) => PodPhase::Unrecognized {
            raw: other.to_string(),
        },
        None => {
            return Err(ProbeError::Malformed(
                "kubectl pod output has no status.phase".to_string(),
            ));
        }
    };
    Ok(phase)
}
