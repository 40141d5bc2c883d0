//! Container probing through `docker inspect`.

use super::command::{self, CommandOutput};
use super::{ProbeAdapter, backend_id};
use async_trait::async_trait;
use vigil_common::health::ContainerSnapshot;
use vigil_common::{BackendKind, ProbeError, RawSnapshot, Session};

pub struct DockerAdapter {
    program: String,
}

impl DockerAdapter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ProbeAdapter for DockerAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Container
    }

    async fn probe(&self, session: &Session) -> Result<RawSnapshot, ProbeError> {
        let id = backend_id(session)?;
        let output = command::run(
            &self.program,
            &["inspect", "--type", "container", "--format", "{{.State.Status}}", id],
        )
        .await?;
        interpret(&self.program, output).map(RawSnapshot::Container)
    }
}

fn interpret(program: &str, output: CommandOutput) -> Result<ContainerSnapshot, ProbeError> {
    if !output.success {
        if is_missing(&output.stderr) {
            return Ok(ContainerSnapshot::NotFound);
        }
        return Err(output.into_failure(program));
    }

    let status = output.stdout.trim();
    if status.is_empty() {
        return Err(ProbeError::Malformed(
            "docker inspect printed no status".to_string(),
        ));
    }
    Ok(ContainerSnapshot::from_docker_status(status))
}

fn is_missing(stderr: &str) -> bool {
    stderr.contains("No such object") || stderr.contains("No such container")
}
