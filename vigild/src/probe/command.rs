//! Read-only CLI invocations for the command-line backends.

use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use vigil_common::ProbeError;

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub(crate) struct CommandOutput {
    pub success: bool,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Convert a non-zero exit into `CommandFailed`.
    pub fn into_failure(self, program: &str) -> ProbeError {
        ProbeError::CommandFailed {
            program: program.to_string(),
            status: self.status,
            stderr: self.stderr.trim().to_string(),
        }
    }
}

/// Run `program` with `args` and capture its output.
///
/// The child is killed if this future is dropped, which is how the probe
/// timeout cancels a hung CLI.
pub(crate) async fn run(program: &str, args: &[&str]) -> Result<CommandOutput, ProbeError> {
    debug!(program, ?args, "Running probe command");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| ProbeError::Spawn {
            program: program.to_string(),
            message: err.to_string(),
        })?;

    Ok(CommandOutput {
        success: output.status.success(),
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
