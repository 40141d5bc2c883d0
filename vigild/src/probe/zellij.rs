//! Multiplexer probing through `zellij list-sessions`.

use super::command::{self, CommandOutput};
use super::{ProbeAdapter, backend_id};
use async_trait::async_trait;
use vigil_common::health::MultiplexerSnapshot;
use vigil_common::{BackendKind, ProbeError, RawSnapshot, Session};

/// What zellij prints, with a non-zero exit, when no server is running.
const NO_SESSIONS: &str = "No active zellij sessions found";

pub struct ZellijAdapter {
    program: String,
}

impl ZellijAdapter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ProbeAdapter for ZellijAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Multiplexer
    }

    async fn probe(&self, session: &Session) -> Result<RawSnapshot, ProbeError> {
        let name = backend_id(session)?;
        let output = command::run(&self.program, &["list-sessions", "--no-formatting"]).await?;
        interpret(&self.program, output, name).map(RawSnapshot::Multiplexer)
    }
}

fn interpret(program: &str, output: CommandOutput, name: &str) -> Result<MultiplexerSnapshot, ProbeError> {
    if output.success {
        return Ok(find_session(&output.stdout, name));
    }
    if output.stderr.contains(NO_SESSIONS) || output.stdout.contains(NO_SESSIONS) {
        return Ok(MultiplexerSnapshot::NotFound);
    }
    Err(output.into_failure(program))
}

/// Lines look like `name [Created 2h ago] (EXITED - attach to resurrect)`.
fn find_session(listing: &str, name: &str) -> MultiplexerSnapshot {
    let Some(line) = listing
        .lines()
        .map(str::trim)
        .find(|line| line.split_whitespace().next() == Some(name))
    else {
        return MultiplexerSnapshot::NotFound;
    };

    match line.rsplit_once('(') {
        None => MultiplexerSnapshot::Running,
        Some((_, marker)) if marker.starts_with("EXITED") => MultiplexerSnapshot::Exited,
        Some((_, marker)) if marker.starts_with("current") => MultiplexerSnapshot::Running,
        Some(_) => MultiplexerSnapshot::Unrecognized {
            line: line.to_string(),
        },
    }
}
