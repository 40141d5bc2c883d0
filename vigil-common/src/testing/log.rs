//! JSONL logging for tests.
//!
//! [`init_global_test_logging`] routes tracing output from `vigild` and
//! `vigil_common` to the test writer and to `target/test-logs/all_tests.jsonl`.
//! [`TestLogger`] records the phases of one test in its own JSONL file, which
//! is what CI uploads when a CLI test fails.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, Once, PoisonError};
use std::time::Instant;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Setup,
    Execute,
    Verify,
}

static INIT: Once = Once::new();

/// Install the shared test subscriber. Later calls do nothing.
///
/// `VIGIL_TEST_LOG_LEVEL` sets the level (default `info`).
pub fn init_global_test_logging() {
    INIT.call_once(|| {
        let level = std::env::var("VIGIL_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter = tracing_subscriber::EnvFilter::try_new(format!(
            "vigild={level},vigil_common={level},test={level}"
        ))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let jsonl = open_log("all_tests").map(|file| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
        });

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(jsonl)
            .with(tracing_subscriber::fmt::layer().with_test_writer().compact())
            .try_init();
    });
}

/// `<target>/test-logs`, honoring `CARGO_TARGET_DIR`.
fn log_dir() -> PathBuf {
    if let Ok(target) = std::env::var("CARGO_TARGET_DIR") {
        return PathBuf::from(target).join("test-logs");
    }
    let mut dir = std::env::current_dir().unwrap_or_default();
    loop {
        if dir.join("target").is_dir() {
            return dir.join("target").join("test-logs");
        }
        if !dir.pop() {
            return PathBuf::from("target/test-logs");
        }
    }
}

fn open_log(name: &str) -> Option<File> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir).ok()?;
    let file_name = name.replace("::", "_").replace(['/', '\\'], "_");
    File::create(dir.join(format!("{file_name}.jsonl"))).ok()
}

/// One line of a per-test log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLogEntry {
    pub timestamp: String,
    pub test_name: String,
    pub phase: TestPhase,
    pub message: String,
    /// Milliseconds since the logger was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Per-test phase log.
pub struct TestLogger {
    test_name: String,
    started: Instant,
    entries: Mutex<Vec<TestLogEntry>>,
    file: Option<Mutex<File>>,
}

impl TestLogger {
    pub fn for_test(test_name: &str) -> Self {
        let logger = Self {
            test_name: test_name.to_string(),
            started: Instant::now(),
            entries: Mutex::new(Vec::new()),
            file: open_log(test_name).map(Mutex::new),
        };
        logger.log(TestPhase::Setup, "start");
        logger
    }

    pub fn log(&self, phase: TestPhase, message: impl Into<String>) {
        self.record(phase, message.into(), None);
    }

    pub fn log_with_data(&self, phase: TestPhase, message: impl Into<String>, data: serde_json::Value) {
        self.record(phase, message.into(), Some(data));
    }

    pub fn entries(&self) -> Vec<TestLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn pass(self) {
        self.log(TestPhase::Verify, "pass");
    }

    fn record(&self, phase: TestPhase, message: String, data: Option<serde_json::Value>) {
        let entry = TestLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            test_name: self.test_name.clone(),
            phase,
            message,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            data,
        };
        tracing::info!(target: "test", test = %entry.test_name, phase = ?phase, "{}", entry.message);

        if let Some(file) = &self.file
            && let Ok(line) = serde_json::to_string(&entry)
        {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = writeln!(file, "{line}");
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}
