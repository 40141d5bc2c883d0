//! Error Catalog for Vigil
//!
//! Each error includes:
//! - A unique code (VGL-E001 through VGL-E599)
//! - A human-readable message
//! - Remediation steps
//!
//! Probe and classification codes are embedded in health report details as
//! `[VGL-Exxx]` so a degraded report can be traced back to its cause.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering all Vigil error scenarios.
///
/// Each variant maps to a unique error code in the VGL-Exxx format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Configuration file could not be read
    ConfigReadError,
    /// Configuration file contains invalid TOML syntax
    ConfigParseError,
    /// Configuration contains invalid values
    ConfigValidationError,
    /// Environment variable has invalid value
    ConfigEnvError,

    // =========================================================================
    // Probe Errors (E100-E199)
    // =========================================================================
    /// Probe did not answer within the configured timeout
    ProbeTimeout,
    /// Backend CLI could not be spawned
    ProbeSpawnFailed,
    /// Backend CLI exited with an error
    ProbeCommandFailed,
    /// Provider API rejected the credentials
    ProbeAuthFailed,
    /// Provider API request failed
    ProbeHttpFailed,
    /// Backend output could not be parsed
    ProbeMalformedOutput,
    /// No adapter is registered for the backend
    ProbeNoAdapter,

    // =========================================================================
    // Store Errors (E200-E299)
    // =========================================================================
    /// Session store could not be read
    StoreReadFailed,
    /// Session store contents are not valid
    StoreParseFailed,
    /// Requested session does not exist
    StoreSessionNotFound,

    // =========================================================================
    // Classification Errors (E300-E399)
    // =========================================================================
    /// Snapshot belongs to a different backend than the session
    ClassifyBackendMismatch,
    /// Backend reported a state the classifier does not recognize
    ClassifyUnrecognizedState,

    // =========================================================================
    // Internal Errors (E500-E599)
    // =========================================================================
    /// Policy table has no entry for a state/safety combination
    InternalPolicyMiss,
    /// Health evaluation task panicked or was cancelled
    InternalEvaluationPanicked,
    /// Event could not be serialized for the event bus
    InternalEventEncoding,
}

impl ErrorCode {
    /// Returns the numeric error code (without prefix).
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            // Config (001-099)
            Self::ConfigReadError => 1,
            Self::ConfigParseError => 2,
            Self::ConfigValidationError => 3,
            Self::ConfigEnvError => 4,

            // Probe (100-199)
            Self::ProbeTimeout => 100,
            Self::ProbeSpawnFailed => 101,
            Self::ProbeCommandFailed => 102,
            Self::ProbeAuthFailed => 103,
            Self::ProbeHttpFailed => 104,
            Self::ProbeMalformedOutput => 105,
            Self::ProbeNoAdapter => 106,

            // Store (200-299)
            Self::StoreReadFailed => 200,
            Self::StoreParseFailed => 201,
            Self::StoreSessionNotFound => 202,

            // Classification (300-399)
            Self::ClassifyBackendMismatch => 301,
            Self::ClassifyUnrecognizedState => 302,

            // Internal (500-599)
            Self::InternalPolicyMiss => 500,
            Self::InternalEvaluationPanicked => 501,
            Self::InternalEventEncoding => 502,
        }
    }

    /// Returns the formatted error code string (e.g., "VGL-E001").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("VGL-E{:03}", self.code_number())
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Probe,
            200..=299 => ErrorCategory::Store,
            300..=399 => ErrorCategory::Classification,
            _ => ErrorCategory::Internal,
        }
    }

    /// Returns the full error entry with all metadata.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigReadError => "Failed to read configuration file",
            Self::ConfigParseError => "Configuration file contains invalid TOML syntax",
            Self::ConfigValidationError => "Configuration contains invalid values",
            Self::ConfigEnvError => "Environment variable has invalid value",

            Self::ProbeTimeout => "Backend probe timed out",
            Self::ProbeSpawnFailed => "Failed to run the backend command",
            Self::ProbeCommandFailed => "Backend command exited with an error",
            Self::ProbeAuthFailed => "Provider API rejected the credentials",
            Self::ProbeHttpFailed => "Provider API request failed",
            Self::ProbeMalformedOutput => "Backend returned output that could not be parsed",
            Self::ProbeNoAdapter => "No probe adapter is registered for this backend",

            Self::StoreReadFailed => "Failed to read the session store",
            Self::StoreParseFailed => "Session store contents are invalid",
            Self::StoreSessionNotFound => "Session not found",

            Self::ClassifyBackendMismatch => "Probe snapshot does not match the session backend",
            Self::ClassifyUnrecognizedState => "Backend reported an unrecognized resource state",

            Self::InternalPolicyMiss => "Recovery policy has no entry for this state",
            Self::InternalEvaluationPanicked => "Health evaluation task failed unexpectedly",
            Self::InternalEventEncoding => "Failed to encode daemon event",
        }
    }

    /// Returns remediation steps for this error.
    #[must_use]
    pub fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigReadError => &[
                "Check file permissions on ~/.config/vigil/config.toml",
                "Pass an explicit path with --config",
            ],
            Self::ConfigParseError => &[
                "Validate the TOML syntax of the configuration file",
                "Remove the file to fall back to defaults",
            ],
            Self::ConfigValidationError => &[
                "Intervals, timeouts and concurrency limits must be greater than zero",
            ],
            Self::ConfigEnvError => &[
                "Check VIGIL_* environment variables for typos",
                "Durations are given in milliseconds, flags as true/false",
            ],
            Self::ProbeTimeout => &[
                "Check that the backend daemon or API is responsive",
                "Raise probes.timeout_ms if the backend is slow but healthy",
            ],
            Self::ProbeSpawnFailed => &[
                "Make sure docker, kubectl or zellij is installed and on PATH",
                "Override the binary with probes.docker_bin, probes.kubectl_bin or probes.zellij_bin",
            ],
            Self::ProbeCommandFailed => &[
                "Run the backend command by hand to see its full output",
                "Check the kubectl context or docker host the daemon is using",
            ],
            Self::ProbeAuthFailed => &["Refresh the provider API token in VIGIL_SPRITES_TOKEN"],
            Self::ProbeHttpFailed => &[
                "Check network connectivity to the provider API",
                "Verify probes.sprites_api_url",
            ],
            Self::ProbeMalformedOutput => &[
                "Check the backend CLI version is supported",
                "Report the raw output with the daemon logs attached",
            ],
            Self::ProbeNoAdapter => &[
                "Enable the backend in the probes section of the configuration",
            ],
            Self::StoreReadFailed => &[
                "Check that store.sessions_path exists and is readable",
            ],
            Self::StoreParseFailed => &[
                "The session store must be a JSON array of session records",
            ],
            Self::StoreSessionNotFound => &["List known sessions with `vigild check`"],
            Self::ClassifyBackendMismatch => &[
                "This indicates a misregistered probe adapter; please report it",
            ],
            Self::ClassifyUnrecognizedState => &[
                "Inspect the resource directly with the backend CLI",
                "Report the state so it can be classified",
            ],
            Self::InternalPolicyMiss | Self::InternalEvaluationPanicked => &[
                "This is a bug; please report it with the daemon logs attached",
            ],
            Self::InternalEventEncoding => &["Restart the daemon"],
        }
    }

    /// Returns all error codes.
    #[must_use]
    pub fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigValidationError,
            Self::ConfigEnvError,
            Self::ProbeTimeout,
            Self::ProbeSpawnFailed,
            Self::ProbeCommandFailed,
            Self::ProbeAuthFailed,
            Self::ProbeHttpFailed,
            Self::ProbeMalformedOutput,
            Self::ProbeNoAdapter,
            Self::StoreReadFailed,
            Self::StoreParseFailed,
            Self::StoreSessionNotFound,
            Self::ClassifyBackendMismatch,
            Self::ClassifyUnrecognizedState,
            Self::InternalPolicyMiss,
            Self::InternalEvaluationPanicked,
            Self::InternalEventEncoding,
        ]
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Configuration and setup errors (E001-E099)
    Config,
    /// Backend probe errors (E100-E199)
    Probe,
    /// Session store errors (E200-E299)
    Store,
    /// State classification errors (E300-E399)
    Classification,
    /// Internal/unexpected errors (E500-E599)
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable name for the category.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Probe => "Probe",
            Self::Store => "Store",
            Self::Classification => "Classification",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "VGL-E001")
    pub code: String,
    /// Error category
    pub category: ErrorCategory,
    /// Human-readable error message
    pub message: String,
    /// Steps to remediate the error
    pub remediation: Vec<String>,
}

impl ErrorEntry {
    /// Formats the error for display with full remediation steps.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut output = format!("[{}] {}\n\n", self.code, self.message);

        if !self.remediation.is_empty() {
            output.push_str("Remediation steps:\n");
            for (i, step) in self.remediation.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }

        output
    }

    /// Formats the error as a single line.
    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_brief())
    }
}
