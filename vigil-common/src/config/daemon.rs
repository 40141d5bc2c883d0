//! Daemon configuration file.
//!
//! Loaded from `~/.config/vigil/config.toml` (or an explicit path). A missing
//! file means defaults. `VIGIL_*` environment variables override file values.

use super::env::{EnvError, EnvParser, parse_log_level};
use super::source::{ConfigSource, ConfigValueSource, Sourced};
use crate::errors::ErrorCode;
use crate::types::BackendKind;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid environment overrides: {}", join_env_errors(.0))]
    Env(Vec<EnvError>),
}

fn join_env_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::ConfigReadError,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Invalid(_) => ErrorCode::ConfigValidationError,
            Self::Env(_) => ErrorCode::ConfigEnvError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    /// Address the HTTP API listens on.
    pub http_bind: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            http_bind: "127.0.0.1:7419".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// How long a cached report counts as fresh.
    pub cache_ttl_ms: u64,
    /// Run the one-shot startup sweep that flags unhealthy sessions.
    pub startup_sweep: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 2_000,
            cache_ttl_ms: 10_000,
            startup_sweep: true,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
    pub max_concurrent: usize,
    pub enabled_backends: Vec<BackendKind>,
    pub docker_bin: String,
    pub kubectl_bin: String,
    pub kube_namespace: String,
    pub kube_context: Option<String>,
    pub zellij_bin: String,
    pub sprites_api_url: String,
    /// Prefer `VIGIL_SPRITES_TOKEN` over writing the token to disk.
    pub sprites_token: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_concurrent: 8,
            enabled_backends: BackendKind::ALL.to_vec(),
            docker_bin: "docker".to_string(),
            kubectl_bin: "kubectl".to_string(),
            kube_namespace: "default".to_string(),
            kube_context: None,
            zellij_bin: "zellij".to_string(),
            sprites_api_url: "https://api.sprites.dev".to_string(),
            sprites_token: None,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn is_enabled(&self, kind: BackendKind) -> bool {
        self.enabled_backends.contains(&kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file holding the session list written by the session manager.
    pub sessions_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let sessions_path = directories::BaseDirs::new()
            .map(|dirs| dirs.data_dir().join("vigil").join("sessions.json"))
            .unwrap_or_else(|| PathBuf::from("sessions.json"));
        Self { sessions_path }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub general: GeneralConfig,
    pub poller: PollerConfig,
    pub probes: ProbeConfig,
    pub store: StoreConfig,
}

/// Configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: DaemonConfig,
    /// The file that was read, if one existed.
    pub file: Option<PathBuf>,
    /// Values overridden from the environment.
    pub overrides: Vec<ConfigValueSource>,
}

impl DaemonConfig {
    /// Default configuration file location.
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("vigil").join("config.toml"))
    }

    /// Parse a TOML document.
    pub fn from_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the file at `path` (or the default path), apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);

        let (mut config, file) = match path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                debug!(path = %path.display(), "Loaded configuration file");
                (Self::from_toml(&contents, &path)?, Some(path))
            }
            Some(path) => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                (Self::default(), None)
            }
            None => (Self::default(), None),
        };

        let mut parser = EnvParser::new();
        let overrides = config.apply_env(&mut parser);
        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }

        config.validate()?;
        Ok(LoadedConfig {
            config,
            file,
            overrides,
        })
    }

    /// Apply `VIGIL_*` overrides. Returns the keys that were overridden.
    pub fn apply_env(&mut self, parser: &mut EnvParser) -> Vec<ConfigValueSource> {
        let mut overrides = Vec::new();

        fn record<T: std::fmt::Debug>(
            overrides: &mut Vec<ConfigValueSource>,
            key: &str,
            sourced: &Sourced<T>,
        ) -> bool {
            if sourced.is_from_env() {
                overrides.push(ConfigValueSource {
                    key: key.to_string(),
                    value: format!("{:?}", sourced.value),
                    source: ConfigSource::Environment,
                });
            }
            sourced.is_from_env()
        }

        let level = parser.get_log_level("LOG_LEVEL", &self.general.log_level);
        if record(&mut overrides, "general.log_level", &level) {
            self.general.log_level = level.value;
        }

        let bind = parser.get_string("HTTP_BIND", &self.general.http_bind);
        if record(&mut overrides, "general.http_bind", &bind) {
            self.general.http_bind = bind.value;
        }

        let enabled = parser.get_bool("POLLER_ENABLED", self.poller.enabled);
        if record(&mut overrides, "poller.enabled", &enabled) {
            self.poller.enabled = enabled.value;
        }

        let interval = parser.get_duration(
            "POLL_INTERVAL",
            self.poller.interval(),
            Duration::from_millis(100),
            Duration::from_secs(3_600),
        );
        if record(&mut overrides, "poller.interval_ms", &interval) {
            self.poller.interval_ms = interval.value.as_millis() as u64;
        }

        let ttl = parser.get_duration(
            "CACHE_TTL",
            self.poller.cache_ttl(),
            Duration::from_millis(100),
            Duration::from_secs(86_400),
        );
        if record(&mut overrides, "poller.cache_ttl_ms", &ttl) {
            self.poller.cache_ttl_ms = ttl.value.as_millis() as u64;
        }

        let timeout = parser.get_duration(
            "PROBE_TIMEOUT",
            self.probes.timeout(),
            Duration::from_millis(100),
            Duration::from_secs(300),
        );
        if record(&mut overrides, "probes.timeout_ms", &timeout) {
            self.probes.timeout_ms = timeout.value.as_millis() as u64;
        }

        let concurrent = parser.get_u32_range(
            "MAX_CONCURRENT_PROBES",
            u32::try_from(self.probes.max_concurrent).unwrap_or(u32::MAX),
            1,
            256,
        );
        if record(&mut overrides, "probes.max_concurrent", &concurrent) {
            self.probes.max_concurrent = concurrent.value as usize;
        }

        let namespace = parser.get_string("KUBE_NAMESPACE", &self.probes.kube_namespace);
        if record(&mut overrides, "probes.kube_namespace", &namespace) {
            self.probes.kube_namespace = namespace.value;
        }

        let api_url = parser.get_string("SPRITES_API_URL", &self.probes.sprites_api_url);
        if record(&mut overrides, "probes.sprites_api_url", &api_url) {
            self.probes.sprites_api_url = api_url.value;
        }

        let token = parser.get_optional_string("SPRITES_TOKEN");
        if token.is_from_env() {
            // Never echo the token itself.
            overrides.push(ConfigValueSource {
                key: "probes.sprites_token".to_string(),
                value: "<redacted>".to_string(),
                source: ConfigSource::Environment,
            });
            self.probes.sprites_token = token.value;
        }

        let sessions = parser.get_path(
            "SESSIONS_PATH",
            &self.store.sessions_path.to_string_lossy(),
            false,
        );
        if record(&mut overrides, "store.sessions_path", &sessions) {
            self.store.sessions_path = sessions.value;
        }

        overrides
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if parse_log_level(&self.general.log_level).is_none() {
            return Err(ConfigError::Invalid(format!(
                "general.log_level '{}' is not one of trace, debug, info, warn, error, off",
                self.general.log_level
            )));
        }
        if self.general.http_bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "general.http_bind '{}' is not a socket address",
                self.general.http_bind
            )));
        }
        if self.poller.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poller.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.poller.cache_ttl_ms == 0 {
            return Err(ConfigError::Invalid(
                "poller.cache_ttl_ms must be greater than zero".to_string(),
            ));
        }
        if self.probes.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "probes.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.probes.enabled_backends.contains(&BackendKind::Unsupported) {
            return Err(ConfigError::Invalid(format!(
                "probes.enabled_backends only accepts {}",
                BackendKind::ALL.map(BackendKind::label).join(", ")
            )));
        }
        if self.probes.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "probes.max_concurrent must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
