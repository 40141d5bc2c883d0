//! Environment variable parsing with type safety.
//!
//! Reads `VIGIL_*` overrides with validation, error collection, and source
//! tracking. Invalid values fall back to the supplied default and are recorded
//! so every problem can be reported at once.

use super::source::{ConfigSource, Sourced};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Path does not exist.
    #[error("Path not found for {var}: {path}")]
    PathNotFound { var: String, path: PathBuf },

    /// Invalid duration format.
    #[error("Invalid duration for {var}: {value} (use e.g. 1500, 1500ms or 2s)")]
    InvalidDuration { var: String, value: String },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the VIGIL_ prefix.
    pub fn new() -> Self {
        Self {
            prefix: "VIGIL_",
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Get a string value with default.
    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => Sourced::from_env(value, var_name),
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }

    /// Get an optional string (None if not set or empty).
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.is_empty() => Sourced::from_env(None, var_name),
            Ok(value) => Sourced::from_env(Some(value), var_name),
            Err(_) => Sourced::default_value(None),
        }
    }

    /// Get a boolean value with default.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let var_name = self.var_name(name);
        let Ok(value) = env::var(&var_name) else {
            return Sourced::default_value(default);
        };
        match parse_bool(&value) {
            Some(parsed) => Sourced::from_env(parsed, var_name),
            None => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name.clone(),
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                Sourced::from_env(default, var_name)
            }
        }
    }

    /// Get a u32 value with default and range validation.
    pub fn get_u32_range(&mut self, name: &str, default: u32, min: u32, max: u32) -> Sourced<u32> {
        self.get_ranged(name, default, min, max, "unsigned 32-bit integer")
    }

    /// Get a u64 value with default and range validation.
    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> Sourced<u64> {
        self.get_ranged(name, default, min, max, "unsigned 64-bit integer")
    }

    fn get_ranged<T>(&mut self, name: &str, default: T, min: T, max: T, expected: &str) -> Sourced<T>
    where
        T: FromStr + PartialOrd + Display + Copy,
    {
        let var_name = self.var_name(name);
        let Ok(value) = env::var(&var_name) else {
            return Sourced::default_value(default);
        };
        match value.trim().parse::<T>() {
            Ok(n) if n >= min && n <= max => Sourced::from_env(n, var_name),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name.clone(),
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                Sourced::from_env(default, var_name)
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: expected.to_string(),
                    value,
                });
                Sourced::default_value(default)
            }
        }
    }

    /// Get a duration given as milliseconds (`1500`, `1500ms`) or seconds (`2s`).
    pub fn get_duration(
        &mut self,
        name: &str,
        default: Duration,
        min: Duration,
        max: Duration,
    ) -> Sourced<Duration> {
        let var_name = self.var_name(name);
        let Ok(value) = env::var(&var_name) else {
            return Sourced::default_value(default);
        };
        match parse_duration(&value) {
            Some(d) if d >= min && d <= max => Sourced::from_env(d, var_name),
            Some(d) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name.clone(),
                    value: format!("{}ms", d.as_millis()),
                    min: format!("{}ms", min.as_millis()),
                    max: format!("{}ms", max.as_millis()),
                });
                Sourced::from_env(default, var_name)
            }
            None => {
                self.errors.push(EnvError::InvalidDuration {
                    var: var_name,
                    value,
                });
                Sourced::default_value(default)
            }
        }
    }

    /// Get a path value with ~ expansion.
    ///
    /// If `must_exist` is true, records an error if the path doesn't exist.
    pub fn get_path(&mut self, name: &str, default: &str, must_exist: bool) -> Sourced<PathBuf> {
        let var_name = self.var_name(name);
        let (value, source) = match env::var(&var_name) {
            Ok(v) => (v, ConfigSource::Environment),
            Err(_) => (default.to_string(), ConfigSource::Default),
        };

        let expanded = expand_home(&value);

        if must_exist && !expanded.exists() {
            self.errors.push(EnvError::PathNotFound {
                var: var_name.clone(),
                path: expanded.clone(),
            });
        }

        if source == ConfigSource::Environment {
            Sourced::from_env(expanded, var_name)
        } else {
            Sourced::default_value(expanded)
        }
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        let Ok(value) = env::var(&var_name) else {
            return Sourced::default_value(default.to_string());
        };
        match parse_log_level(&value) {
            Some(level) => Sourced::from_env(level, var_name),
            None => {
                self.errors.push(EnvError::InvalidLogLevel {
                    var: var_name.clone(),
                    value,
                });
                Sourced::from_env(default.to_string(), var_name)
            }
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_log_level(value: &str) -> Option<String> {
    let lower = value.to_lowercase();
    match lower.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Some(lower),
        _ => None,
    }
}

fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Some(ms) = value.strip_suffix("ms") {
        return ms.trim().parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = value.strip_suffix('s') {
        return secs.trim().parse().ok().map(Duration::from_secs);
    }
    value.parse().ok().map(Duration::from_millis)
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), dirs::home_dir()) {
        (Some(stripped), Some(home)) => home.join(stripped),
        _ => PathBuf::from(value),
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;

    fn cleanup_env(vars: &[&str]) {
        for var in vars {
            // SAFETY: Tests are serialized via env_test_lock
            unsafe { env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: Tests are serialized via env_test_lock
        unsafe { env::set_var(key, value) };
    }

    #[test]
    fn test_get_bool_values() {
        let _guard = env_test_lock();
        let vars = ["VIGIL_TEST_BOOL"];
        cleanup_env(&vars);

        for (val, expected) in [("1", true), ("Yes", true), ("off", false), ("", false)] {
            set_env("VIGIL_TEST_BOOL", val);
            let mut parser = EnvParser::new();
            let result = parser.get_bool("TEST_BOOL", !expected);
            assert_eq!(result.value, expected, "value '{}'", val);
            assert!(!parser.has_errors());
        }

        set_env("VIGIL_TEST_BOOL", "maybe");
        let mut parser = EnvParser::new();
        assert!(!parser.get_bool("TEST_BOOL", false).value);
        assert!(parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_u64_range() {
        let _guard = env_test_lock();
        let vars = ["VIGIL_TEST_U64"];
        cleanup_env(&vars);

        set_env("VIGIL_TEST_U64", "50");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_u64_range("TEST_U64", 10, 1, 100).value, 50);
        assert!(!parser.has_errors());

        set_env("VIGIL_TEST_U64", "0");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_u64_range("TEST_U64", 10, 1, 100).value, 10);
        assert!(matches!(parser.errors()[0], EnvError::OutOfRange { .. }));

        set_env("VIGIL_TEST_U64", "lots");
        let mut parser = EnvParser::new();
        let result = parser.get_u64_range("TEST_U64", 10, 1, 100);
        assert_eq!(result.value, 10);
        assert_eq!(result.source, ConfigSource::Default);
        assert!(matches!(parser.errors()[0], EnvError::InvalidValue { .. }));

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_duration() {
        let _guard = env_test_lock();
        let vars = ["VIGIL_TEST_DURATION"];
        cleanup_env(&vars);

        let default = Duration::from_secs(2);
        let min = Duration::from_millis(100);
        let max = Duration::from_secs(60);

        for (raw, expected) in [
            ("1500", Duration::from_millis(1500)),
            ("250ms", Duration::from_millis(250)),
            ("5s", Duration::from_secs(5)),
        ] {
            set_env("VIGIL_TEST_DURATION", raw);
            let mut parser = EnvParser::new();
            let result = parser.get_duration("TEST_DURATION", default, min, max);
            assert_eq!(result.value, expected, "raw '{}'", raw);
            assert!(result.is_from_env());
        }

        set_env("VIGIL_TEST_DURATION", "soon");
        let mut parser = EnvParser::new();
        assert_eq!(
            parser.get_duration("TEST_DURATION", default, min, max).value,
            default
        );
        assert!(matches!(parser.errors()[0], EnvError::InvalidDuration { .. }));

        set_env("VIGIL_TEST_DURATION", "10ms");
        let mut parser = EnvParser::new();
        assert_eq!(
            parser.get_duration("TEST_DURATION", default, min, max).value,
            default
        );
        assert!(matches!(parser.errors()[0], EnvError::OutOfRange { .. }));

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_log_level() {
        let _guard = env_test_lock();
        let vars = ["VIGIL_TEST_LOG_LEVEL"];
        cleanup_env(&vars);

        set_env("VIGIL_TEST_LOG_LEVEL", "DEBUG");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_log_level("TEST_LOG_LEVEL", "info").value, "debug");

        set_env("VIGIL_TEST_LOG_LEVEL", "verbose");
        let mut parser = EnvParser::new();
        assert_eq!(parser.get_log_level("TEST_LOG_LEVEL", "info").value, "info");
        assert!(parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_optional_string_and_sources() {
        let _guard = env_test_lock();
        let vars = ["VIGIL_TEST_OPT"];
        cleanup_env(&vars);

        let mut parser = EnvParser::new();
        let result = parser.get_optional_string("TEST_OPT");
        assert!(result.value.is_none());
        assert_eq!(result.source, ConfigSource::Default);

        set_env("VIGIL_TEST_OPT", "");
        let mut parser = EnvParser::new();
        assert!(parser.get_optional_string("TEST_OPT").value.is_none());

        set_env("VIGIL_TEST_OPT", "token");
        let mut parser = EnvParser::new();
        let result = parser.get_optional_string("TEST_OPT");
        assert_eq!(result.value.as_deref(), Some("token"));
        assert_eq!(result.env_var.as_deref(), Some("VIGIL_TEST_OPT"));

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_path_expands_home() {
        let _guard = env_test_lock();
        let vars = ["VIGIL_TEST_PATH"];
        cleanup_env(&vars);

        set_env("VIGIL_TEST_PATH", "~/sessions.json");
        let mut parser = EnvParser::new();
        let result = parser.get_path("TEST_PATH", "/default", false);
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result.value, home.join("sessions.json"));
        }

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        set_env("VIGIL_TEST_PATH", missing.to_str().unwrap());
        let mut parser = EnvParser::new();
        parser.get_path("TEST_PATH", "/default", true);
        assert!(matches!(parser.errors()[0], EnvError::PathNotFound { .. }));

        cleanup_env(&vars);
    }

    mod proptest_env_parsing {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn test_parse_bool_valid_only(s in "[a-zA-Z0-9_-]{0,20}") {
                let valid = ["1", "true", "yes", "on", "0", "false", "no", "off", ""];
                let is_valid = valid.iter().any(|v| s.eq_ignore_ascii_case(v));
                prop_assert_eq!(parse_bool(&s).is_some(), is_valid);
            }

            #[test]
            fn test_parse_duration_no_panic(s in ".*") {
                let _ = parse_duration(&s);
            }

            #[test]
            fn test_parse_duration_millis_roundtrip(ms in 0u64..10_000_000) {
                prop_assert_eq!(parse_duration(&ms.to_string()), Some(Duration::from_millis(ms)));
                prop_assert_eq!(parse_duration(&format!("{ms}ms")), Some(Duration::from_millis(ms)));
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(50))]

            #[test]
            fn test_env_parser_get_u32_range(value in "[-0-9a-zA-Z.]{0,30}") {
                let _guard = env_test_lock();
                let var = "VIGIL_PROPTEST_U32";
                cleanup_env(&[var]);

                set_env(var, &value);
                let mut parser = EnvParser::new();
                let result = parser.get_u32_range("PROPTEST_U32", 8, 1, 256);

                match value.trim().parse::<u32>() {
                    Ok(n) if (1..=256).contains(&n) => prop_assert_eq!(result.value, n),
                    _ => {
                        prop_assert_eq!(result.value, 8);
                        prop_assert!(parser.has_errors());
                    }
                }

                cleanup_env(&[var]);
            }
        }
    }
}
