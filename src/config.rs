//! Runtime configuration for portal access and the captcha loop.
//!
//! A [`SicarConfig`] is built once (defaults, then an optional TOML file,
//! then CLI overrides) and passed into [`crate::Sicar::connect`].
//! Nothing in the library reads configuration from global state.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::user_agent::BROWSER_USER_AGENT;

/// Public query portal root.
pub const DEFAULT_BASE_URL: &str = "https://consultapublica.car.gov.br/publico";

/// Captcha rounds per download before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

/// Upper bound of the pause between failed attempts (two uniform draws summed).
pub const DEFAULT_JITTER_MAX_MS: u64 = 2_000;

/// Connect timeout; the portal is slow to accept connections under load.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Overall per-request timeout; protected exports can take minutes to start.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Smallest property export accepted without a zip-like content type.
pub const DEFAULT_MIN_PROPERTY_BYTES: usize = 1_000;

/// Concurrent orchestrations allowed by the batch downloader.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 5;

const MAX_ATTEMPTS_RANGE: std::ops::RangeInclusive<u32> = 1..=1_000;
const TIMEOUT_SECS_RANGE: std::ops::RangeInclusive<u64> = 1..=3_600;
const CONCURRENCY_RANGE: std::ops::RangeInclusive<usize> = 1..=32;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`SicarConfig`].
    #[error("failed to parse config: {source}")]
    Parse {
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value parsed but is outside its allowed range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Config key.
        field: &'static str,
        /// Human-readable constraint violation.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// TLS negotiation policy for the portal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsPolicy {
    /// Backend defaults: strongest mutually supported protocol, verified chain.
    #[default]
    Modern,
    /// Compatibility shim for portal deployments that only complete a
    /// TLS 1.2 handshake with an unverifiable chain.
    Legacy,
}

/// Which OCR backend turns captcha images into guesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// The `tesseract` command-line OCR engine.
    #[default]
    Tesseract,
    /// Any program reading the image on stdin and printing the guess.
    Command,
}

/// Captcha solver selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Backend to construct.
    pub kind: SolverKind,
    /// Executable path; defaults to `tesseract` for the tesseract backend.
    pub program: Option<String>,
    /// Extra arguments passed to the program.
    pub args: Vec<String>,
    /// Per-image timeout for the external program, in seconds.
    pub timeout_secs: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::Tesseract,
            program: None,
            args: Vec::new(),
            timeout_secs: 20,
        }
    }
}

/// Configuration for one or more orchestrator instances.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SicarConfig {
    /// Portal root; every endpoint is resolved relative to it.
    pub base_url: String,
    /// Captcha rounds per download.
    pub max_attempts: u32,
    /// Upper bound of the pause between failed attempts, in milliseconds.
    pub jitter_max_ms: u64,
    /// TCP/TLS connect timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Per-read timeout, and overall bound for everything but archive
    /// streams, in seconds.
    pub request_timeout_secs: u64,
    /// Minimum decoded size for property exports lacking a zip content type.
    pub min_property_bytes: usize,
    /// TLS policy for the session.
    pub tls: TlsPolicy,
    /// User-Agent header sent on every request.
    pub user_agent: String,
    /// Extra default headers; entries override the built-in browser headers.
    pub headers: BTreeMap<String, String>,
    /// Bound on concurrent orchestrations in batch downloads.
    pub max_concurrent_downloads: usize,
    /// Captcha solver selection.
    pub solver: SolverConfig,
}

impl Default for SicarConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter_max_ms: DEFAULT_JITTER_MAX_MS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            min_property_bytes: DEFAULT_MIN_PROPERTY_BYTES,
            tls: TlsPolicy::Modern,
            user_agent: BROWSER_USER_AGENT.to_string(),
            headers: BTreeMap::new(),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            solver: SolverConfig::default(),
        }
    }
}

impl SicarConfig {
    /// Creates a config pointing at `base_url` with every other value defaulted.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// the same errors as [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Validates value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::invalid("base_url", format!("{e}: {}", self.base_url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "base_url",
                format!("unsupported scheme '{}'", base.scheme()),
            ));
        }
        if !MAX_ATTEMPTS_RANGE.contains(&self.max_attempts) {
            return Err(ConfigError::invalid(
                "max_attempts",
                format!("{} (expected 1..=1000)", self.max_attempts),
            ));
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("request_timeout_secs", self.request_timeout_secs)?;
        validate_timeout_secs("solver.timeout_secs", self.solver.timeout_secs)?;
        if self.jitter_max_ms > 60_000 {
            return Err(ConfigError::invalid(
                "jitter_max_ms",
                format!("{} (expected 0..=60000)", self.jitter_max_ms),
            ));
        }
        if !CONCURRENCY_RANGE.contains(&self.max_concurrent_downloads) {
            return Err(ConfigError::invalid(
                "max_concurrent_downloads",
                format!("{} (expected 1..=32)", self.max_concurrent_downloads),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::invalid("user_agent", "must not be empty"));
        }
        if self.solver.kind == SolverKind::Command && self.solver.program.is_none() {
            return Err(ConfigError::invalid(
                "solver.program",
                "required when solver.kind = \"command\"",
            ));
        }
        Ok(())
    }

    /// Pause ceiling between failed attempts.
    #[must_use]
    pub fn jitter_max(&self) -> Duration {
        Duration::from_millis(self.jitter_max_ms)
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-read (and non-archive overall) timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if TIMEOUT_SECS_RANGE.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("{value} (expected 1..=3600)"),
        ))
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/sicar/config.toml`
/// 2. `$HOME/.config/sicar/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("sicar").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("sicar")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SicarConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_attempts, 25);
        assert_eq!(config.jitter_max(), Duration::from_secs(2));
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.tls, TlsPolicy::Modern);
    }

    #[test]
    fn test_toml_overrides_selected_fields() {
        let config = SicarConfig::from_toml_str(
            r#"
            max_attempts = 10
            jitter_max_ms = 0
            tls = "legacy"

            [headers]
            Accept-Language = "pt-BR"

            [solver]
            kind = "command"
            program = "/usr/local/bin/paddle-captcha"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.jitter_max(), Duration::ZERO);
        assert_eq!(config.tls, TlsPolicy::Legacy);
        assert_eq!(config.headers.get("Accept-Language").unwrap(), "pt-BR");
        assert_eq!(config.solver.kind, SolverKind::Command);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_toml_rejects_unknown_keys() {
        let err = SicarConfig::from_toml_str("max_retries = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got: {err:?}");
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let err = SicarConfig::from_toml_str("max_attempts = 0").unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field: "max_attempts", .. }),
            "got: {err:?}"
        );
    }

    #[test]
    fn test_validate_rejects_non_http_base_url() {
        let config = SicarConfig::with_base_url("ftp://example.com/publico");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "base_url", .. }));
    }

    #[test]
    fn test_validate_requires_program_for_command_solver() {
        let err = SicarConfig::from_toml_str("[solver]\nkind = \"command\"").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "solver.program",
                ..
            }
        ));
    }

    #[test]
    fn test_load_reports_missing_file_path() {
        let err = SicarConfig::load(Path::new("/nonexistent/sicar/config.toml")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("/nonexistent/sicar/config.toml"), "got: {msg}");
    }
}
