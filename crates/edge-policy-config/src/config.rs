// crates/edge-policy-config/src/config.rs
// ============================================================================
// Module: Configuration Model
// Description: TOML configuration for the checker and the command line.
// Purpose: Load, bound, and validate configuration before anything runs.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! [`EdgePolicyConfig`] is resolved from an explicit path, then the
//! [`CONFIG_ENV_VAR`] environment variable, then [`DEFAULT_CONFIG_NAME`] in
//! the working directory. Only the default file may be missing, in which
//! case defaults apply.
//! Security posture: configuration is untrusted input. Paths and file sizes
//! are bounded, content must be UTF-8, and unknown keys are rejected.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits and Defaults
// ============================================================================

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "EDGE_POLICY_CONFIG";
/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_NAME: &str = "edge-policy.toml";
/// Largest accepted configuration file.
pub const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;
/// Longest accepted configuration path.
const MAX_PATH_LENGTH: usize = 4096;
/// Longest accepted path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Accepted log levels.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// The file is not valid TOML for the model.
    #[error("config parse error: {0}")]
    Parse(String),
    /// The file or a value breaks a rule.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Model
// ============================================================================

/// Constraint language selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintsConfig {
    /// Language name; `None` picks the first registered language that
    /// validates.
    #[serde(default)]
    pub language: Option<String>,
}

/// Compatibility check behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckConfig {
    /// Check every service instead of stopping at the first compatible one.
    #[serde(default)]
    pub check_all_services: bool,
    /// Agreement bot url used to verify bound secrets exist.
    #[serde(default)]
    pub agbot_url: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

/// Default log level.
fn default_log_level() -> String {
    "info".to_string()
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgePolicyConfig {
    /// Constraint language selection.
    #[serde(default)]
    pub constraints: ConstraintsConfig,
    /// Check behaviour.
    #[serde(default)]
    pub check: CheckConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl EdgePolicyConfig {
    /// Resolves, loads and validates the configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated, or when an explicitly named file is missing.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match std::env::var(CONFIG_ENV_VAR) {
                Ok(value) if !value.trim().is_empty() => (PathBuf::from(value), true),
                _ => (PathBuf::from(DEFAULT_CONFIG_NAME), false),
            },
        };
        validate_path(&path)?;
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let metadata = fs::metadata(&path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let bytes = fs::read(&path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let content =
            String::from_utf8(bytes).map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values the model cannot express.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for an unknown log level, a blank
    /// language name, or a blank or non-http(s) agbot url.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {}, got {}",
                LOG_LEVELS.join(", "),
                self.logging.level
            )));
        }
        if let Some(language) = &self.constraints.language
            && language.trim().is_empty()
        {
            return Err(ConfigError::Invalid("constraints.language must not be blank".to_string()));
        }
        if let Some(url) = &self.check.agbot_url {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid("check.agbot_url must not be blank".to_string()));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!("check.agbot_url must be an http(s) url, got {url}")));
            }
        }
        Ok(())
    }
}

/// Bounds the total path length and each component.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().len() > MAX_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH) {
        return Err(ConfigError::Invalid("config path component too long".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    /// Tests empty text yields defaults.
    #[test]
    fn empty_text_yields_defaults() {
        let config = EdgePolicyConfig::from_toml_str("").unwrap();
        assert_eq!(config, EdgePolicyConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(!config.check.check_all_services);
    }

    /// Tests unknown keys are rejected.
    #[test]
    fn unknown_keys_are_rejected() {
        let err = EdgePolicyConfig::from_toml_str("[check]\nsurprise = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    /// Tests values are validated.
    #[test]
    fn values_are_validated() {
        for text in [
            "[logging]\nlevel = \"loud\"\n",
            "[constraints]\nlanguage = \"  \"\n",
            "[check]\nagbot_url = \"ftp://agbot\"\n",
        ] {
            let err = EdgePolicyConfig::from_toml_str(text).unwrap_err();
            assert!(err.to_string().starts_with("invalid config: "), "{err}");
        }
        let config = EdgePolicyConfig::from_toml_str(
            "[check]\ncheck_all_services = true\nagbot_url = \"https://agbot:8083\"\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.check.agbot_url.as_deref(), Some("https://agbot:8083"));
    }
}
