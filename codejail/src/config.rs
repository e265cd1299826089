//! Configuration for jailed execution

use crate::runner::{ProcessRunner, RunnerCommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Forces the in-process debug strategy when truthy
pub const ENV_ALWAYS_UNSAFE: &str = "CODEJAIL_ALWAYS_UNSAFE";

/// Turns on debug dumps of every generated program when truthy
pub const ENV_LOG_ALL_CODE: &str = "CODEJAIL_LOG_ALL_CODE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value {value:?} for {name}: expected a boolean")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Cannot determine config directory")]
    NoConfigDir,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Process-wide settings, read once at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodejailConfig {
    /// Run everything in-process, without isolation.
    ///
    /// Only for development machines where no jailed interpreter exists.
    #[serde(default)]
    pub always_be_unsafe: bool,

    /// Log every generated program and its stdin size at debug level
    #[serde(default)]
    pub log_all_code: bool,

    /// Interpreter commands, keyed by language
    #[serde(default)]
    pub runners: HashMap<String, RunnerCommand>,
}

impl CodejailConfig {
    /// Load configuration from `path`, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load from the default location; a missing file means defaults
    pub fn load_default() -> ConfigResult<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            return Self::load(path);
        }
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// `~/.config/codejail/config.toml` or the platform equivalent
    pub fn config_path() -> ConfigResult<PathBuf> {
        let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join("codejail").join("config.toml"))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `CODEJAIL_*` overrides using `lookup` to read variables
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_ALWAYS_UNSAFE) {
            self.always_be_unsafe = parse_flag(ENV_ALWAYS_UNSAFE, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG_ALL_CODE) {
            self.log_all_code = parse_flag(ENV_LOG_ALL_CODE, &value)?;
        }
        Ok(())
    }

    /// Configure a language's interpreter
    pub fn with_runner(mut self, language: impl Into<String>, command: RunnerCommand) -> Self {
        self.runners.insert(language.into(), command);
        self
    }

    /// Command runner for every configured language
    pub fn process_runner(&self) -> ProcessRunner {
        ProcessRunner::from_commands(self.runners.clone())
    }
}

fn parse_flag(name: &'static str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::RunnerLimits;
    use crate::runner::IsolationRunner;
    use assert_matches::assert_matches;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_safe() {
        let config = CodejailConfig::default();
        assert!(!config.always_be_unsafe);
        assert!(!config.log_all_code);
        assert!(config.runners.is_empty());
    }

    #[test]
    fn test_parse_runners() {
        let config = CodejailConfig::from_toml(
            r#"
            log_all_code = true

            [runners.python]
            bin_path = "/srv/sandbox/bin/python"
            user = "sandbox"
            limits = { max_duration = "2s" }
            "#,
        )
        .unwrap();

        assert!(config.log_all_code);
        let python = &config.runners["python"];
        assert_eq!(python.user.as_deref(), Some("sandbox"));
        assert_eq!(
            python.limits,
            RunnerLimits {
                max_duration: Some(Duration::from_secs(2))
            }
        );
        assert!(config.process_runner().is_configured("python"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CodejailConfig::default();
        config
            .apply_env_overrides(|name| match name {
                ENV_ALWAYS_UNSAFE => Some("yes".to_string()),
                _ => None,
            })
            .unwrap();
        assert!(config.always_be_unsafe);
        assert!(!config.log_all_code);

        let err = config
            .apply_env_overrides(|_| Some("maybe".to_string()))
            .unwrap_err();
        assert_matches!(err, ConfigError::InvalidEnv { .. });
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "always_be_unsafe = false\n").unwrap();
        let config = CodejailConfig::load(&path).unwrap();
        assert!(config.runners.is_empty());

        std::fs::write(&path, "always_be_unsafe = [").unwrap();
        assert_matches!(CodejailConfig::load(&path), Err(ConfigError::Parse { .. }));
        assert_matches!(
            CodejailConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        );
    }
}
