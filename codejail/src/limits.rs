//! Resource limits applied by the command runner

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits for one jailed process
///
/// Keys left out of a config table keep their `Default` values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerLimits {
    /// Wall-clock time before the process is killed, e.g. `"30s"`
    #[serde(with = "humantime_serde")]
    pub max_duration: Option<Duration>,
}

impl Default for RunnerLimits {
    fn default() -> Self {
        Self {
            max_duration: Some(Duration::from_secs(30)),
        }
    }
}

impl RunnerLimits {
    /// No time limit at all
    pub fn unlimited() -> Self {
        Self { max_duration: None }
    }

    /// Tight limits for student-submitted code
    pub fn strict() -> Self {
        Self {
            max_duration: Some(Duration::from_secs(5)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = RunnerLimits::default();
        assert_eq!(limits.max_duration, Some(Duration::from_secs(30)));
        assert!(RunnerLimits::unlimited().max_duration.is_none());
        assert_eq!(RunnerLimits::strict().max_duration, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_humantime_durations() {
        let limits: RunnerLimits = toml::from_str(r#"max_duration = "1m 30s""#).unwrap();
        assert_eq!(limits.max_duration, Some(Duration::from_secs(90)));

    }

    #[test]
    fn test_missing_duration_keeps_the_default_timeout() {
        let limits: RunnerLimits = toml::from_str("").unwrap();
        assert_eq!(limits, RunnerLimits::default());

        let command: crate::RunnerCommand = toml::from_str(
            r#"
            bin_path = "/usr/bin/python3"
            limits = {}
            "#,
        )
        .unwrap();
        assert_eq!(command.limits.max_duration, Some(Duration::from_secs(30)));
    }
}
