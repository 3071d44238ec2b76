use crate::error::{ReconcileError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Timings and endpoints of the reconciliation workflow.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileConfig {
    /// Delay from `processing` to `waiting`.
    pub waiting_after_ms: u64,
    /// Delay from `waiting` to `checking` and the first verification attempt.
    pub checking_after_ms: u64,
    pub attempt_interval_ms: u64,
    pub max_attempts: u32,
    /// How long the `error` state is shown before resetting to `idle`.
    pub error_reset_ms: u64,
    pub window_inspect_interval_ms: u64,
    pub verify_timeout_ms: u64,
    pub verify_url: Option<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            waiting_after_ms: 3_000,
            checking_after_ms: 2_000,
            attempt_interval_ms: 3_000,
            max_attempts: 6,
            error_reset_ms: 3_000,
            window_inspect_interval_ms: 1_000,
            verify_timeout_ms: 10_000,
            verify_url: None,
        }
    }
}

impl ReconcileConfig {
    /// Loads and validates a JSON config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ReconcileError::Config(
                "maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.window_inspect_interval_ms == 0 {
            return Err(ReconcileError::Config(
                "windowInspectIntervalMs must be positive".to_string(),
            ));
        }
        if self.verify_timeout_ms == 0 {
            return Err(ReconcileError::Config(
                "verifyTimeoutMs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn waiting_after(&self) -> Duration {
        Duration::from_millis(self.waiting_after_ms)
    }

    pub fn checking_after(&self) -> Duration {
        Duration::from_millis(self.checking_after_ms)
    }

    pub fn attempt_interval(&self) -> Duration {
        Duration::from_millis(self.attempt_interval_ms)
    }

    pub fn error_reset(&self) -> Duration {
        Duration::from_millis(self.error_reset_ms)
    }

    pub fn window_inspect_interval(&self) -> Duration {
        Duration::from_millis(self.window_inspect_interval_ms)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_checkout_timetable() {
        let config = ReconcileConfig::default();
        assert_eq!(config.waiting_after(), Duration::from_secs(3));
        assert_eq!(config.checking_after(), Duration::from_secs(2));
        assert_eq!(config.attempt_interval(), Duration::from_secs(3));
        assert_eq!(config.max_attempts, 6);
        assert_eq!(config.error_reset(), Duration::from_secs(3));
        assert_eq!(config.window_inspect_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"maxAttempts": 2, "verifyUrl": "http://localhost/verify"}}"#).unwrap();

        let config = ReconcileConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.verify_url.as_deref(), Some("http://localhost/verify"));
        assert_eq!(config.attempt_interval_ms, 3_000);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"maxAttempts": 0}}"#).unwrap();

        assert!(matches!(
            ReconcileConfig::from_file(file.path()),
            Err(ReconcileError::Config(_))
        ));
    }
}
