//! Retention configuration.
//!
//! Resolution order, later wins:
//! 1. Built-in defaults (keep 1 day, orphan after 24 hours)
//! 2. `<root>/config.json`
//! 3. `RUNLOG_KEEP_DAYS`
//!
//! Bad values never fail a command; they fall back to whatever the previous
//! layer produced and log a warning.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::StorageConfig;

/// Environment variable holding the keep-duration in days.
pub const KEEP_DAYS_ENV: &str = "RUNLOG_KEEP_DAYS";

pub const DEFAULT_KEEP_DAYS: u32 = 1;
pub const DEFAULT_STALE_AFTER_HOURS: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Days a completed session's log survives. `0` deletes it at completion.
    pub keep_days: u32,
    /// Hours after which a session still marked active is considered orphaned.
    pub stale_after_hours: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_days: DEFAULT_KEEP_DAYS,
            stale_after_hours: DEFAULT_STALE_AFTER_HOURS,
        }
    }
}

impl RetentionConfig {
    /// Loads config.json under the storage root, then applies the environment.
    pub fn load(storage: &StorageConfig) -> Self {
        let file_content = fs_err::read_to_string(storage.config_file()).ok();
        let env_value = std::env::var(KEEP_DAYS_ENV).ok();
        Self::from_sources(file_content.as_deref(), env_value.as_deref())
    }

    pub fn from_sources(file_content: Option<&str>, env_keep_days: Option<&str>) -> Self {
        let mut config = match file_content.map(str::trim).filter(|c| !c.is_empty()) {
            Some(content) => serde_json::from_str(content).unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring malformed config.json");
                RetentionConfig::default()
            }),
            None => RetentionConfig::default(),
        };

        if let Some(raw) = env_keep_days {
            match parse_keep_days(raw) {
                Some(days) => config.keep_days = days,
                None => warn!(value = %raw, "Ignoring invalid {}", KEEP_DAYS_ENV),
            }
        }

        config
    }

    /// Whether a completed session's log should outlive its completion.
    pub fn archives(&self) -> bool {
        self.keep_days > 0
    }

    pub fn keep_duration(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.keep_days))
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.stale_after_hours))
    }
}

fn parse_keep_days(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RetentionConfig::from_sources(None, None);
        assert_eq!(config.keep_days, 1);
        assert_eq!(config.stale_after_hours, 24);
        assert!(config.archives());
    }

    #[test]
    fn test_env_overrides_file() {
        let config = RetentionConfig::from_sources(Some(r#"{"keep_days": 7}"#), Some("0"));
        assert_eq!(config.keep_days, 0);
        assert!(!config.archives());
    }

    #[test]
    fn test_file_sets_both_fields() {
        let config = RetentionConfig::from_sources(
            Some(r#"{"keep_days": 3, "stale_after_hours": 2}"#),
            None,
        );
        assert_eq!(config.keep_days, 3);
        assert_eq!(config.stale_after_hours, 2);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = RetentionConfig::from_sources(Some(r#"{"stale_after_hours": 6}"#), None);
        assert_eq!(config.keep_days, DEFAULT_KEEP_DAYS);
        assert_eq!(config.stale_after_hours, 6);
    }

    #[test]
    fn test_invalid_env_falls_back() {
        let config = RetentionConfig::from_sources(None, Some("-3"));
        assert_eq!(config.keep_days, DEFAULT_KEEP_DAYS);
        let config = RetentionConfig::from_sources(None, Some("soon"));
        assert_eq!(config.keep_days, DEFAULT_KEEP_DAYS);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let config = RetentionConfig::from_sources(Some("{not json"), Some(" 5 "));
        assert_eq!(config.keep_days, 5);
        assert_eq!(config.stale_after_hours, DEFAULT_STALE_AFTER_HOURS);
    }
}
