use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ThreadError;
use crate::thread::{Mode, Priority, ThreadOptions};

/// Interval value meaning "no sleep between iterations".
pub const NO_INTERVAL: i64 = -1;

/// Per-thread configuration, loadable from TOML.
///
/// ```toml
/// name = "poller"
/// repeat = true
/// interval_ms = 250
/// priority = "below_normal"
/// register = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// OS thread name
    pub name: Option<String>,
    /// Run the work function in a loop until stopped
    pub repeat: bool,
    /// Sleep after each iteration; -1 disables the sleep
    pub interval_ms: i64,
    /// Advisory scheduling hint
    pub priority: Priority,
    /// Add the thread to the process-wide registry
    pub register: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            name: None,
            repeat: true,
            interval_ms: NO_INTERVAL,
            priority: Priority::Normal,
            register: true,
        }
    }
}

impl ThreadConfig {
    /// Load configuration from a TOML file; defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ThreadConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ThreadError> {
        self.interval().map(|_| ())
    }

    /// Inter-iteration sleep; `None` for the -1 sentinel.
    pub fn interval(&self) -> Result<Option<Duration>, ThreadError> {
        match self.interval_ms {
            NO_INTERVAL => Ok(None),
            ms if ms < 0 => Err(ThreadError::InvalidInterval(ms)),
            ms => Ok(Some(Duration::from_millis(ms as u64))),
        }
    }

    pub fn mode(&self) -> Result<Mode, ThreadError> {
        if self.repeat {
            Ok(Mode::Repeat {
                interval: self.interval()?,
            })
        } else {
            Ok(Mode::Once)
        }
    }

    pub fn options(&self) -> ThreadOptions {
        ThreadOptions {
            name: self.name.clone(),
            priority: self.priority,
            register: self.register,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_repeat_without_interval() {
        let config = ThreadConfig::default();
        assert_eq!(config.mode().unwrap(), Mode::Repeat { interval: None });
        assert!(config.options().register);
    }

    #[test]
    fn parses_partial_toml() {
        let config = ThreadConfig::from_toml_str(
            r#"
            name = "poller"
            interval_ms = 250
            priority = "below_normal"
            "#,
        )
        .unwrap();
        assert_eq!(config.name.as_deref(), Some("poller"));
        assert_eq!(config.priority, Priority::BelowNormal);
        assert_eq!(
            config.mode().unwrap(),
            Mode::Repeat {
                interval: Some(Duration::from_millis(250))
            }
        );
    }

    #[test]
    fn run_once_ignores_interval() {
        let config = ThreadConfig {
            repeat: false,
            interval_ms: 10,
            ..Default::default()
        };
        assert_eq!(config.mode().unwrap(), Mode::Once);
    }

    #[test]
    fn zero_interval_is_valid() {
        let config = ThreadConfig {
            interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.interval().unwrap(), Some(Duration::ZERO));
    }

    #[test]
    fn negative_non_sentinel_interval_is_rejected() {
        let err = ThreadConfig::from_toml_str("interval_ms = -5").unwrap_err();
        assert!(err.to_string().contains("-5"));

        let config = ThreadConfig {
            interval_ms: -2,
            ..Default::default()
        };
        assert!(matches!(config.mode(), Err(ThreadError::InvalidInterval(-2))));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ThreadConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ThreadConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads").join("worker.toml");
        let config = ThreadConfig {
            name: Some("worker".into()),
            repeat: false,
            interval_ms: 5,
            priority: Priority::Highest,
            register: false,
        };
        config.save(&path).unwrap();
        assert_eq!(ThreadConfig::load(&path).unwrap(), config);
    }
}
