//! Logger configuration.

use crate::template::MissingTokenPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_format() -> String {
    "default".to_string()
}

/// Declarative logger configuration, deserializable from whatever config
/// source the host application uses.
///
/// Everything here has a programmatic equivalent on
/// [`Builder`](crate::middleware::Builder).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Name of the format to render, resolved in the format registry.
    #[serde(default = "default_format")]
    pub format: String,
    /// Log file path. `None` (or empty) means standard output.
    pub output: Option<PathBuf>,
    /// Base directory that relative `output` paths resolve against.
    pub base_dir: Option<PathBuf>,
    /// Buffer flush interval in milliseconds. `None` disables buffering.
    pub buffer_ms: Option<u64>,
    /// Behavior when a template references an unregistered token.
    pub missing_tokens: MissingTokenPolicy,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            output: None,
            base_dir: None,
            buffer_ms: None,
            missing_tokens: MissingTokenPolicy::default(),
        }
    }
}

impl LoggerConfig {
    /// Buffer interval as a `Duration`, if buffering is enabled.
    pub fn buffer_interval(&self) -> Option<Duration> {
        self.buffer_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoggerConfig::default();
        assert_eq!(config.format, "default");
        assert!(config.output.is_none());
        assert!(config.buffer_interval().is_none());
        assert_eq!(config.missing_tokens, MissingTokenPolicy::Strict);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LoggerConfig = serde_json::from_str(
            r#"{ "output": "logs/access.log", "buffer_ms": 500, "missing_tokens": "placeholder" }"#,
        )
        .unwrap();
        assert_eq!(config.format, "default");
        assert_eq!(config.buffer_interval().unwrap(), Duration::from_millis(500));
        assert_eq!(config.missing_tokens, MissingTokenPolicy::Placeholder);
        assert_eq!(config.output.unwrap(), PathBuf::from("logs/access.log"));
    }
}
