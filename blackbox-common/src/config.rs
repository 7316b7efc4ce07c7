use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Where an operator-supplied document comes from.
///
/// In JSON5 this is written either as `{ inline: "..." }` or
/// `{ file: "/path/to/doc.yml" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    /// The document text itself.
    Inline(String),
    /// A path to read the document from.
    File(PathBuf),
}

impl DocumentSource {
    /// Resolve the source to its text content.
    pub fn read(&self) -> Result<String> {
        match self {
            DocumentSource::Inline(text) => Ok(text.clone()),
            DocumentSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!(
                    "Failed to read document '{}': {}",
                    path.display(),
                    e
                ))
            }),
        }
    }
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}
