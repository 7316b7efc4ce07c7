use thiserror::Error;

/// Common error type for the Blackbox Exporter operator crates.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid endpoint: {0}")]
    Endpoint(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
