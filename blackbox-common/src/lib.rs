//! Blackbox Exporter operator common library.
//!
//! This crate provides the document model shared by the operator and by
//! applications that relate to it:
//!
//! - [`exporter`] - The exporter's own configuration document
//! - [`scrape`] - Probe scrape jobs and relabel rules
//! - [`endpoint`] - The exporter address Prometheus scrapes through
//! - [`relation`] - Probe provider relation data and topology prefixing
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`error`] - Error types

pub mod config;
pub mod endpoint;
pub mod error;
pub mod exporter;
pub mod relation;
pub mod scrape;

// Re-export commonly used types at the crate root
pub use config::{DocumentSource, LogFormat, LoggingConfig, parse_config};
pub use endpoint::{DEFAULT_PORT, RelationEndpoint};
pub use error::{Error, Result};
pub use exporter::{DEFAULT_EXPORTER_CONFIG, ExporterConfig};
pub use relation::{ProbesProvider, ProbesRelationData, Topology};
pub use scrape::{ProbesSpec, RelabelRule, ScrapeJob, StaticConfig};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
