//! Error types for the operator.

use std::path::PathBuf;

use thiserror::Error;

use crate::status::UnitStatus;
use crate::synth::SynthesisError;
use crate::workload::WorkloadError;

/// Errors that can occur while reconciling.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Synthesis failed (configuration or missing endpoint).
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// Ingress or advertised address is not a usable URL.
    #[error("Invalid external url: '{0}'; must include scheme and hostname.")]
    InvalidExternalUrl(String),

    /// Relation data could not be read.
    #[error("Invalid relation data: {0}")]
    RelationData(String),

    /// An artifact could not be written.
    #[error("Failed to write {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The exporter did not pick up the new configuration.
    #[error(transparent)]
    Workload(#[from] WorkloadError),

    /// Nothing has been applied yet.
    #[error("Not ready: {0}")]
    NotReady(String),
}

impl OperatorError {
    pub fn artifact(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Artifact {
            path: path.into(),
            source,
        }
    }

    /// Unit status to report for this failure.
    pub fn status(&self) -> UnitStatus {
        match self {
            OperatorError::Synthesis(SynthesisError::RelationUnavailable(msg)) => {
                UnitStatus::waiting(msg.clone())
            }
            OperatorError::NotReady(msg) => UnitStatus::maintenance(msg.clone()),
            other => UnitStatus::blocked(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::UnitState;

    #[test]
    fn test_status_mapping() {
        let err = OperatorError::from(SynthesisError::Configuration(
            "Failed to load config; invalid YAML".to_string(),
        ));
        let status = err.status();
        assert_eq!(status.state, UnitState::Blocked);
        assert_eq!(status.message, "Failed to load config; invalid YAML");

        let err = OperatorError::from(SynthesisError::RelationUnavailable("no address".into()));
        assert_eq!(err.status().state, UnitState::Waiting);

        let err = OperatorError::from(WorkloadError::ConfigUpdateFailure);
        assert_eq!(
            err.status(),
            UnitStatus::blocked("Is config valid? hot reload and service restart failed.")
        );

        let err = OperatorError::InvalidExternalUrl("ftp://x".to_string());
        assert_eq!(
            err.status().message,
            "Invalid external url: 'ftp://x'; must include scheme and hostname."
        );
    }
}
