//! Unit status reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use blackbox_common::ScrapeJob;

/// Unit state, mirroring the states an operator reports to its platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    /// Setting up, not yet able to do anything useful.
    Maintenance,
    /// Waiting on something outside the operator's control.
    Waiting,
    /// Needs operator action.
    Blocked,
    /// Configuration applied.
    Active,
}

/// Current unit status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub state: UnitState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl UnitStatus {
    pub fn active() -> Self {
        Self {
            state: UnitState::Active,
            message: String::new(),
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self {
            state: UnitState::Blocked,
            message: message.into(),
        }
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        Self {
            state: UnitState::Waiting,
            message: message.into(),
        }
    }

    pub fn maintenance(message: impl Into<String>) -> Self {
        Self {
            state: UnitState::Maintenance,
            message: message.into(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == UnitState::Active
    }
}

impl Default for UnitStatus {
    fn default() -> Self {
        Self::maintenance("Waiting for first reconcile")
    }
}

/// Snapshot of what the operator last applied.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperatorState {
    pub status: UnitStatus,
    /// Version reported by the exporter binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload_version: Option<String>,
    /// Scrape jobs currently published for Prometheus.
    #[serde(skip)]
    pub jobs: Vec<ScrapeJob>,
    /// When the exporter configuration last changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_applied: Option<DateTime<Utc>>,
    /// The artifact was replaced but the exporter has not yet been told.
    #[serde(skip)]
    pub notify_pending: bool,
}

/// Status document served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub operator: String,
    pub version: String,
    #[serde(flatten)]
    pub state: OperatorState,
    pub jobs: usize,
}

impl StatusReport {
    pub fn new(state: OperatorState) -> Self {
        Self {
            operator: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            jobs: state.jobs.len(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_constructors() {
        assert!(UnitStatus::active().is_active());
        assert_eq!(UnitStatus::blocked("bad").state, UnitState::Blocked);
        assert_eq!(UnitStatus::default().state, UnitState::Maintenance);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&UnitStatus::waiting("no address")).unwrap();
        assert!(json.contains("\"state\":\"waiting\""));
        assert!(json.contains("\"message\":\"no address\""));

        let json = serde_json::to_string(&UnitStatus::active()).unwrap();
        assert_eq!(json, r#"{"state":"active"}"#);
    }

    #[test]
    fn test_report_flattens_state() {
        let state = OperatorState {
            status: UnitStatus::active(),
            workload_version: Some("0.24.0".to_string()),
            jobs: vec![ScrapeJob::new("a"), ScrapeJob::new("b")],
            ..Default::default()
        };

        let json = serde_json::to_value(StatusReport::new(state)).unwrap();
        assert_eq!(json["operator"], "blackbox-operator");
        assert_eq!(json["status"]["state"], "active");
        assert_eq!(json["workload_version"], "0.24.0");
        assert_eq!(json["jobs"], 2);
    }
}
