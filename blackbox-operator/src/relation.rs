//! Relation data read from, and published to, the surrounding platform.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use blackbox_common::{ProbesRelationData, ScrapeJob, Topology};

use crate::error::OperatorError;

/// One related probes provider as delivered by the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct RelatedApp {
    /// Remote application name.
    pub app: String,
    /// Raw application data; validated per application.
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Current relation data.
///
/// ```json
/// {
///   "ingress_url": "http://traefik/cos-blackbox",
///   "probes": [
///     { "app": "webapp", "scrape_probes": [...], "scrape_modules": {...} }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationState {
    /// URL under which the exporter is reachable from outside, if ingress is related.
    #[serde(default)]
    pub ingress_url: Option<String>,

    /// Related probes providers, in relation order.
    #[serde(default)]
    pub probes: Vec<RelatedApp>,
}

impl RelationState {
    /// Load relation data; a missing file means nothing is related.
    pub fn load(path: &Path) -> Result<Self, OperatorError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(OperatorError::RelationData(format!(
                    "cannot read '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            OperatorError::RelationData(format!("cannot parse '{}': {}", path.display(), e))
        })
    }

    /// Probe data of every provider whose data is valid.
    ///
    /// Providers sending malformed data are skipped so one broken relation
    /// does not block probes from the others.
    pub fn probes_data(&self) -> Vec<ProbesRelationData> {
        self.probes
            .iter()
            .filter_map(|related| {
                match serde_json::from_value::<ProbesRelationData>(related.data.clone()) {
                    Ok(data) => Some(data),
                    Err(e) => {
                        warn!(app = %related.app, error = %e, "Ignoring invalid probes relation data");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Scrape jobs published for the monitoring side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_metadata: Option<Topology>,
    pub scrape_jobs: Vec<ScrapeJob>,
}

impl Publication {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}
