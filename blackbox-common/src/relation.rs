//! Data exchanged over the `blackbox-probes` relation.
//!
//! Applications that want endpoints probed publish [`ProbesRelationData`];
//! [`ProbesProvider`] builds it with every job and module name prefixed by
//! the provider's topology, so several applications can relate to the same
//! exporter without name clashes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::scrape::ScrapeJob;

/// Identity of a related application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub model: String,
    pub model_uuid: String,
    pub application: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charm_name: Option<String>,
}

impl Topology {
    pub fn new(
        model: impl Into<String>,
        model_uuid: impl Into<String>,
        application: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            model_uuid: model_uuid.into(),
            application: application.into(),
            unit: None,
            charm_name: None,
        }
    }

    /// `<model>_<model_uuid>_<application>`.
    pub fn identifier(&self) -> String {
        format!("{}_{}_{}", self.model, self.model_uuid, self.application)
    }

    /// Prefix applied to provider job and module names.
    pub fn name_prefix(&self) -> String {
        format!("juju_{}_", self.identifier())
    }
}

/// Application data published by one probes provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbesRelationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_metadata: Option<Topology>,

    #[serde(default)]
    pub scrape_probes: Vec<ScrapeJob>,

    #[serde(default)]
    pub scrape_modules: IndexMap<String, Value>,
}

/// Builds relation data for an application exposing endpoints to probe.
#[derive(Debug, Clone)]
pub struct ProbesProvider {
    topology: Topology,
    probes: Vec<ScrapeJob>,
    modules: IndexMap<String, Value>,
}

impl ProbesProvider {
    pub fn new(
        topology: Topology,
        probes: Vec<ScrapeJob>,
        modules: IndexMap<String, Value>,
    ) -> Self {
        let prefix = topology.name_prefix();

        let probes = probes
            .into_iter()
            .map(|mut probe| {
                probe.job_name = if probe.job_name.is_empty() {
                    prefix.trim_end_matches('_').to_string()
                } else {
                    format!("{}{}", prefix, probe.job_name)
                };
                if let Some(referenced) = probe.params.get_mut("module") {
                    for module in referenced.iter_mut() {
                        if modules.contains_key(module.as_str()) {
                            *module = format!("{}{}", prefix, module);
                        }
                    }
                }
                probe
            })
            .collect();

        let modules = modules
            .into_iter()
            .map(|(name, module)| (format!("{}{}", prefix, name), module))
            .collect();

        Self {
            topology,
            probes,
            modules,
        }
    }

    pub fn probes(&self) -> &[ScrapeJob] {
        &self.probes
    }

    pub fn modules(&self) -> &IndexMap<String, Value> {
        &self.modules
    }

    /// The data to publish on the relation.
    pub fn relation_data(&self) -> ProbesRelationData {
        ProbesRelationData {
            scrape_metadata: Some(self.topology.clone()),
            scrape_probes: self.probes.clone(),
            scrape_modules: self.modules.clone(),
        }
    }
}
