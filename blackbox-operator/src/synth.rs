//! Config synthesis.
//!
//! [`synthesize`] is a pure function of the operator inputs, the related
//! applications' probe data and the exporter endpoint. It produces the
//! exporter configuration document and the final probe scrape jobs. Calling
//! it twice with the same inputs yields byte-identical output, and feeding
//! its own output back in as the probes document changes nothing.

use indexmap::IndexMap;
use serde_yaml::Value;
use thiserror::Error;
use tracing::{debug, warn};

use blackbox_common::{
    ExporterConfig, ProbesRelationData, ProbesSpec, RelabelRule, RelationEndpoint, ScrapeJob,
};

/// Labels whose relabel rules the operator owns.
pub const MANAGED_LABELS: [&str; 4] = ["__param_target", "instance", "probe_target", "__address__"];

/// Name of the exporter's self-monitoring job.
pub const SELF_JOB_NAME: &str = "blackbox-exporter";

/// Synthesis failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    /// Malformed or missing operator input. Needs operator action.
    #[error("{0}")]
    Configuration(String),

    /// No exporter endpoint is known yet; synthesis is deferred.
    #[error("{0}")]
    RelationUnavailable(String),
}

impl From<blackbox_common::Error> for SynthesisError {
    fn from(e: blackbox_common::Error) -> Self {
        match e {
            blackbox_common::Error::Config(msg) => SynthesisError::Configuration(msg),
            other => SynthesisError::Configuration(other.to_string()),
        }
    }
}

/// Raw inputs for one synthesis run.
#[derive(Debug, Clone, Default)]
pub struct SynthesisInputs {
    /// Exporter configuration document; the built-in default when absent.
    pub exporter_config: Option<String>,
    /// Probes document; no file probes when absent.
    pub probes: Option<String>,
    /// Probe data from related applications, in relation order.
    pub relations: Vec<ProbesRelationData>,
}

/// Output of a successful synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    /// The complete exporter configuration document.
    pub config: String,
    /// Probe jobs rewritten to scrape through the exporter.
    pub probes: Vec<ScrapeJob>,
}

impl Synthesis {
    /// The probe jobs as a `scrape_configs` YAML document.
    pub fn probes_document(&self) -> Result<String, SynthesisError> {
        ProbesSpec {
            scrape_configs: self.probes.clone(),
        }
        .to_yaml()
        .map_err(SynthesisError::from)
    }
}

/// Build the exporter config and probe jobs.
///
/// Inputs are validated before the endpoint is looked at, so malformed
/// input is always reported as a configuration error.
pub fn synthesize(
    inputs: &SynthesisInputs,
    endpoint: Option<&RelationEndpoint>,
) -> Result<Synthesis, SynthesisError> {
    let exporter_config = match inputs.exporter_config.as_deref() {
        Some(text) if !text.trim().is_empty() => ExporterConfig::parse(text),
        _ => ExporterConfig::builtin(),
    }?;

    let file_probes = match inputs.probes.as_deref() {
        Some(text) => ProbesSpec::parse(text),
        None => Ok(ProbesSpec::default()),
    }?;

    let endpoint = endpoint.ok_or_else(|| {
        SynthesisError::RelationUnavailable("Waiting for exporter address".to_string())
    })?;

    let modules = relation_modules(&inputs.relations);
    let config = exporter_config
        .render_with_modules(modules.iter().map(|(name, module)| (name.as_str(), module)))?;

    let mut probes = merge_probes(file_probes.scrape_configs, &inputs.relations);
    for job in &mut probes {
        relabel(job, endpoint);
    }

    debug!(
        jobs = probes.len(),
        extra_modules = modules.len(),
        endpoint = %endpoint,
        "Synthesized exporter configuration"
    );

    Ok(Synthesis { config, probes })
}

/// Merge file probes with relation probes.
///
/// A relation job replaces a file job of the same name in place; new relation
/// jobs are appended in relation order.
pub fn merge_probes(file: Vec<ScrapeJob>, relations: &[ProbesRelationData]) -> Vec<ScrapeJob> {
    let mut merged: IndexMap<String, ScrapeJob> = file
        .into_iter()
        .map(|job| (job.job_name.clone(), job))
        .collect();

    for job in relations.iter().flat_map(|r| r.scrape_probes.iter()) {
        if merged.insert(job.job_name.clone(), job.clone()).is_some() {
            warn!(job = %job.job_name, "Relation probe overrides probe of the same name");
        }
    }

    merged.into_values().collect()
}

/// Modules defined by related applications; later applications win.
fn relation_modules(relations: &[ProbesRelationData]) -> IndexMap<String, Value> {
    let mut modules = IndexMap::new();
    for relation in relations {
        for (name, module) in &relation.scrape_modules {
            modules.insert(name.clone(), module.clone());
        }
    }
    modules
}

fn is_managed(rule: &RelabelRule) -> bool {
    rule.target_label()
        .is_some_and(|label| MANAGED_LABELS.contains(&label))
}

/// Rewrite a probe job to be scraped through the exporter at `endpoint`.
///
/// Existing rules targeting a managed label are dropped. The managed rules
/// wrap the remaining user rules, which keep their order: the target copies
/// come first so user rules can use `__param_target`, and the address
/// rewrite comes last.
pub fn relabel(job: &mut ScrapeJob, endpoint: &RelationEndpoint) {
    let user_rules: Vec<RelabelRule> = job
        .relabel_configs
        .drain(..)
        .filter(|rule| !is_managed(rule))
        .collect();

    let mut rules = Vec::with_capacity(user_rules.len() + MANAGED_LABELS.len());
    rules.push(RelabelRule::copy("__address__", "__param_target"));
    rules.push(RelabelRule::copy("__param_target", "instance"));
    rules.push(RelabelRule::copy("__param_target", "probe_target"));
    rules.extend(user_rules);
    rules.push(RelabelRule::replace("__address__", &endpoint.address()));

    job.relabel_configs = rules;
    job.metrics_path = Some(endpoint.probe_path());
}

/// The job Prometheus uses to scrape the exporter's own metrics.
///
/// `target` is the in-cluster address; the path follows `external`.
pub fn self_monitoring_job(target: &RelationEndpoint, external: &RelationEndpoint) -> ScrapeJob {
    let mut job = ScrapeJob::new(SELF_JOB_NAME).with_targets([target.address()]);
    job.metrics_path = Some(external.metrics_path());
    job
}
