//! Prometheus scrape job model for probe jobs.
//!
//! Only the keys the operator touches are typed; everything else a user
//! writes into a scrape job is carried through untouched and in order.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// A single `relabel_configs` entry.
///
/// Kept as an opaque mapping so user rules round-trip verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelabelRule(pub Mapping);

impl RelabelRule {
    /// Rule copying `source` into `target`.
    pub fn copy(source: &str, target: &str) -> Self {
        let mut map = Mapping::new();
        map.insert(
            Value::from("source_labels"),
            Value::Sequence(vec![Value::from(source)]),
        );
        map.insert(Value::from("target_label"), Value::from(target));
        Self(map)
    }

    /// Rule setting `target` to a fixed `replacement`.
    pub fn replace(target: &str, replacement: &str) -> Self {
        let mut map = Mapping::new();
        map.insert(Value::from("target_label"), Value::from(target));
        map.insert(Value::from("replacement"), Value::from(replacement));
        Self(map)
    }

    /// The label this rule writes to, if any.
    pub fn target_label(&self) -> Option<&str> {
        self.0.get("target_label").and_then(Value::as_str)
    }

    /// The `replacement` value, if any.
    pub fn replacement(&self) -> Option<&str> {
        self.0.get("replacement").and_then(Value::as_str)
    }
}

/// A `static_configs` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticConfig {
    #[serde(default, deserialize_with = "string_list")]
    pub targets: Vec<String>,

    #[serde(
        default,
        deserialize_with = "string_map",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub labels: IndexMap<String, String>,
}

impl StaticConfig {
    pub fn new(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            labels: IndexMap::new(),
        }
    }
}

/// Prometheus reads any YAML scalar where it expects a string.
fn scalar_to_string<E: serde::de::Error>(value: Value) -> std::result::Result<String, E> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(E::custom(format!("expected a scalar, got {:?}", other))),
    }
}

fn scalars<E: serde::de::Error>(value: Value) -> std::result::Result<Vec<String>, E> {
    match value {
        Value::Sequence(items) => items.into_iter().map(scalar_to_string).collect(),
        Value::Null => Ok(Vec::new()),
        scalar => Ok(vec![scalar_to_string(scalar)?]),
    }
}

fn string_list<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
    scalars(Value::deserialize(d)?)
}

fn string_map<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<IndexMap<String, String>, D::Error> {
    Option::<IndexMap<String, Value>>::deserialize(d)?
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| Ok((key, scalar_to_string(value)?)))
        .collect()
}

fn string_lists<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<IndexMap<String, Vec<String>>, D::Error> {
    Option::<IndexMap<String, Value>>::deserialize(d)?
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| Ok((key, scalars(value)?)))
        .collect()
}

/// A Prometheus scrape job describing one set of probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJob {
    /// Unique job name.
    pub job_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_path: Option<String>,

    /// Probe parameters, usually `module: [http_2xx]`.
    #[serde(
        default,
        deserialize_with = "string_lists",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub params: IndexMap<String, Vec<String>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_configs: Vec<StaticConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relabel_configs: Vec<RelabelRule>,

    /// Any other scrape keys (scrape_interval, scheme, ...).
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ScrapeJob {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            metrics_path: None,
            params: IndexMap::new(),
            static_configs: Vec::new(),
            relabel_configs: Vec::new(),
            extra: IndexMap::new(),
        }
    }

    /// Set the blackbox module(s) this job probes with.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.params
            .entry("module".to_string())
            .or_default()
            .push(module.into());
        self
    }

    pub fn with_targets(mut self, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.static_configs.push(StaticConfig::new(targets));
        self
    }

    /// Modules referenced by `params.module`.
    pub fn modules(&self) -> &[String] {
        self.params.get("module").map(Vec::as_slice).unwrap_or(&[])
    }

    /// All probe targets across static configs.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.static_configs
            .iter()
            .flat_map(|sc| sc.targets.iter().map(String::as_str))
    }
}

/// The user-supplied probes document: `{ scrape_configs: [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbesSpec {
    #[serde(default)]
    pub scrape_configs: Vec<ScrapeJob>,
}

impl ProbesSpec {
    /// Parse a probes document.
    ///
    /// An empty document yields no jobs. Job names must be unique.
    pub fn parse(content: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid probes YAML: {}", e)))?;

        if value.is_null() {
            return Ok(Self::default());
        }

        let spec: ProbesSpec = serde_yaml::from_value(value)
            .map_err(|e| Error::Config(format!("Invalid probes document: {}", e)))?;
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for job in &self.scrape_configs {
            if job.job_name.is_empty() {
                return Err(Error::Config("Probe job_name must not be empty".to_string()));
            }
            if !seen.insert(job.job_name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate probe job_name: {}",
                    job.job_name
                )));
            }
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
