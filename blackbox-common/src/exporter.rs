//! The Blackbox Exporter's own configuration document.

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// Configuration used when the operator supplies none.
pub const DEFAULT_EXPORTER_CONFIG: &str = r#"modules:
  http_2xx:
    prober: http
  http_post_2xx:
    prober: http
    http:
      method: POST
  tcp_connect:
    prober: tcp
  icmp:
    prober: icmp
"#;

/// A validated exporter configuration document.
///
/// The text is kept as supplied; it is only re-rendered when modules from
/// related applications have to be added.
#[derive(Debug, Clone, PartialEq)]
pub struct ExporterConfig {
    raw: String,
    document: Mapping,
}

impl ExporterConfig {
    /// Parse and validate an exporter configuration.
    ///
    /// The document must be a YAML mapping. An empty document is accepted and
    /// treated as an empty mapping.
    pub fn parse(content: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to load config; invalid YAML: {}", e)))?;

        let document = match value {
            Value::Null => Mapping::new(),
            Value::Mapping(map) => map,
            other => {
                return Err(Error::Config(format!(
                    "Exporter config must be a mapping, got {}",
                    kind(&other)
                )));
            }
        };

        if let Some(modules) = document.get("modules") {
            if !modules.is_mapping() && !modules.is_null() {
                return Err(Error::Config(
                    "Exporter config 'modules' must be a mapping".to_string(),
                ));
            }
        }

        Ok(Self {
            raw: content.to_string(),
            document,
        })
    }

    /// The built-in default configuration.
    pub fn builtin() -> Result<Self> {
        Self::parse(DEFAULT_EXPORTER_CONFIG)
    }

    /// Names of the modules defined by this document.
    pub fn module_names(&self) -> Vec<&str> {
        match self.document.get("modules") {
            Some(Value::Mapping(modules)) => modules.keys().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn has_module(&self, name: &str) -> bool {
        matches!(self.document.get("modules"), Some(Value::Mapping(m)) if m.contains_key(name))
    }

    /// Render the final document with `extra` modules appended.
    ///
    /// Modules already defined in this document win over `extra`. When no
    /// module is added the supplied text is returned unchanged.
    pub fn render_with_modules<'a, I>(&self, extra: I) -> Result<String>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let additions: Vec<_> = extra
            .into_iter()
            .filter(|(name, _)| !self.has_module(name))
            .collect();

        if additions.is_empty() {
            return Ok(self.raw.clone());
        }

        let mut document = self.document.clone();
        let modules = document
            .entry(Value::from("modules"))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if modules.is_null() {
            *modules = Value::Mapping(Mapping::new());
        }
        if let Value::Mapping(modules) = modules {
            for (name, module) in additions {
                modules.insert(Value::from(name), module.clone());
            }
        }

        Ok(serde_yaml::to_string(&document)?)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_parses() {
        let config = ExporterConfig::parse(DEFAULT_EXPORTER_CONFIG).unwrap();
        assert_eq!(
            config.module_names(),
            vec!["http_2xx", "http_post_2xx", "tcp_connect", "icmp"]
        );
        assert_eq!(ExporterConfig::builtin().unwrap(), config);
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let err = ExporterConfig::parse("some: -   malformed yaml: [").unwrap_err();
        assert!(err.to_string().contains("invalid YAML"));
    }

    #[test]
    fn test_non_mapping_rejected() {
        let err = ExporterConfig::parse("- a\n- b\n").unwrap_err();
        assert!(err.to_string().contains("must be a mapping, got a sequence"));

        let err = ExporterConfig::parse("modules: [a]").unwrap_err();
        assert!(err.to_string().contains("'modules' must be a mapping"));
    }

    #[test]
    fn test_empty_document_accepted() {
        let config = ExporterConfig::parse("").unwrap();
        assert!(config.module_names().is_empty());
    }

    #[test]
    fn test_render_without_additions_is_verbatim() {
        let text = "# comment kept\nmodules:\n  http_2xx: {prober: http}\n";
        let config = ExporterConfig::parse(text).unwrap();

        let rendered = config.render_with_modules(std::iter::empty()).unwrap();
        assert_eq!(rendered, text);
    }

    #[test]
    fn test_render_merges_modules_without_override() {
        let config = ExporterConfig::parse("modules:\n  http_2xx:\n    prober: http\n").unwrap();

        let user_override: Value = serde_yaml::from_str("prober: tcp").unwrap();
        let extra: Value = serde_yaml::from_str("prober: icmp").unwrap();
        let rendered = config
            .render_with_modules([("http_2xx", &user_override), ("juju_icmp", &extra)])
            .unwrap();

        let merged = ExporterConfig::parse(&rendered).unwrap();
        assert_eq!(merged.module_names(), vec!["http_2xx", "juju_icmp"]);
        assert!(rendered.contains("prober: http"));
        assert!(!rendered.contains("prober: tcp"));
    }

    #[test]
    fn test_render_into_null_modules() {
        let config = ExporterConfig::parse("modules:\n").unwrap();
        let extra: Value = serde_yaml::from_str("prober: icmp").unwrap();

        let rendered = config.render_with_modules([("icmp", &extra)]).unwrap();
        assert_eq!(
            ExporterConfig::parse(&rendered).unwrap().module_names(),
            vec!["icmp"]
        );
    }
}
