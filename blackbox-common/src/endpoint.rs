//! The exporter's externally visible address.

use std::fmt;

use url::Url;

use crate::error::{Error, Result};

/// Default Blackbox Exporter HTTP port.
pub const DEFAULT_PORT: u16 = 9115;

/// Address of the exporter's HTTP interface as seen by Prometheus.
///
/// Probe jobs are rewritten so Prometheus scrapes `address()` with
/// `probe_path()` instead of the probe target itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEndpoint {
    url: Url,
}

impl RelationEndpoint {
    /// Parse an endpoint URL. Scheme must be http or https and a host is required.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| Error::Endpoint(format!("'{}': {}", input, e)))?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(Error::Endpoint(format!(
                "'{}'; must include scheme and hostname",
                input
            )));
        }

        Ok(Self { url })
    }

    /// Endpoint for a plain `host:port` pair. IPv6 hosts may be given with
    /// or without brackets.
    pub fn from_host_port(host: &str, port: u16) -> Result<Self> {
        if host.contains(':') && !host.starts_with('[') {
            Self::parse(&format!("http://[{}]:{}", host, port))
        } else {
            Self::parse(&format!("http://{}:{}", host, port))
        }
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(DEFAULT_PORT)
    }

    /// `host:port` for the `__address__` rewrite.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }

    /// Path prefix without trailing slash (empty at the root).
    pub fn path_prefix(&self) -> &str {
        self.url.path().trim_end_matches('/')
    }

    /// Path at which the exporter serves probes.
    pub fn probe_path(&self) -> String {
        format!("{}/probe", self.path_prefix())
    }

    /// Path at which the exporter serves its own metrics.
    pub fn metrics_path(&self) -> String {
        format!("{}/metrics", self.path_prefix())
    }
}

impl fmt::Display for RelationEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
