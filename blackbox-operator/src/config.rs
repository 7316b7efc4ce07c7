//! Configuration for the operator.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use blackbox_common::{DEFAULT_PORT, DocumentSource, LoggingConfig, Topology};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete operator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Operator-supplied documents.
    #[serde(default)]
    pub inputs: InputsConfig,

    /// The managed Blackbox Exporter process.
    #[serde(default)]
    pub workload: WorkloadConfig,

    /// How the exporter is addressed.
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Relation data exchange.
    #[serde(default)]
    pub relation: RelationConfig,

    /// HTTP query surface.
    #[serde(default)]
    pub http: HttpConfig,

    /// Event loop settings.
    #[serde(default)]
    pub events: EventsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The exporter configuration and probes documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputsConfig {
    /// Blackbox Exporter configuration (modules). Built-in default when unset.
    #[serde(default)]
    pub config_file: Option<DocumentSource>,

    /// Probes document with a `scrape_configs` list.
    #[serde(default)]
    pub probes_file: Option<DocumentSource>,
}

/// Managed exporter process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Path of the configuration file the exporter reads.
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Exporter listen port (default: 9115).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the exporter HTTP API (default: `http://localhost:<port>`).
    #[serde(default)]
    pub api_url: Option<String>,

    /// Exporter executable, used to query its version.
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Command restarting the exporter when hot reload fails.
    #[serde(default)]
    pub restart_command: Vec<String>,

    /// Timeout for a single reload request (seconds).
    #[serde(default = "default_reload_timeout")]
    pub reload_timeout_secs: u64,

    /// Reload attempts before falling back to a restart.
    #[serde(default = "default_reload_attempts")]
    pub reload_attempts: u32,
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/blackbox_exporter/config.yml")
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_binary() -> String {
    "blackbox_exporter".to_string()
}

fn default_reload_timeout() -> u64 {
    2
}

fn default_reload_attempts() -> u32 {
    3
}

impl WorkloadConfig {
    pub fn api_url(&self) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            port: default_port(),
            api_url: None,
            binary: default_binary(),
            restart_command: Vec::new(),
            reload_timeout_secs: default_reload_timeout(),
            reload_attempts: default_reload_attempts(),
        }
    }
}

/// Exporter addressing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Host name Prometheus reaches the exporter at, e.g.
    /// `blackbox-0.blackbox-endpoints.cos.svc.cluster.local`.
    ///
    /// Defaults to the local hostname, which is usually a short pod name that
    /// only resolves inside the same namespace. Set this whenever Prometheus
    /// runs elsewhere.
    #[serde(default)]
    pub advertise_host: Option<String>,

    /// Do not fall back to the local hostname when `advertise_host` is unset.
    #[serde(default)]
    pub disable_hostname_lookup: bool,
}

/// Relation data exchange with the surrounding platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationConfig {
    /// JSON document with the current relation data.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Where the published scrape jobs are written.
    #[serde(default = "default_publish_path")]
    pub publish_path: PathBuf,

    /// This application's topology, published as scrape metadata.
    #[serde(default)]
    pub topology: Option<Topology>,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("/var/lib/blackbox-operator/relation.json")
}

fn default_publish_path() -> PathBuf {
    PathBuf::from("/var/lib/blackbox-operator/scrape-jobs.json")
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            publish_path: default_publish_path(),
            topology: None,
        }
    }
}

/// HTTP query endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Serve the query endpoints (default: true).
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,

    /// Address to listen on (default: "127.0.0.1:9116").
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_http_enabled() -> bool {
    true
}

fn default_listen() -> String {
    "127.0.0.1:9116".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            listen: default_listen(),
        }
    }
}

/// Event loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Interval of the periodic update-status event (seconds).
    #[serde(default = "default_update_status_interval")]
    pub update_status_interval_secs: u64,

    /// Pending events before senders wait.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

fn default_update_status_interval() -> u64 {
    300 // 5 minutes
}

fn default_queue_size() -> usize {
    64
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            update_status_interval_secs: default_update_status_interval(),
            queue_size: default_queue_size(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: OperatorConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workload.port == 0 {
            return Err(ConfigError::Validation("port must be > 0".to_string()));
        }

        if self.workload.reload_attempts == 0 {
            return Err(ConfigError::Validation(
                "reload_attempts must be > 0".to_string(),
            ));
        }

        if self.workload.reload_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "reload_timeout_secs must be > 0".to_string(),
            ));
        }

        if self
            .workload
            .restart_command
            .first()
            .is_some_and(|program| program.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "restart_command program must not be empty".to_string(),
            ));
        }

        if self.workload.config_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "config_path must not be empty".to_string(),
            ));
        }

        let api_url = self.workload.api_url();
        if reqwest::Url::parse(&api_url).is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid api_url: {}",
                api_url
            )));
        }

        if self.http.enabled && self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.http.listen
            )));
        }

        if self.events.update_status_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "update_status_interval_secs must be > 0".to_string(),
            ));
        }

        if self.events.queue_size == 0 {
            return Err(ConfigError::Validation(
                "queue_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
