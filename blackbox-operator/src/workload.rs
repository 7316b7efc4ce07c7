//! Control of the Blackbox Exporter process.

use std::future::Future;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::WorkloadConfig;

/// Delay between reload attempts.
const RELOAD_BACKOFF: Duration = Duration::from_millis(200);

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"version (\d+\.\d+\.\d+)").unwrap());

/// Workload control errors.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// No usable reply from the exporter API, regardless of the reason.
    #[error("Bad response on Blackbox Exporter api: {0}")]
    BadResponse(String),

    #[error("Restart failed: {0}")]
    Restart(String),

    /// Hot reload and restart both failed.
    #[error("Is config valid? hot reload and service restart failed.")]
    ConfigUpdateFailure,
}

/// What the operator needs from the exporter process.
pub trait WorkloadControl: Send + Sync + 'static {
    /// Make the exporter pick up a changed configuration.
    fn apply_config(&self) -> impl Future<Output = Result<(), WorkloadError>> + Send;

    /// The exporter version, if it can be determined.
    fn version(&self) -> impl Future<Output = Option<String>> + Send;
}

/// Blackbox Exporter HTTP API client.
#[derive(Debug, Clone)]
pub struct ExporterApi {
    client: reqwest::Client,
    base_url: String,
    attempts: u32,
}

impl ExporterApi {
    pub fn new(base_url: &str, timeout: Duration, attempts: u32) -> Result<Self, WorkloadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkloadError::BadResponse(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            attempts: attempts.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST an empty body to `/-/reload`.
    ///
    /// Succeeds on `200 OK` with an empty body. Transport errors and other
    /// status codes are retried; a non-empty reply is not.
    pub async fn reload(&self) -> Result<(), WorkloadError> {
        let url = format!("{}/-/reload", self.base_url);
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            match self.client.post(&url).body("").send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    let body = response
                        .bytes()
                        .await
                        .map_err(|e| WorkloadError::BadResponse(e.to_string()))?;
                    if !body.is_empty() {
                        warn!(
                            response = %String::from_utf8_lossy(&body),
                            "reload: POST returned a non-empty response"
                        );
                        return Err(WorkloadError::BadResponse(
                            "non-empty reload response".to_string(),
                        ));
                    }
                    debug!(url = %url, attempt, "Exporter reloaded");
                    return Ok(());
                }
                Ok(response) => {
                    last_error = format!("code={}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < self.attempts {
                tokio::time::sleep(RELOAD_BACKOFF).await;
            }
        }

        Err(WorkloadError::BadResponse(last_error))
    }
}

/// The exporter as managed on this host.
#[derive(Debug, Clone)]
pub struct ExporterWorkload {
    api: ExporterApi,
    binary: String,
    restart_command: Vec<String>,
}

impl ExporterWorkload {
    pub fn new(config: &WorkloadConfig) -> Result<Self, WorkloadError> {
        let api = ExporterApi::new(
            &config.api_url(),
            Duration::from_secs(config.reload_timeout_secs),
            config.reload_attempts,
        )?;

        Ok(Self {
            api,
            binary: config.binary.clone(),
            restart_command: config.restart_command.clone(),
        })
    }

    /// Run the configured restart command.
    async fn restart(&self) -> Result<(), WorkloadError> {
        let Some((program, args)) = self.restart_command.split_first() else {
            return Err(WorkloadError::Restart(
                "no restart command configured".to_string(),
            ));
        };

        info!(command = ?self.restart_command, "Restarting exporter");

        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|e| WorkloadError::Restart(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(WorkloadError::Restart(format!("exited with {}", status)))
        }
    }
}

impl WorkloadControl for ExporterWorkload {
    async fn apply_config(&self) -> Result<(), WorkloadError> {
        match self.api.reload().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Config reload via HTTP POST failed");
                self.restart().await.map_err(|e| {
                    warn!(error = %e, "Cannot restart exporter");
                    WorkloadError::ConfigUpdateFailure
                })
            }
        }
    }

    async fn version(&self) -> Option<String> {
        let output = match Command::new(&self.binary).arg("--version").output().await {
            Ok(output) => output,
            Err(e) => {
                debug!(binary = %self.binary, error = %e, "Cannot query exporter version");
                return None;
            }
        };

        // The exporter prints its version banner to stderr on some releases.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_version(&stdout).or_else(|| parse_version(&stderr))
    }
}

/// Extract `X.Y.Z` from `blackbox_exporter, version 0.24.0 (branch: HEAD, ...)`.
pub fn parse_version(output: &str) -> Option<String> {
    VERSION_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        let output = "blackbox_exporter, version 0.24.0 (branch: HEAD, revision: 0b0467473916fd9e8526e2cdc0e6a6f0d7e1f3d5)";
        assert_eq!(parse_version(output).as_deref(), Some("0.24.0"));
        assert_eq!(parse_version("no version here"), None);
    }

    #[test]
    fn test_base_url_trimmed() {
        let api =
            ExporterApi::new("http://address:12345/custom/path/", Duration::from_secs(2), 3)
                .unwrap();
        assert_eq!(api.base_url(), "http://address:12345/custom/path");
    }

    #[tokio::test]
    async fn test_restart_without_command() {
        let workload = ExporterWorkload::new(&WorkloadConfig::default()).unwrap();
        let err = workload.restart().await.unwrap_err();
        assert!(matches!(err, WorkloadError::Restart(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restart_runs_command() {
        let config = WorkloadConfig {
            restart_command: vec!["true".to_string()],
            ..Default::default()
        };
        let workload = ExporterWorkload::new(&config).unwrap();
        assert!(workload.restart().await.is_ok());

        let config = WorkloadConfig {
            restart_command: vec!["false".to_string()],
            ..Default::default()
        };
        let workload = ExporterWorkload::new(&config).unwrap();
        assert!(workload.restart().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_has_no_version() {
        let config = WorkloadConfig {
            binary: "/nonexistent/blackbox_exporter".to_string(),
            ..Default::default()
        };
        let workload = ExporterWorkload::new(&config).unwrap();
        assert_eq!(workload.version().await, None);
    }
}
