//! The reconcile entry point.
//!
//! Every event runs the same idempotent sequence: load relation data and
//! inputs, synthesize, replace the artifacts, and tell the exporter about
//! the new configuration if (and only if) it changed. A run that fails
//! before writing leaves the artifacts exactly as they were.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use blackbox_common::{DocumentSource, RelationEndpoint};

use crate::artifact::{Artifact, WriteOutcome};
use crate::config::OperatorConfig;
use crate::dispatcher::Event;
use crate::error::OperatorError;
use crate::relation::{Publication, RelationState};
use crate::status::{OperatorState, UnitState, UnitStatus};
use crate::synth::{Synthesis, SynthesisError, SynthesisInputs, self_monitoring_job, synthesize};
use crate::workload::WorkloadControl;

/// Operator state shared with the query surface.
pub type SharedState = Arc<RwLock<OperatorState>>;

/// Addresses the exporter is reachable at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// In-cluster address (advertised host and workload port).
    pub internal: Option<RelationEndpoint>,
    /// Address Prometheus should use: ingress when related, else internal.
    pub external: Option<RelationEndpoint>,
}

/// Everything one synthesis run produces, before anything is written.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub endpoints: Endpoints,
    pub synthesis: Synthesis,
    pub publication: Publication,
}

/// Result of the show-config query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShownConfig {
    pub path: PathBuf,
    pub content: String,
}

/// Owns the exporter configuration artifact and keeps it in sync.
pub struct Operator<W: WorkloadControl> {
    config: OperatorConfig,
    artifact: Artifact,
    publication: Artifact,
    workload: W,
    state: SharedState,
}

impl<W: WorkloadControl> Operator<W> {
    pub fn new(config: OperatorConfig, workload: W) -> Self {
        let artifact = Artifact::new(&config.workload.config_path);
        let publication = Artifact::new(&config.relation.publish_path);

        Self {
            config,
            artifact,
            publication,
            workload,
            state: Arc::new(RwLock::new(OperatorState::default())),
        }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// The exporter configuration artifact.
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn status(&self) -> UnitStatus {
        self.state.read().status.clone()
    }

    fn advertise_host(&self) -> Option<String> {
        match &self.config.endpoint.advertise_host {
            Some(host) => Some(host.clone()),
            None if self.config.endpoint.disable_hostname_lookup => None,
            None => {
                let host = hostname::get().ok().and_then(|h| h.into_string().ok())?;
                if !host.contains('.') {
                    warn!(
                        host = %host,
                        "Local hostname is not fully qualified; set endpoint.advertise_host \
                         if Prometheus runs in another namespace"
                    );
                }
                Some(host)
            }
        }
    }

    /// Resolve the exporter addresses from configuration and relation data.
    pub fn endpoints(&self, relations: &RelationState) -> Result<Endpoints, OperatorError> {
        let port = self.config.workload.port;
        let internal = self
            .advertise_host()
            .map(|host| {
                RelationEndpoint::from_host_port(&host, port)
                    .map_err(|_| OperatorError::InvalidExternalUrl(format!("http://{}:{}", host, port)))
            })
            .transpose()?;

        let external = match &relations.ingress_url {
            Some(url) => Some(
                RelationEndpoint::parse(url)
                    .map_err(|_| OperatorError::InvalidExternalUrl(url.clone()))?,
            ),
            None => internal.clone(),
        };

        Ok(Endpoints { internal, external })
    }

    fn read_input(source: Option<&DocumentSource>) -> Result<Option<String>, OperatorError> {
        source
            .map(|source| {
                source
                    .read()
                    .map_err(|e| OperatorError::from(SynthesisError::from(e)))
            })
            .transpose()
    }

    /// Synthesize from the current inputs without writing anything.
    pub fn render(&self) -> Result<Rendered, OperatorError> {
        let relations = RelationState::load(&self.config.relation.state_path)?;
        let endpoints = self.endpoints(&relations)?;

        let inputs = SynthesisInputs {
            exporter_config: Self::read_input(self.config.inputs.config_file.as_ref())?,
            probes: Self::read_input(self.config.inputs.probes_file.as_ref())?,
            relations: relations.probes_data(),
        };

        let synthesis = synthesize(&inputs, endpoints.external.as_ref())?;

        let mut scrape_jobs = Vec::with_capacity(synthesis.probes.len() + 1);
        if let Some(external) = &endpoints.external {
            let target = endpoints.internal.as_ref().unwrap_or(external);
            scrape_jobs.push(self_monitoring_job(target, external));
        }
        scrape_jobs.extend(synthesis.probes.iter().cloned());

        let publication = Publication {
            scrape_metadata: self.config.relation.topology.clone(),
            scrape_jobs,
        };

        Ok(Rendered {
            endpoints,
            synthesis,
            publication,
        })
    }

    /// Handle one event and return the resulting unit status.
    pub async fn reconcile(&self, event: Event) -> UnitStatus {
        debug!(event = %event, "Reconciling");

        let status = match self.apply().await {
            Ok(outcome) => {
                debug!(event = %event, ?outcome, "Reconcile complete");
                UnitStatus::active()
            }
            Err(e) => {
                let status = e.status();
                match status.state {
                    UnitState::Waiting | UnitState::Maintenance => {
                        info!(event = %event, reason = %e, "Deferring synthesis")
                    }
                    _ => error!(event = %event, error = %e, "Reconcile failed"),
                }
                status
            }
        };

        if event.refreshes_version() {
            let version = self.workload.version().await;
            if version.is_none() {
                debug!("Cannot set workload version at this time");
            }
            self.state.write().workload_version = version;
        }

        let mut state = self.state.write();
        if state.status != status {
            info!(state = ?status.state, message = %status.message, "Unit status changed");
        }
        state.status = status.clone();
        status
    }

    async fn apply(&self) -> Result<WriteOutcome, OperatorError> {
        let rendered = self.render()?;
        let publication = rendered
            .publication
            .to_json()
            .map_err(|e| OperatorError::artifact(self.publication.path(), std::io::Error::other(e)))?;

        let outcome = self
            .artifact
            .replace(&rendered.synthesis.config)
            .map_err(|e| OperatorError::artifact(self.artifact.path(), e))?;

        // Once the artifact changed the exporter must hear about it, even if
        // a later step of this run fails.
        if outcome == WriteOutcome::Replaced {
            let mut state = self.state.write();
            state.notify_pending = true;
            state.last_applied = Some(Utc::now());
        }

        self.publication
            .replace(&publication)
            .map_err(|e| OperatorError::artifact(self.publication.path(), e))?;

        let notify = {
            let mut state = self.state.write();
            state.jobs = rendered.publication.scrape_jobs;
            state.notify_pending
        };

        if notify {
            if let Err(e) = self.workload.apply_config().await {
                warn!(error = %e, "Exporter did not pick up the new configuration");
                return Err(e.into());
            }
            self.state.write().notify_pending = false;
            info!(
                path = %self.artifact.path().display(),
                endpoint = ?rendered.endpoints.external.as_ref().map(ToString::to_string),
                "Exporter configuration applied"
            );
        }

        Ok(outcome)
    }

    /// The currently applied configuration, verbatim. Read-only.
    pub fn show_config(&self) -> Result<ShownConfig, OperatorError> {
        match self.artifact.read() {
            Ok(Some(content)) => Ok(ShownConfig {
                path: self.artifact.path().to_path_buf(),
                content,
            }),
            Ok(None) => Err(OperatorError::NotReady(format!(
                "{} has not been written yet",
                self.artifact.path().display()
            ))),
            Err(e) => Err(OperatorError::artifact(self.artifact.path(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::WorkloadError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeWorkload {
        applies: AtomicUsize,
        fail: bool,
    }

    impl WorkloadControl for Arc<FakeWorkload> {
        async fn apply_config(&self) -> Result<(), WorkloadError> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(WorkloadError::ConfigUpdateFailure)
            } else {
                Ok(())
            }
        }

        async fn version(&self) -> Option<String> {
            Some("0.24.0".to_string())
        }
    }

    fn config(dir: &std::path::Path, probes: &str) -> OperatorConfig {
        let mut config = OperatorConfig::default();
        config.workload.config_path = dir.join("config.yml");
        config.relation.state_path = dir.join("relation.json");
        config.relation.publish_path = dir.join("jobs.json");
        config.endpoint.advertise_host = Some("10.0.0.5".to_string());
        config.inputs.probes_file = Some(DocumentSource::Inline(probes.to_string()));
        config
    }

    const PROBES: &str = "scrape_configs:\n  - job_name: site\n    static_configs:\n      - targets: [example.com]\n";

    #[tokio::test]
    async fn test_reconcile_writes_and_notifies_once() {
        let dir = tempfile::tempdir().unwrap();
        let workload = Arc::new(FakeWorkload::default());
        let operator = Operator::new(config(dir.path(), PROBES), workload.clone());

        assert!(operator.reconcile(Event::Startup).await.is_active());
        assert!(operator.reconcile(Event::UpdateStatus).await.is_active());

        assert_eq!(workload.applies.load(Ordering::SeqCst), 1);
        assert_eq!(
            operator.show_config().unwrap().content,
            blackbox_common::DEFAULT_EXPORTER_CONFIG
        );

        let state = operator.state();
        let state = state.read();
        assert_eq!(state.jobs.len(), 2);
        assert_eq!(state.workload_version.as_deref(), Some("0.24.0"));
        assert!(state.last_applied.is_some());
    }

    #[tokio::test]
    async fn test_malformed_config_blocks_and_keeps_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let workload = Arc::new(FakeWorkload::default());
        let mut cfg = config(dir.path(), PROBES);
        let operator = Operator::new(cfg.clone(), workload.clone());
        operator.reconcile(Event::Startup).await;
        let before = operator.show_config().unwrap();

        cfg.inputs.config_file = Some(DocumentSource::Inline("modules: [unclosed".into()));
        let operator = Operator::new(cfg, workload.clone());
        let status = operator.reconcile(Event::ConfigChanged).await;

        assert_eq!(status.state, UnitState::Blocked);
        assert_eq!(operator.show_config().unwrap(), before);
        assert_eq!(workload.applies.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_address_waits() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), PROBES);
        cfg.endpoint.advertise_host = None;
        cfg.endpoint.disable_hostname_lookup = true;
        let operator = Operator::new(cfg, Arc::new(FakeWorkload::default()));

        let status = operator.reconcile(Event::Startup).await;
        assert_eq!(status.state, UnitState::Waiting);
        assert!(operator.show_config().is_err());
    }

    #[tokio::test]
    async fn test_failed_notify_retried_on_next_event() {
        let dir = tempfile::tempdir().unwrap();
        let failing = Arc::new(FakeWorkload {
            fail: true,
            ..Default::default()
        });
        let cfg = config(dir.path(), PROBES);
        let operator = Operator::new(cfg, failing.clone());

        let status = operator.reconcile(Event::Startup).await;
        assert_eq!(status.state, UnitState::Blocked);
        assert!(operator.state().read().notify_pending);

        // Same operator, unchanged inputs: the pending notification is retried.
        operator.reconcile(Event::UpdateStatus).await;
        assert_eq!(failing.applies.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_publication_still_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let workload = Arc::new(FakeWorkload::default());
        let cfg = config(dir.path(), PROBES);

        // A directory in place of the publication file makes its write fail.
        std::fs::create_dir_all(cfg.relation.publish_path.join("blocker")).unwrap();
        let publish_path = cfg.relation.publish_path.clone();
        let operator = Operator::new(cfg, workload.clone());

        let status = operator.reconcile(Event::Startup).await;
        assert_eq!(status.state, UnitState::Blocked);
        assert!(operator.show_config().is_ok());
        assert_eq!(workload.applies.load(Ordering::SeqCst), 0);
        assert!(operator.state().read().notify_pending);

        std::fs::remove_dir_all(&publish_path).unwrap();

        let status = operator.reconcile(Event::UpdateStatus).await;
        assert!(status.is_active());
        assert_eq!(workload.applies.load(Ordering::SeqCst), 1);
        assert!(!operator.state().read().notify_pending);
    }

    #[tokio::test]
    async fn test_invalid_ingress_url_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), PROBES);
        std::fs::write(&cfg.relation.state_path, r#"{ "ingress_url": "ftp://nope" }"#).unwrap();
        let operator = Operator::new(cfg, Arc::new(FakeWorkload::default()));

        let status = operator.reconcile(Event::RelationChanged).await;
        assert_eq!(status.state, UnitState::Blocked);
        assert!(status.message.contains("Invalid external url: 'ftp://nope'"));
    }

    #[test]
    fn test_endpoints_prefer_ingress() {
        let dir = tempfile::tempdir().unwrap();
        let operator = Operator::new(config(dir.path(), PROBES), Arc::new(FakeWorkload::default()));

        let relations = RelationState {
            ingress_url: Some("http://traefik/cos-blackbox".to_string()),
            probes: Vec::new(),
        };
        let endpoints = operator.endpoints(&relations).unwrap();

        assert_eq!(endpoints.internal.unwrap().address(), "10.0.0.5:9115");
        assert_eq!(endpoints.external.unwrap().probe_path(), "/cos-blackbox/probe");
    }

    #[test]
    fn test_advertise_host_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), PROBES);
        cfg.endpoint.advertise_host =
            Some("blackbox-0.blackbox-endpoints.cos.svc.cluster.local".to_string());
        let operator = Operator::new(cfg.clone(), Arc::new(FakeWorkload::default()));

        let endpoints = operator.endpoints(&RelationState::default()).unwrap();
        assert_eq!(
            endpoints.external.unwrap().address(),
            "blackbox-0.blackbox-endpoints.cos.svc.cluster.local:9115"
        );

        cfg.endpoint.advertise_host = Some("fd00::5".to_string());
        let operator = Operator::new(cfg, Arc::new(FakeWorkload::default()));
        let endpoints = operator.endpoints(&RelationState::default()).unwrap();
        assert_eq!(endpoints.internal.unwrap().address(), "[fd00::5]:9115");
    }
}
