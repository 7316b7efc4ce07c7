//! Configuration operator for the Prometheus Blackbox Exporter.
//!
//! The operator owns the exporter's configuration file. It merges the
//! operator-supplied exporter config and probes with probes and modules
//! contributed by related applications, rewrites every probe so Prometheus
//! scrapes it through the exporter, and publishes the resulting scrape jobs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ SIGHUP/tick/ │────>│  Dispatcher  │────>│   Operator   │────>│   Exporter   │
//! │ POST /recon. │     │   (serial)   │     │ (reconcile)  │     │  (/-/reload) │
//! └──────────────┘     └──────────────┘     └──────┬───────┘     └──────────────┘
//!                                                  │
//!                                    config.yml, scrape-jobs.json
//! ```
//!
//! # Usage
//!
//! ```bash
//! blackbox-operator --config operator.json5 run
//! blackbox-operator --config operator.json5 show-config
//! ```
//!
//! # Configuration
//!
//! See [`config::OperatorConfig`] for configuration options.

pub mod args;
pub mod artifact;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod operator;
pub mod relation;
pub mod status;
pub mod synth;
pub mod workload;

pub use artifact::{Artifact, WriteOutcome};
pub use config::{ConfigError, OperatorConfig};
pub use dispatcher::{Dispatcher, Event, EventSender};
pub use error::OperatorError;
pub use http::HttpServer;
pub use operator::{Operator, SharedState, ShownConfig};
pub use status::{OperatorState, StatusReport, UnitState, UnitStatus};
pub use synth::{Synthesis, SynthesisError, SynthesisInputs, synthesize};
pub use workload::{ExporterApi, ExporterWorkload, WorkloadControl, WorkloadError};
