//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::dispatcher::Event;

/// Blackbox Exporter configuration operator.
#[derive(Parser, Debug, Clone)]
#[command(name = "blackbox-operator")]
#[command(about = "Synthesize and apply Blackbox Exporter configuration")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (JSON5 format). Built-in defaults when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reconcile once and exit; fails unless the unit ends up active.
    Apply {
        /// Event to reconcile for.
        #[arg(long, default_value = "config-changed")]
        event: Event,
    },

    /// Print the configuration the exporter is currently running with.
    ShowConfig {
        /// Print `{path, content}` as JSON instead of the raw document.
        #[arg(long)]
        json: bool,
    },

    /// Print the scrape jobs that would be published, without writing anything.
    Jobs {
        /// Print only the rewritten probe jobs as a `scrape_configs` YAML document.
        #[arg(long)]
        yaml: bool,
    },

    /// Run as a daemon, reconciling on SIGHUP, on a timer and on request.
    Run {
        /// HTTP listen address (overrides config).
        #[arg(long)]
        listen: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = Args::parse_from([
            "blackbox-operator",
            "--config",
            "operator.json5",
            "run",
            "--listen",
            "0.0.0.0:9116",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("operator.json5")));
        assert_eq!(
            args.command,
            Command::Run {
                listen: Some("0.0.0.0:9116".to_string())
            }
        );
    }

    #[test]
    fn test_parse_apply_event() {
        let args = Args::parse_from(["blackbox-operator", "apply", "--event", "upgrade"]);
        assert_eq!(
            args.command,
            Command::Apply {
                event: Event::Upgrade
            }
        );

        let args = Args::parse_from(["blackbox-operator", "apply"]);
        assert_eq!(
            args.command,
            Command::Apply {
                event: Event::ConfigChanged
            }
        );
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let args = Args::parse_from([
            "blackbox-operator",
            "show-config",
            "--json",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.command, Command::ShowConfig { json: true });
    }

    #[test]
    fn test_parse_jobs() {
        let args = Args::parse_from(["blackbox-operator", "jobs", "--yaml"]);
        assert_eq!(args.command, Command::Jobs { yaml: true });
        assert_eq!(args.config, None);
    }

    #[test]
    fn test_rejects_unknown_event() {
        assert!(Args::try_parse_from(["blackbox-operator", "apply", "--event", "install"]).is_err());
    }
}
