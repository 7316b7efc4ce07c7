//! Integration tests for blackbox-common library.

use blackbox_common::{
    DocumentSource, ExporterConfig, ProbesProvider, ProbesRelationData, ProbesSpec,
    RelationEndpoint, ScrapeJob, Topology, parse_config,
};
use indexmap::IndexMap;

#[test]
fn test_provider_data_feeds_exporter_config() {
    // A provider defines its own module and a job that uses it
    let mut modules = IndexMap::new();
    modules.insert(
        "http_slow".to_string(),
        serde_yaml::from_str("prober: http\ntimeout: 30s").unwrap(),
    );
    let provider = ProbesProvider::new(
        Topology::new("cos", "1234", "grafana"),
        vec![
            ScrapeJob::new("ui")
                .with_module("http_slow")
                .with_targets(["http://grafana:3000"]),
        ],
        modules,
    );

    // The relation carries JSON
    let json = serde_json::to_vec(&provider.relation_data()).expect("encode failed");
    let data: ProbesRelationData = serde_json::from_slice(&json).expect("decode failed");

    assert_eq!(data.scrape_probes[0].job_name, "juju_cos_1234_grafana_ui");
    assert_eq!(data.scrape_probes[0].modules(), ["juju_cos_1234_grafana_http_slow"]);

    // The exporter merges provider modules next to its own
    let config = ExporterConfig::builtin().expect("builtin config");
    let rendered = config
        .render_with_modules(data.scrape_modules.iter().map(|(k, v)| (k.as_str(), v)))
        .expect("render failed");

    let merged = ExporterConfig::parse(&rendered).expect("rendered config must parse");
    assert!(merged.has_module("http_2xx"));
    assert!(merged.has_module("juju_cos_1234_grafana_http_slow"));
}

#[test]
fn test_probes_from_file_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("probes.yaml");
    std::fs::write(
        &path,
        "scrape_configs:\n  - job_name: site\n    params:\n      module: [http_2xx]\n    static_configs:\n      - targets: [example.com]\n",
    )
    .unwrap();

    #[derive(serde::Deserialize)]
    struct Options {
        probes_file: DocumentSource,
    }

    let options: Options = parse_config(&format!(
        "{{ probes_file: {{ file: \"{}\" }} }}",
        path.display()
    ))
    .unwrap();

    let spec = ProbesSpec::parse(&options.probes_file.read().unwrap()).unwrap();
    assert_eq!(spec.scrape_configs.len(), 1);
    assert_eq!(spec.scrape_configs[0].targets().next(), Some("example.com"));
}

#[test]
fn test_endpoint_paths_follow_ingress_prefix() {
    let endpoint = RelationEndpoint::parse("http://traefik.local/cos-blackbox").unwrap();

    assert_eq!(endpoint.address(), "traefik.local:80");
    assert_eq!(endpoint.probe_path(), "/cos-blackbox/probe");
    assert_eq!(endpoint.metrics_path(), "/cos-blackbox/metrics");
}
