//! Blackbox Exporter configuration operator.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use blackbox_common::init_tracing;
use blackbox_operator::args::{Args, Command};
use blackbox_operator::dispatcher::{self, Dispatcher, Event};
use blackbox_operator::{ExporterWorkload, HttpServer, Operator, OperatorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => OperatorConfig::load_from_file(path)
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?,
        None => OperatorConfig::default(),
    };

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config.logging)?;

    match args.command {
        Command::Apply { event } => apply(config, event).await,
        Command::ShowConfig { json } => show_config(config, json),
        Command::Jobs { yaml } => jobs(config, yaml),
        Command::Run { listen } => {
            if let Some(listen) = listen {
                config.http.listen = listen;
                config.validate()?;
            }
            run(config).await
        }
    }
}

fn build_operator(config: OperatorConfig) -> anyhow::Result<Operator<ExporterWorkload>> {
    let workload = ExporterWorkload::new(&config.workload)?;
    Ok(Operator::new(config, workload))
}

async fn apply(config: OperatorConfig, event: Event) -> anyhow::Result<()> {
    let operator = build_operator(config)?;
    let status = operator.reconcile(event).await;

    println!("{}", serde_json::to_string_pretty(&status)?);

    if !status.is_active() {
        anyhow::bail!("unit is {:?}: {}", status.state, status.message);
    }
    Ok(())
}

fn show_config(config: OperatorConfig, json: bool) -> anyhow::Result<()> {
    let shown = build_operator(config)?.show_config()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
    } else {
        print!("{}", shown.content);
    }
    Ok(())
}

fn jobs(config: OperatorConfig, yaml: bool) -> anyhow::Result<()> {
    let rendered = build_operator(config)?.render()?;

    if yaml {
        print!("{}", rendered.synthesis.probes_document()?);
    } else {
        print!("{}", rendered.publication.to_json()?);
    }
    Ok(())
}

async fn run(config: OperatorConfig) -> anyhow::Result<()> {
    info!(
        config_path = %config.workload.config_path.display(),
        "Starting Blackbox Exporter operator"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events, events_rx) = dispatcher::channel(config.events.queue_size);

    let update_status_interval = Duration::from_secs(config.events.update_status_interval_secs);
    let http = config.http.clone();

    let operator = Arc::new(build_operator(config)?);

    // Dispatcher
    let dispatcher = Dispatcher::new(operator.clone(), events_rx);
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown_rx.clone()));

    events.send(Event::Startup).await;

    // Update-status ticker
    let ticker_task = tokio::spawn(dispatcher::update_status_ticker(
        events.clone(),
        update_status_interval,
        shutdown_rx.clone(),
    ));

    // SIGHUP
    #[cfg(unix)]
    let hangup_task = {
        let events = events.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher::hangup_listener(events, shutdown).await {
                warn!(error = %e, "Cannot listen for SIGHUP");
            }
        })
    };

    // HTTP server
    let http_task = if http.enabled {
        let listen_addr: SocketAddr = http
            .listen
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;
        let server = HttpServer::new(
            operator.artifact().clone(),
            operator.state(),
            events.clone(),
            listen_addr,
        );
        let http_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(http_shutdown).await {
                error!("HTTP server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = dispatcher_task.await;
        let _ = ticker_task.await;
        #[cfg(unix)]
        let _ = hangup_task.await;
        if let Some(task) = http_task {
            let _ = task.await;
        }
    })
    .await;

    let status = operator.status();
    info!(state = ?status.state, message = %status.message, "Operator stopped");
    Ok(())
}

async fn terminate() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
