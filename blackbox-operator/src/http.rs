//! HTTP server for the operator's query surface.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::artifact::Artifact;
use crate::dispatcher::{Event, EventSender};
use crate::operator::SharedState;
use crate::status::StatusReport;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    artifact: Artifact,
    state: SharedState,
    events: EventSender,
}

/// Create the HTTP router.
fn create_router(artifact: Artifact, state: SharedState, events: EventSender) -> Router {
    let state = AppState {
        artifact,
        state,
        events,
    };

    Router::new()
        .route("/config", get(config_handler))
        .route("/jobs", get(jobs_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/reconcile", post(reconcile_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the /config endpoint: the applied exporter configuration.
async fn config_handler(State(state): State<AppState>) -> Response {
    match state.artifact.read() {
        Ok(Some(content)) => (
            StatusCode::OK,
            [("content-type", "application/yaml; charset=utf-8")],
            content,
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            "configuration not written yet\n",
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("cannot read {}: {}\n", state.artifact.path().display(), e),
        )
            .into_response(),
    }
}

/// Handler for the /jobs endpoint: scrape jobs published for Prometheus.
async fn jobs_handler(State(state): State<AppState>) -> Response {
    let jobs = state.state.read().jobs.clone();
    Json(jobs).into_response()
}

async fn status_handler(State(state): State<AppState>) -> Response {
    let report = StatusReport::new(state.state.read().clone());
    Json(report).into_response()
}

async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

#[derive(Debug, Deserialize)]
struct ReconcileParams {
    #[serde(default)]
    event: Option<String>,
}

/// Handler for POST /reconcile: queue an event (default: config-changed).
async fn reconcile_handler(
    State(state): State<AppState>,
    Query(params): Query<ReconcileParams>,
) -> Response {
    let event = match params.event.as_deref() {
        None => Event::ConfigChanged,
        Some(name) => match name.parse::<Event>() {
            Ok(event) => event,
            Err(e) => return (StatusCode::BAD_REQUEST, format!("{}\n", e)).into_response(),
        },
    };

    if state.events.try_send(event) {
        debug!(event = %event, "Queued event from HTTP");
        (StatusCode::ACCEPTED, format!("queued {}\n", event)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "event queue full\n").into_response()
    }
}

/// HTTP server configuration.
pub struct HttpServer {
    artifact: Artifact,
    state: SharedState,
    events: EventSender,
    listen_addr: SocketAddr,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(
        artifact: Artifact,
        state: SharedState,
        events: EventSender,
        listen_addr: SocketAddr,
    ) -> Self {
        Self {
            artifact,
            state,
            events,
            listen_addr,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.artifact, self.state, self.events);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(addr = %self.listen_addr, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
