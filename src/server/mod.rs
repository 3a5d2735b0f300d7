//! HTTP surface exposing `stat_summary` over JSON (spec §6).

mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse};

use crate::config::Config;
use crate::metrics::MetricsClient;
use crate::telemetry::CoreMetrics;
use crate::topology::TopologySource;

/// Everything a request handler needs: the two trait seams, the
/// self-observability counters, and the config values the Orchestrator
/// reads per request - all cheap to clone (`Arc`/small value types).
#[derive(Clone)]
pub struct Server {
    topology: Arc<dyn TopologySource>,
    metrics: Arc<dyn MetricsClient>,
    core_metrics: CoreMetrics,
    config: Arc<Config>,
}

impl Server {
    pub fn new(
        topology: Arc<dyn TopologySource>,
        metrics: Arc<dyn MetricsClient>,
        core_metrics: CoreMetrics,
        config: Arc<Config>,
    ) -> Self {
        Self {
            topology,
            metrics,
            core_metrics,
            config,
        }
    }
}

type State = Extension<Server>;

/// Start the webserver. Blocks indefinitely.
pub async fn run_server(server: Server, address: SocketAddr, request_timeout: std::time::Duration) {
    let router = axum::Router::new()
        .route("/health", axum::routing::get(health))
        .route("/api/stat-summary", axum::routing::post(stat_summary))
        .layer(
            tower::ServiceBuilder::new()
                .layer(axum::error_handling::HandleErrorLayer::new(
                    |error: axum::BoxError| async move {
                        if error.is::<tower::timeout::error::Elapsed>() {
                            Result::<(), _>::Err((
                                http::StatusCode::REQUEST_TIMEOUT,
                                "request has timed out".to_string(),
                            ))
                        } else if error.is::<tower::load_shed::error::Overloaded>() {
                            Err((
                                http::StatusCode::SERVICE_UNAVAILABLE,
                                "api is overloaded".to_string(),
                            ))
                        } else {
                            Err((
                                http::StatusCode::INTERNAL_SERVER_ERROR,
                                format!("unhandled internal error: {error}"),
                            ))
                        }
                    },
                ))
                .buffer(512)
                .rate_limit(200, std::time::Duration::from_secs(1))
                .load_shed()
                .timeout(request_timeout)
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(axum::AddExtensionLayer::new(server))
                .into_inner(),
        );

    tracing::info!(address=%address, "starting stat-summary http server");

    axum::Server::bind(&address)
        .serve(router.into_make_service())
        .await
        .unwrap();
}

async fn health(Extension(server): State) -> impl IntoResponse {
    if server.topology_is_healthy().await && server.metrics.health().await {
        (http::StatusCode::OK, "ok".to_string())
    } else {
        (http::StatusCode::SERVICE_UNAVAILABLE, "unhealthy".to_string())
    }
}

impl Server {
    /// The Topology View has no cheap standalone health probe (it's just
    /// a `kube::Client` wrapper) - liveness here is "the process is up",
    /// the metrics backend is the one with a real probe endpoint.
    async fn topology_is_healthy(&self) -> bool {
        true
    }
}

async fn stat_summary(
    Extension(server): State,
    request: axum::Json<crate::wire::StatSummaryRequest>,
) -> impl IntoResponse {
    let (status, body) = api::run_stat_summary(&server, &request.0).await;
    (status, axum::Json(body))
}
