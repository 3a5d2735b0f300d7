//! Self-observability: structured logging setup and the `/metrics`
//! exposition of this control plane's own health, as distinct from the
//! workload metrics it reports on in `StatSummary` responses.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::extract::Extension;
use prometheus_client::metrics::counter::Counter;

/// Initialize the global tracing subscriber. `RUST_LOG` defaults to
/// `info` when unset.
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();
}

/// Counters this core increments on its own behalf - queries issued
/// against the metrics backend and requests served, broken down by
/// success/failure and, for failures, by which branch of spec §7's error
/// taxonomy fired. Not part of the `StatSummary` response; exposed on
/// this process's own `/metrics` endpoint for the operator scraping it.
#[derive(Clone, Default)]
pub struct CoreMetrics {
    pub queries_issued: Counter,
    pub queries_failed: Counter,
    pub requests_total: Counter,
    pub requests_failed: Counter,
    pub requests_failed_unknown_kind: Counter,
    pub requests_failed_topology_unavailable: Counter,
    pub requests_failed_canceled: Counter,
}

type Registry =
    prometheus_client::registry::Registry<Box<dyn prometheus_client::encoding::text::SendEncodeMetric>>;

fn build_registry(metrics: &CoreMetrics) -> Registry {
    let mut reg = Registry::default();

    reg.register(
        "stat_summary_queries_issued",
        "Number of metrics-backend queries issued.",
        Box::new(metrics.queries_issued.clone()),
    );
    reg.register(
        "stat_summary_queries_failed",
        "Number of metrics-backend queries that returned an error and were degraded to zero.",
        Box::new(metrics.queries_failed.clone()),
    );
    reg.register(
        "stat_summary_requests_total",
        "Number of stat_summary requests served.",
        Box::new(metrics.requests_total.clone()),
    );
    reg.register(
        "stat_summary_requests_failed",
        "Number of stat_summary requests that returned an RPC-level error.",
        Box::new(metrics.requests_failed.clone()),
    );
    reg.register(
        "stat_summary_requests_failed_unknown_kind",
        "Number of requests rejected for an unrecognized resource kind.",
        Box::new(metrics.requests_failed_unknown_kind.clone()),
    );
    reg.register(
        "stat_summary_requests_failed_topology_unavailable",
        "Number of requests that failed because the topology view could not be read.",
        Box::new(metrics.requests_failed_topology_unavailable.clone()),
    );
    reg.register(
        "stat_summary_requests_failed_canceled",
        "Number of requests canceled before a response could be assembled.",
        Box::new(metrics.requests_failed_canceled.clone()),
    );

    reg
}

type State = Arc<Mutex<Registry>>;

async fn handler(Extension(registry): Extension<State>) -> impl axum::response::IntoResponse {
    let mut buffer = Vec::new();
    prometheus_client::encoding::text::encode(&mut buffer, &registry.lock().unwrap()).unwrap();

    axum::response::Response::builder()
        .status(http::StatusCode::OK)
        .header(
            http::header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )
        .body(axum::body::Body::from(buffer))
        .unwrap()
}

/// A standalone self-metrics exporter, run on its own port next to the
/// API server.
pub async fn run_exporter(metrics: CoreMetrics, address: SocketAddr) -> Result<(), anyhow::Error> {
    let registry: State = Arc::new(Mutex::new(build_registry(&metrics)));

    let router = axum::Router::new()
        .route("/metrics", axum::routing::get(handler))
        .layer(
            tower::ServiceBuilder::new()
                .layer(axum::AddExtensionLayer::new(registry))
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .into_inner(),
        );

    tracing::info!(address=%address, "starting self-metrics exporter");

    axum::Server::bind(&address)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_registry_encodes_every_counter() {
        let metrics = CoreMetrics::default();
        metrics.queries_issued.inc();
        metrics.requests_total.inc();
        metrics.requests_failed.inc();
        metrics.requests_failed_unknown_kind.inc();

        let registry = build_registry(&metrics);
        let mut buffer = Vec::new();
        prometheus_client::encoding::text::encode(&mut buffer, &registry).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("stat_summary_queries_issued_total 1"));
        assert!(text.contains("stat_summary_requests_total_total 1"));
        assert!(text.contains("stat_summary_requests_failed_total 1"));
        assert!(text.contains("stat_summary_requests_failed_unknown_kind_total 1"));
        assert!(text.contains("stat_summary_queries_failed_total 0"));
    }
}
