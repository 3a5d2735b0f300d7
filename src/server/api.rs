use crate::error::CoreError;
use crate::orchestrator;
use crate::wire::StatSummaryResponse;

use super::Server;

/// Run one `stat_summary` request to completion, mapping the result onto
/// the HTTP status codes of spec §7's RPC-level error taxonomy. Request-
/// level rejections (`InvalidScope`, `InvalidTimeWindow`) never reach the
/// `Err` arm - `orchestrator::stat_summary` already folds those into
/// `StatSummaryResponse::Error` with a `200 OK`.
pub(super) async fn run_stat_summary(
    server: &Server,
    request: &crate::wire::StatSummaryRequest,
) -> (http::StatusCode, StatSummaryResponse) {
    server.core_metrics.requests_total.inc();

    let result = orchestrator::stat_summary(
        request,
        server.topology.as_ref(),
        server.metrics.as_ref(),
        &server.config,
        &server.core_metrics,
    )
    .await;

    match result {
        Ok(response) => (http::StatusCode::OK, response),
        Err(err) => {
            server.core_metrics.requests_failed.inc();
            match &err {
                CoreError::UnknownKind(_) => server.core_metrics.requests_failed_unknown_kind.inc(),
                CoreError::TopologyUnavailable(_) => {
                    server.core_metrics.requests_failed_topology_unavailable.inc()
                }
                CoreError::Canceled => server.core_metrics.requests_failed_canceled.inc(),
                // Never reaches here: orchestrator::stat_summary folds these
                // into Ok(StatSummaryResponse::Error) before returning.
                CoreError::InvalidScope(_) | CoreError::InvalidTimeWindow(_) => 0,
            };
            tracing::warn!(error = %err, "stat_summary request failed");
            let status = status_for(&err);
            (status, StatSummaryResponse::Error { message: err.to_string() })
        }
    }
}

fn status_for(err: &CoreError) -> http::StatusCode {
    match err {
        CoreError::UnknownKind(_) => http::StatusCode::NOT_IMPLEMENTED,
        CoreError::TopologyUnavailable(_) => http::StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Canceled => http::StatusCode::REQUEST_TIMEOUT,
        CoreError::InvalidScope(_) | CoreError::InvalidTimeWindow(_) => http::StatusCode::BAD_REQUEST,
    }
}
