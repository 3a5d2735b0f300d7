//! # stat-summary core
//!
//! The observability control plane of a service-mesh: enumerates
//! workload topology from the cluster, queries a Prometheus-compatible
//! metrics backend, and joins the two into per-resource-kind traffic
//! statistics served over `/api/stat-summary`.

mod assembler;
mod config;
mod error;
mod metrics;
mod orchestrator;
mod planner;
mod resource;
mod server;
mod telemetry;
mod topology;
mod validate;
mod wire;

use std::net::SocketAddr;
use std::sync::Arc;

use config::Config;
use metrics::{MetricsClient, PrometheusClient};
use telemetry::CoreMetrics;
use topology::{Client as KubeClient, TopologySource, TopologyView};

fn main() {
    telemetry::init_logging();

    let config = match Config::load_from_env() {
        Ok(c) => c,
        Err(err) => {
            tracing::error!(error = ?err, "could not load config");
            std::process::exit(1);
        }
    };

    // A single-threaded runtime is sufficient: this process is I/O bound
    // on the Kubernetes API and the metrics backend, never CPU bound.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .expect("could not create runtime");

    let res = rt.block_on(run(config));

    if let Err(err) = res {
        tracing::error!(error = ?err, "stat-summary core failed");
        std::process::exit(1);
    } else {
        tracing::info!("orderly shutdown");
    }
}

async fn run(config: Config) -> Result<(), anyhow::Error> {
    tracing::info!("stat-summary core startup");

    let kube_client = KubeClient::connect().await?;
    let topology: Arc<dyn TopologySource> = Arc::new(TopologyView::new(kube_client));

    let metrics: Arc<dyn MetricsClient> = Arc::new(PrometheusClient::new(
        config.metrics_backend_url.clone(),
        config.metrics_timeout,
    ));

    let core_metrics = CoreMetrics::default();

    let exporter_address: SocketAddr = ([0, 0, 0, 0], config.server_port + 1).into();
    tokio::task::spawn(telemetry::run_exporter(core_metrics.clone(), exporter_address));

    let api_address: SocketAddr = ([0, 0, 0, 0], config.server_port).into();
    let request_timeout = config.request_timeout;
    let server = server::Server::new(topology, metrics, core_metrics, Arc::new(config));
    server::run_server(server, api_address, request_timeout).await;

    Ok(())
}
