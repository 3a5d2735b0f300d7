//! Thin adapter over the metrics backend's PromQL-style query endpoint.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A single labeled sample returned by a query.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("metrics backend request failed: {0}")]
    Request(#[source] anyhow::Error),
    #[error("metrics backend returned an error status: {0}")]
    BackendError(String),
}

/// Executes planned PromQL-style queries against the metrics backend.
/// Errors from one query are the caller's concern to isolate (spec §4.6
/// "partial failure for that kind only") - this trait just reports them.
#[async_trait]
pub trait MetricsClient: Send + Sync {
    async fn query(&self, promql: &str, at: DateTime<Utc>) -> Result<Vec<Sample>, MetricsError>;

    async fn health(&self) -> bool;
}

/// HTTP client for a Prometheus-compatible `/api/v1/query` endpoint.
pub struct PrometheusClient {
    base_url: String,
    http: reqwest::Client,
}

impl PrometheusClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build metrics HTTP client");
        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    metric: BTreeMap<String, String>,
    /// Instant-query value: `[unix_ts, "stringified float"]`.
    value: Option<(f64, String)>,
}

#[async_trait]
impl MetricsClient for PrometheusClient {
    async fn query(&self, promql: &str, at: DateTime<Utc>) -> Result<Vec<Sample>, MetricsError> {
        let url = format!("{}/api/v1/query", self.base_url.trim_end_matches('/'));
        tracing::trace!(query = %promql, "querying metrics backend");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("query", promql.to_string()),
                ("time", at.timestamp().to_string()),
            ])
            .send()
            .await
            .context("sending metrics query")
            .map_err(MetricsError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MetricsError::BackendError(format!(
                "HTTP {status}: {body}"
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .context("parsing metrics response")
            .map_err(MetricsError::Request)?;

        if parsed.status != "success" {
            return Err(MetricsError::BackendError(
                parsed.error.unwrap_or_else(|| parsed.status.clone()),
            ));
        }

        let results = parsed.data.map(|d| d.result).unwrap_or_default();
        Ok(results
            .into_iter()
            .filter_map(|r| {
                let (_, value_str) = r.value?;
                let value: f64 = value_str.parse().ok()?;
                Some(Sample {
                    labels: r.metric,
                    value,
                })
            })
            .collect())
    }

    async fn health(&self) -> bool {
        let url = format!("{}/-/healthy", self.base_url.trim_end_matches('/'));
        matches!(self.http.get(&url).send().await, Ok(resp) if resp.status().is_success())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_client_returns_stubbed_samples() {
        let client = fake::FakeMetricsClient::new();
        let mut labels = BTreeMap::new();
        labels.insert("namespace".to_string(), "emojivoto".to_string());
        client.stub("up", vec![Sample { labels: labels.clone(), value: 1.0 }]);

        let result = client.query("up", Utc::now()).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].value, 1.0);
    }

    #[tokio::test]
    async fn fake_client_reports_stubbed_errors() {
        let client = fake::FakeMetricsClient::new();
        client.stub_error("broken", "backend exploded");
        let err = client.query("broken", Utc::now()).await.unwrap_err();
        assert!(matches!(err, MetricsError::BackendError(_)));
    }
}
