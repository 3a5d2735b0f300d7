//! Application configuration and parsing.

use std::time::Duration;

use anyhow::Context;

/// Application configuration.
///
/// Parsed from the JSON config file named by `STAT_SUMMARY_CONFIG`.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct Config {
    /// Port the HTTP API listens on.
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Base URL of the Prometheus-compatible metrics backend, e.g.
    /// `http://prometheus.linkerd-viz.svc.cluster.local:9090`.
    pub metrics_backend_url: String,

    /// Timeout for a single metrics query.
    #[serde(with = "humantime_duration", default = "default_metrics_timeout")]
    pub metrics_timeout: Duration,

    /// Default `time_window` applied when a request omits one.
    #[serde(default = "default_time_window")]
    pub default_time_window: String,

    /// Upper bound on concurrent metrics queries per request (spec §4.8).
    #[serde(default = "default_query_concurrency")]
    pub query_concurrency: usize,

    /// Timeout for an entire `stat_summary` request, enforced by the
    /// `tower::timeout` layer in `server`.
    #[serde(with = "humantime_duration", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_server_port() -> u16 {
    8085
}

fn default_metrics_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_time_window() -> String {
    "1m".to_string()
}

fn default_query_concurrency() -> usize {
    crate::orchestrator::QUERY_CONCURRENCY
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Config {
    /// Load application configuration, respecting `STAT_SUMMARY_CONFIG`.
    pub fn load_from_env() -> Result<Self, anyhow::Error> {
        let path = std::env::var("STAT_SUMMARY_CONFIG")
            .context("missing required env var STAT_SUMMARY_CONFIG")?;
        let content = std::fs::read(&path).context("could not read config file")?;
        let config = serde_json::from_slice(&content).context("could not deserialize config")?;
        Ok(config)
    }
}

/// `#[serde(with = "...")]` shim for a plain (non-Option) `Duration`
/// field parsed with `humantime`, since this crate models durations as
/// strings like `"10s"` rather than the serde-duration crate's structured
/// form.
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let json = r#"{"metrics_backend_url": "http://prometheus:9090"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.server_port, 8085);
        assert_eq!(config.default_time_window, "1m");
        assert_eq!(config.metrics_timeout, Duration::from_secs(10));
    }

    #[test]
    fn parses_explicit_timeouts() {
        let json = r#"{
            "metrics_backend_url": "http://prometheus:9090",
            "metrics_timeout": "5s",
            "request_timeout": "1m"
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.metrics_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }
}
