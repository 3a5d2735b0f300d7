//! The HTTP/JSON wire contract (spec §6). A JSON rendering of the
//! protobuf-shaped messages described there, since transport framing
//! itself is explicitly out of scope (spec §1) and this core exposes
//! itself over the same kind of `axum` JSON surface the rest of this
//! codebase already uses.

use serde::{Deserialize, Serialize};

use crate::resource::Kind;

/// A resource reference as it arrives on the wire: `kind` is an
/// unvalidated string until the Validator runs it through
/// `Kind::canonicalize`.
#[derive(Debug, Clone, Deserialize)]
pub struct WireResource {
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireSelector {
    pub resource: WireResource,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StatSummaryRequest {
    pub selector: Option<WireSelector>,
    #[serde(default)]
    pub time_window: String,
    #[serde(default)]
    pub to_resource: Option<WireResource>,
    #[serde(default)]
    pub from_resource: Option<WireResource>,
}

/// `StatSummaryResponse = oneof { ok, error }` (spec §6.2). The response
/// never mixes the two branches.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatSummaryResponse {
    Ok { stat_tables: Vec<StatTable> },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatTable {
    pub kind: Kind,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceRef {
    pub kind: Kind,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub success_count: u64,
    pub failure_count: u64,
    pub latency_ms_p50: f64,
    pub latency_ms_p95: f64,
    pub latency_ms_p99: f64,
    pub tls_request_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Row {
    pub resource: ResourceRef,
    pub time_window: String,
    /// Absent when the kind's queries were skipped entirely (spec
    /// §4.5 skip rule), present with zeros when queries ran but found
    /// no matching samples (spec §4.7 join policy).
    pub stats: Option<Stats>,
    pub meshed_pod_count: u64,
    pub running_pod_count: u64,
    pub failed_pod_count: u64,
}
