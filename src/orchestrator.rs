//! Ties the Validator, Topology View, Query Planner, Metrics Client and
//! Response Assembler into the single `stat_summary` entry point (spec
//! §4.8). Nothing in here talks to the network or the cluster directly -
//! it only ever goes through the two trait seams, so it's exercised in
//! tests against in-memory fakes exactly like a real request would hit it.

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::assembler::{self, QuerySamples};
use crate::config::Config;
use crate::error::CoreError;
use crate::metrics::{MetricsClient, Sample};
use crate::planner::{self, KindPlan};
use crate::resource::{Kind, ResourceId};
use crate::telemetry::CoreMetrics;
use crate::topology::pod::PodRecord;
use crate::topology::TopologySource;
use crate::validate;
use crate::wire::{StatSummaryRequest, StatSummaryResponse, StatTable};

/// Upper bound on metrics queries in flight at once, across every kind
/// targeted by a single request.
pub const QUERY_CONCURRENCY: usize = 8;

/// One row of the `all` expansion, or the lone entry for a targeted
/// request: which kind/namespace/name to enumerate, independent of
/// whether its queries end up running.
///
/// `all` expands to exactly the four kinds `Kind::expand_all()` names
/// (spec §3 invariant "for `all`, exactly four tables" and §8 testable
/// property #1, both stated unconditionally) in the fixed order
/// `{authority, deployment, pod, service}` from spec §4.5 minus the
/// `namespace` entry that table also lists - `namespace` is never one of
/// `expand_all()`'s four kinds, so it never becomes a `StatTable` here,
/// cluster-wide request or not.
fn targets_for(selector: &ResourceId) -> Vec<ResourceId> {
    if selector.kind != Kind::All {
        return vec![selector.clone()];
    }

    // Spec §4.5's `{namespace, authority, deployment, pod, service}`
    // response order, with `namespace` dropped (see doc comment above):
    // this is a presentation order, distinct from `expand_all()`'s data-
    // model order `{deployment, pod, service, authority}` (spec §3).
    const STAT_TABLE_ORDER: [Kind; 4] = [Kind::Authority, Kind::Deployment, Kind::Pod, Kind::Service];
    debug_assert!(STAT_TABLE_ORDER
        .iter()
        .all(|k| Kind::expand_all().contains(k)));

    STAT_TABLE_ORDER
        .into_iter()
        .map(|kind| ResourceId::new(kind, selector.namespace.clone(), ""))
        .collect()
}

struct Target {
    id: ResourceId,
    rows: Vec<(ResourceId, Vec<PodRecord>)>,
    plan: Option<KindPlan>,
}

fn total_running(rows: &[(ResourceId, Vec<PodRecord>)]) -> u64 {
    rows.iter()
        .flat_map(|(_, pods)| pods)
        .filter(|p| p.classify().running)
        .count() as u64
}

/// Run the metrics queries belonging to every planned target, bounded by
/// `QUERY_CONCURRENCY` across the whole request rather than per kind -
/// an `all` request fans out up to four kinds at once and shouldn't let
/// that multiply the load on the metrics backend.
async fn run_queries(
    metrics: &dyn MetricsClient,
    targets: &[Target],
    concurrency: usize,
    core_metrics: &CoreMetrics,
) -> Vec<Option<QuerySamples>> {
    let mut jobs: Vec<(usize, usize, String)> = Vec::new();
    for (target_idx, target) in targets.iter().enumerate() {
        if let Some(plan) = &target.plan {
            for (slot, promql) in plan.queries().iter().enumerate() {
                jobs.push((target_idx, slot, promql.to_string()));
            }
        }
    }

    let results: Vec<(usize, usize, Vec<Sample>)> = stream::iter(jobs)
        .map(|(target_idx, slot, promql)| async move {
            core_metrics.queries_issued.inc();
            let at = Utc::now();
            let samples = match metrics.query(&promql, at).await {
                Ok(samples) => samples,
                Err(err) => {
                    core_metrics.queries_failed.inc();
                    tracing::warn!(query = %promql, error = %err, "metrics query failed, degrading to zero");
                    Vec::new()
                }
            };
            (target_idx, slot, samples)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut out: Vec<Option<QuerySamples>> = targets.iter().map(|t| t.plan.as_ref().map(|_| QuerySamples::default())).collect();
    for (target_idx, slot, samples) in results {
        if let Some(Some(q)) = out.get_mut(target_idx) {
            match slot {
                0 => q.p50 = samples,
                1 => q.p95 = samples,
                2 => q.p99 = samples,
                3 => q.counters = samples,
                _ => unreachable!("KindPlan::queries() always returns exactly 4"),
            }
        }
    }
    out
}

/// Validate, enumerate, query and assemble a `StatSummary` response.
///
/// Returns `Err` only for the RPC-level failures of spec §7
/// (`UnknownKind`, `TopologyUnavailable`) - request-level rejections
/// (`InvalidScope`, `InvalidTimeWindow`) come back as
/// `Ok(StatSummaryResponse::Error)`, matching the wire contract.
pub async fn stat_summary(
    request: &StatSummaryRequest,
    topology: &dyn TopologySource,
    metrics: &dyn MetricsClient,
    config: &Config,
    core_metrics: &CoreMetrics,
) -> Result<StatSummaryResponse, CoreError> {
    let validated = match validate::validate(request, &config.default_time_window) {
        Ok(v) => v,
        Err(e) if e.is_response_error() => {
            return Ok(StatSummaryResponse::Error { message: e.to_string() })
        }
        Err(e) => return Err(e),
    };

    let mut targets = Vec::new();
    for id in targets_for(&validated.selector) {
        let rows = topology
            .list_rows(id.kind, &id.namespace, &id.name)
            .await
            .map_err(|e| CoreError::TopologyUnavailable(e.to_string()))?;

        let (rows, plan) = if id.kind.is_workload_backed() && total_running(&rows) == 0 {
            // Spec §4.5 skip rule: nothing running means nothing to
            // measure - skip the queries and report no rows at all,
            // rather than rows full of zeros.
            (Vec::new(), None)
        } else {
            let plan = planner::plan_for_kind(&id, &validated.scope, &validated.time_window);
            (rows, Some(plan))
        };

        targets.push(Target { id, rows, plan });
    }

    let samples = run_queries(metrics, &targets, config.query_concurrency, core_metrics).await;

    let stat_tables = targets
        .into_iter()
        .zip(samples)
        .map(|(target, samples)| {
            let rows = assembler::assemble_kind(
                target.id.kind,
                target.rows,
                target.plan.as_ref(),
                samples.as_ref(),
                &validated.time_window,
            );
            StatTable { kind: target.id.kind, rows }
        })
        .collect();

    Ok(StatSummaryResponse::Ok { stat_tables })
}
