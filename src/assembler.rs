//! Joins pod counts from the Topology View with samples from the Metrics
//! Client into the `StatTable` rows of a response (spec §4.7).

use crate::metrics::Sample;
use crate::planner::KindPlan;
use crate::resource::{Kind, ResourceId};
use crate::topology::pod::{PodCounts, PodRecord};
use crate::wire::{ResourceRef, Row, Stats};

/// The four query results for one kind, with per-query metrics failures
/// already degraded to an empty vector by the caller (spec §4.6: a
/// failing query zeroes its own metric, it never fails the whole row).
#[derive(Clone, Debug, Default)]
pub struct QuerySamples {
    pub p50: Vec<Sample>,
    pub p95: Vec<Sample>,
    pub p99: Vec<Sample>,
    pub counters: Vec<Sample>,
}

fn row_key(grouping: &[String], sample: &Sample) -> (String, String) {
    let ns_key = grouping.first().map(String::as_str).unwrap_or("namespace");
    let name_key = grouping.get(1).map(String::as_str).unwrap_or("name");
    (
        sample.labels.get(ns_key).cloned().unwrap_or_default(),
        sample.labels.get(name_key).cloned().unwrap_or_default(),
    )
}

fn quantile_for(samples: &[Sample], grouping: &[String], key: &(String, String)) -> f64 {
    samples
        .iter()
        .find(|s| &row_key(grouping, s) == key)
        .map(|s| s.value)
        .unwrap_or(0.0)
}

fn counters_for(samples: &[Sample], grouping: &[String], key: &(String, String)) -> Stats {
    let mut success_count = 0u64;
    let mut failure_count = 0u64;
    let mut tls_request_count = 0u64;

    for sample in samples {
        if &row_key(grouping, sample) != key {
            continue;
        }
        let value = sample.value.round().max(0.0) as u64;
        match sample.labels.get("classification").map(String::as_str) {
            Some("success") => success_count += value,
            Some("failure") => failure_count += value,
            _ => {}
        }
        if sample.labels.get("tls").map(String::as_str) == Some("true") {
            tls_request_count += value;
        }
    }

    Stats {
        success_count,
        failure_count,
        latency_ms_p50: 0.0,
        latency_ms_p95: 0.0,
        latency_ms_p99: 0.0,
        tls_request_count,
    }
}

fn stats_for(plan: &KindPlan, samples: &QuerySamples, key: &(String, String)) -> Stats {
    let mut stats = counters_for(&samples.counters, &plan.grouping, key);
    stats.latency_ms_p50 = quantile_for(&samples.p50, &plan.grouping, key);
    stats.latency_ms_p95 = quantile_for(&samples.p95, &plan.grouping, key);
    stats.latency_ms_p99 = quantile_for(&samples.p99, &plan.grouping, key);
    stats
}

/// Row keys seen in any of the four query results, for kinds where rows
/// are sourced from the metrics backend rather than the topology
/// (authorities - spec §4.7 "rows appearing only in samples ... are
/// emitted when the requested kind is authority").
fn keys_from_samples(grouping: &[String], samples: &QuerySamples) -> Vec<(String, String)> {
    let mut keys: std::collections::BTreeSet<(String, String)> = std::collections::BTreeSet::new();
    for s in samples.p50.iter().chain(&samples.p95).chain(&samples.p99).chain(&samples.counters) {
        keys.insert(row_key(grouping, s));
    }
    keys.into_iter().collect()
}

/// Assemble the rows for one targeted kind.
///
/// `topology_rows` come from the Topology View (empty for `authority`,
/// since authorities aren't cluster objects); `plan`/`samples` are `None`
/// when the Planner's skip rule fired (spec §4.5) - in that case the
/// empty `StatTable` shape is returned untouched.
pub fn assemble_kind(
    kind: Kind,
    topology_rows: Vec<(ResourceId, Vec<PodRecord>)>,
    plan: Option<&KindPlan>,
    samples: Option<&QuerySamples>,
    time_window: &str,
) -> Vec<Row> {
    let mut rows: Vec<Row> = topology_rows
        .into_iter()
        .map(|(id, pods)| {
            let counts = PodCounts::accumulate(&pods);
            let stats = match (plan, samples) {
                (Some(plan), Some(samples)) => {
                    Some(stats_for(plan, samples, &(id.namespace.clone(), id.name.clone())))
                }
                _ => None,
            };
            build_row(id, counts, stats, time_window)
        })
        .collect();

    if kind == Kind::Authority {
        if let (Some(plan), Some(samples)) = (plan, samples) {
            let seen: std::collections::BTreeSet<(String, String)> = rows
                .iter()
                .map(|r| (r.resource.namespace.clone(), r.resource.name.clone()))
                .collect();
            for (namespace, name) in keys_from_samples(&plan.grouping, samples) {
                if seen.contains(&(namespace.clone(), name.clone())) {
                    continue;
                }
                let id = ResourceId::new(Kind::Authority, namespace.clone(), name.clone());
                let stats = stats_for(plan, samples, &(namespace, name));
                // Authorities never carry pod counts (spec §9 open
                // question, resolved: they are not workloads).
                rows.push(build_row(id, PodCounts::default(), Some(stats), time_window));
            }
        }
    }

    rows.sort_by(|a, b| {
        (&a.resource.namespace, &a.resource.name).cmp(&(&b.resource.namespace, &b.resource.name))
    });
    rows
}

fn build_row(id: ResourceId, counts: PodCounts, stats: Option<Stats>, time_window: &str) -> Row {
    Row {
        resource: ResourceRef {
            kind: id.kind,
            namespace: id.namespace,
            name: id.name,
        },
        time_window: time_window.to_string(),
        stats,
        meshed_pod_count: counts.meshed,
        running_pod_count: counts.running,
        failed_pod_count: counts.failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{plan_for_kind, Direction};
    use crate::topology::pod::{PodRecord, Phase};
    use crate::validate::Scope;
    use std::collections::BTreeMap;

    fn pod_record(name: &str, phase: Phase, meshed: bool) -> PodRecord {
        PodRecord {
            namespace: "emojivoto".to_string(),
            name: name.to_string(),
            owner_kind: Some("ReplicaSet".to_string()),
            owner_name: Some("emoji-abcde".to_string()),
            phase,
            meshed,
        }
    }

    fn sample(pairs: &[(&str, &str)], value: f64) -> Sample {
        let mut labels = BTreeMap::new();
        for (k, v) in pairs {
            labels.insert(k.to_string(), v.to_string());
        }
        Sample { labels, value }
    }

    #[test]
    fn s1_deployment_mixed_pods() {
        let selector = ResourceId::new(Kind::Deployment, "emojivoto", "");
        let plan = plan_for_kind(&selector, &Scope::None, "1m");
        assert_eq!(plan.direction, Direction::Inbound);

        let pods = vec![
            pod_record("emojivoto-meshed", Phase::Running, true),
            pod_record("emojivoto-not-meshed", Phase::Running, false),
            pod_record("emojivoto-meshed-not-running", Phase::Succeeded, true),
        ];
        let topology_rows = vec![(
            ResourceId::new(Kind::Deployment, "emojivoto", "emoji"),
            pods,
        )];

        let samples = QuerySamples {
            p50: vec![sample(&[("namespace", "emojivoto"), ("deployment", "emoji")], 123.0)],
            p95: vec![sample(&[("namespace", "emojivoto"), ("deployment", "emoji")], 123.0)],
            p99: vec![sample(&[("namespace", "emojivoto"), ("deployment", "emoji")], 123.0)],
            counters: vec![sample(
                &[
                    ("namespace", "emojivoto"),
                    ("deployment", "emoji"),
                    ("classification", "success"),
                    ("tls", "true"),
                ],
                123.0,
            )],
        };

        let rows = assemble_kind(
            Kind::Deployment,
            topology_rows,
            Some(&plan),
            Some(&samples),
            "1m",
        );

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.resource.name, "emoji");
        assert_eq!(row.meshed_pod_count, 1);
        assert_eq!(row.running_pod_count, 2);
        assert_eq!(row.failed_pod_count, 0);
        let stats = row.stats.as_ref().unwrap();
        assert_eq!(stats.success_count, 123);
        assert_eq!(stats.tls_request_count, 123);
        assert_eq!(stats.latency_ms_p50, 123.0);
        assert_eq!(stats.latency_ms_p99, 123.0);
    }

    #[test]
    fn skipped_kind_has_no_rows_and_no_stats() {
        let rows = assemble_kind(Kind::Pod, Vec::new(), None, None, "1m");
        assert!(rows.is_empty());
    }

    #[test]
    fn kind_backed_row_with_no_matching_samples_gets_zero_stats() {
        let selector = ResourceId::new(Kind::Pod, "emojivoto", "emojivoto-1");
        let plan = plan_for_kind(&selector, &Scope::None, "1m");
        let topology_rows = vec![(selector.clone(), vec![pod_record("emojivoto-1", Phase::Running, true)])];
        let samples = QuerySamples::default();

        let rows = assemble_kind(Kind::Pod, topology_rows, Some(&plan), Some(&samples), "1m");
        assert_eq!(rows.len(), 1);
        let stats = rows[0].stats.as_ref().unwrap();
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.latency_ms_p50, 0.0);
    }

    #[test]
    fn authority_rows_come_only_from_samples_and_carry_no_pod_counts() {
        let selector = ResourceId::new(Kind::Authority, "emojivoto", "");
        let plan = plan_for_kind(&selector, &Scope::None, "1m");
        let samples = QuerySamples {
            counters: vec![sample(
                &[
                    ("namespace", "emojivoto"),
                    ("authority", "web.emojivoto.svc.cluster.local"),
                    ("classification", "success"),
                    ("tls", "false"),
                ],
                42.0,
            )],
            ..Default::default()
        };

        let rows = assemble_kind(Kind::Authority, Vec::new(), Some(&plan), Some(&samples), "1m");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].resource.name, "web.emojivoto.svc.cluster.local");
        assert_eq!(rows[0].meshed_pod_count, 0);
        assert_eq!(rows[0].running_pod_count, 0);
        assert_eq!(rows[0].failed_pod_count, 0);
        assert_eq!(rows[0].stats.as_ref().unwrap().success_count, 42);
    }

    #[test]
    fn rows_are_ordered_namespace_then_name() {
        let pods_a = vec![pod_record("a", Phase::Running, false)];
        let pods_b = vec![pod_record("b", Phase::Running, false)];
        let topology_rows = vec![
            (ResourceId::new(Kind::Pod, "emojivoto", "z-pod"), pods_b),
            (ResourceId::new(Kind::Pod, "emojivoto", "a-pod"), pods_a),
        ];
        let rows = assemble_kind(Kind::Pod, topology_rows, None, None, "1m");
        assert_eq!(rows[0].resource.name, "a-pod");
        assert_eq!(rows[1].resource.name, "z-pod");
    }
}
