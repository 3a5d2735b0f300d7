//! Turns a validated request into the PromQL-style queries that measure
//! it (spec §4.5). The label algebra here is the part of this codebase
//! where a subtle mistake silently returns wrong numbers, so every case
//! in the spec's table has a dedicated branch rather than a clever
//! unification - easier to audit against the table line by line.

use std::collections::BTreeMap;

use crate::resource::{Kind, ResourceId};
use crate::validate::Scope;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Direction is derived, never user-supplied (spec §4.5 direction rule).
pub fn direction_for(scope: &Scope) -> Direction {
    match scope {
        Scope::None => Direction::Inbound,
        Scope::From(_) | Scope::To(_) => Direction::Outbound,
    }
}

/// The four PromQL-style queries emitted for one targeted kind, plus the
/// label/grouping context they were built from (kept around for the
/// Assembler to pick matching samples back out, and for tests to assert
/// on the exact label clause).
#[derive(Clone, Debug, PartialEq)]
pub struct KindPlan {
    pub direction: Direction,
    pub labels: BTreeMap<String, String>,
    pub grouping: Vec<String>,
    pub latency_p50: String,
    pub latency_p95: String,
    pub latency_p99: String,
    pub counters: String,
}

impl KindPlan {
    pub fn queries(&self) -> [&str; 4] {
        [
            &self.latency_p50,
            &self.latency_p95,
            &self.latency_p99,
            &self.counters,
        ]
    }
}

fn render_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

fn build(
    direction: Direction,
    mut labels: BTreeMap<String, String>,
    grouping: Vec<String>,
    time_window: &str,
) -> KindPlan {
    labels.insert("direction".to_string(), direction.as_str().to_string());
    let label_clause = render_labels(&labels);
    let group_list = grouping.join(", ");
    let histogram_group = format!("le, {group_list}");

    let latency = |quantile: &str| {
        format!(
            "histogram_quantile({quantile}, sum(irate(response_latency_ms_bucket{{{label_clause}}}[{time_window}])) by ({histogram_group}))"
        )
    };

    let counters = format!(
        "sum(increase(response_total{{{label_clause}}}[{time_window}])) by ({group_list}, classification, tls)"
    );

    KindPlan {
        direction,
        labels,
        grouping,
        latency_p50: latency("0.5"),
        latency_p95: latency("0.95"),
        latency_p99: latency("0.99"),
        counters,
    }
}

/// Build the plan for a single targeted kind, given the effective
/// selector for this iteration (for `all`, the per-kind substitution
/// described in `Orchestrator`; otherwise the request's own selector)
/// and the request's scope.
pub fn plan_for_kind(effective_selector: &ResourceId, scope: &Scope, time_window: &str) -> KindPlan {
    let direction = direction_for(scope);
    let kind = effective_selector.kind;

    match scope {
        Scope::None if kind == Kind::Authority => {
            let mut labels = BTreeMap::new();
            labels.insert("namespace".to_string(), effective_selector.namespace.clone());
            if !effective_selector.name.is_empty() {
                labels.insert("authority".to_string(), effective_selector.name.clone());
            }
            build(
                direction,
                labels,
                vec!["namespace".to_string(), "authority".to_string()],
                time_window,
            )
        }
        Scope::None => {
            let label_key = kind.label_key().unwrap_or("namespace").to_string();
            let mut labels = BTreeMap::new();
            labels.insert("namespace".to_string(), effective_selector.namespace.clone());
            labels.insert(label_key.clone(), effective_selector.name.clone());
            build(
                direction,
                labels,
                vec!["namespace".to_string(), label_key],
                time_window,
            )
        }
        Scope::To(peer) => {
            let selector_label_key = kind.label_key().unwrap_or("namespace").to_string();
            let peer_label_key = peer.kind.label_key().unwrap_or("namespace").to_string();

            let mut labels = BTreeMap::new();
            labels.insert("namespace".to_string(), effective_selector.namespace.clone());
            labels.insert(selector_label_key.clone(), effective_selector.name.clone());
            labels.insert("dst_namespace".to_string(), peer.namespace.clone());
            labels.insert(format!("dst_{peer_label_key}"), peer.name.clone());

            build(
                direction,
                labels,
                vec!["namespace".to_string(), selector_label_key],
                time_window,
            )
        }
        Scope::From(peer) => {
            let peer_label_key = peer.kind.label_key().unwrap_or("namespace").to_string();

            let mut labels = BTreeMap::new();
            if !peer.namespace.is_empty() {
                labels.insert("namespace".to_string(), peer.namespace.clone());
            }
            labels.insert(peer_label_key, peer.name.clone());

            let grouping = if kind == Kind::Authority {
                vec!["dst_namespace".to_string(), "authority".to_string()]
            } else {
                let selector_label_key = kind.label_key().unwrap_or("namespace").to_string();
                vec!["dst_namespace".to_string(), format!("dst_{selector_label_key}")]
            };

            build(direction, labels, grouping, time_window)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(kind: Kind, ns: &str, name: &str) -> ResourceId {
        ResourceId::new(kind, ns, name)
    }

    #[test]
    fn s2_named_pod_inbound() {
        let selector = rid(Kind::Pod, "emojivoto", "emojivoto-1");
        let plan = plan_for_kind(&selector, &Scope::None, "1m");

        assert_eq!(plan.direction, Direction::Inbound);
        assert_eq!(
            plan.latency_p50,
            "histogram_quantile(0.5, sum(irate(response_latency_ms_bucket{direction=\"inbound\", namespace=\"emojivoto\", pod=\"emojivoto-1\"}[1m])) by (le, namespace, pod))"
        );
        assert_eq!(
            plan.latency_p95,
            "histogram_quantile(0.95, sum(irate(response_latency_ms_bucket{direction=\"inbound\", namespace=\"emojivoto\", pod=\"emojivoto-1\"}[1m])) by (le, namespace, pod))"
        );
        assert_eq!(
            plan.counters,
            "sum(increase(response_total{direction=\"inbound\", namespace=\"emojivoto\", pod=\"emojivoto-1\"}[1m])) by (namespace, pod, classification, tls)"
        );
    }

    #[test]
    fn s3_to_resource_cross_namespace() {
        let selector = rid(Kind::Pod, "emojivoto", "emojivoto-1");
        let scope = Scope::To(rid(Kind::Pod, "totallydifferent", "emojivoto-2"));
        let plan = plan_for_kind(&selector, &scope, "1m");

        assert_eq!(plan.direction, Direction::Outbound);
        assert_eq!(
            plan.labels.get("dst_namespace").unwrap(),
            "totallydifferent"
        );
        assert_eq!(plan.labels.get("dst_pod").unwrap(), "emojivoto-2");
        assert_eq!(plan.labels.get("namespace").unwrap(), "emojivoto");
        assert_eq!(plan.labels.get("pod").unwrap(), "emojivoto-1");
        assert_eq!(plan.grouping, vec!["namespace", "pod"]);
        assert!(plan.latency_p50.contains("direction=\"outbound\""));
    }

    #[test]
    fn s4_from_resource_empty_peer_namespace_ignores_selector_name() {
        let selector = rid(Kind::Pod, "emojivoto", "emojivoto-1");
        let scope = Scope::From(rid(Kind::Pod, "", "emojivoto-2"));
        let plan = plan_for_kind(&selector, &scope, "1m");

        assert!(!plan.labels.contains_key("namespace"));
        assert_eq!(plan.labels.get("pod").unwrap(), "emojivoto-2");
        assert_eq!(plan.grouping, vec!["dst_namespace", "dst_pod"]);
    }

    #[test]
    fn from_resource_with_namespace_includes_it() {
        let selector = rid(Kind::Pod, "emojivoto", "emojivoto-1");
        let scope = Scope::From(rid(Kind::Pod, "other-ns", "emojivoto-2"));
        let plan = plan_for_kind(&selector, &scope, "1m");
        assert_eq!(plan.labels.get("namespace").unwrap(), "other-ns");
    }

    #[test]
    fn from_resource_selector_authority_groups_by_authority() {
        let selector = rid(Kind::Authority, "", "web.emojivoto.svc.cluster.local");
        let scope = Scope::From(rid(Kind::Pod, "emojivoto", "emojivoto-2"));
        let plan = plan_for_kind(&selector, &scope, "1m");
        assert_eq!(plan.grouping, vec!["dst_namespace", "authority"]);
    }

    #[test]
    fn no_scope_authority_named() {
        let selector = rid(Kind::Authority, "emojivoto", "web.emojivoto.svc.cluster.local");
        let plan = plan_for_kind(&selector, &Scope::None, "1m");
        assert_eq!(
            plan.labels.get("authority").unwrap(),
            "web.emojivoto.svc.cluster.local"
        );
        assert_eq!(plan.grouping, vec!["namespace", "authority"]);
    }

    #[test]
    fn no_scope_authority_unnamed_omits_authority_label() {
        let selector = rid(Kind::Authority, "emojivoto", "");
        let plan = plan_for_kind(&selector, &Scope::None, "1m");
        assert!(!plan.labels.contains_key("authority"));
    }

    #[test]
    fn label_clause_is_alphabetically_sorted() {
        let selector = rid(Kind::Pod, "emojivoto", "emojivoto-1");
        let scope = Scope::To(rid(Kind::Pod, "totallydifferent", "emojivoto-2"));
        let plan = plan_for_kind(&selector, &scope, "1m");
        let keys: Vec<&String> = plan.labels.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
