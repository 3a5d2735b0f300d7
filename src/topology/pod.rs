//! Pod records and the classifier that buckets them into phase/mesh state.

use k8s_openapi::api::core::v1::Pod as KubePod;

/// The mesh sidecar's version annotation. A pod is meshed iff this
/// annotation is present with a non-empty value.
const MESH_ANNOTATION: &str = "proxy-version";

/// The phase bucket a pod's `status.phase` collapses into, per spec §3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Running,
    Failed,
    Succeeded,
    Pending,
    Unknown,
}

impl Phase {
    fn from_str(phase: Option<&str>) -> Self {
        match phase {
            Some("Running") => Phase::Running,
            Some("Failed") => Phase::Failed,
            Some("Succeeded") => Phase::Succeeded,
            Some("Pending") => Phase::Pending,
            Some(other) => {
                tracing::warn!(phase = %other, "unrecognized pod phase, treating as unknown");
                Phase::Unknown
            }
            None => Phase::Unknown,
        }
    }
}

/// A pod as seen by the Topology View, reduced to what the core needs.
#[derive(Clone, Debug)]
pub struct PodRecord {
    pub namespace: String,
    pub name: String,
    pub owner_kind: Option<String>,
    pub owner_name: Option<String>,
    pub phase: Phase,
    pub meshed: bool,
}

impl PodRecord {
    pub fn from_kube_pod(pod: &KubePod) -> Self {
        let meta = &pod.metadata;
        let phase = Phase::from_str(
            pod.status
                .as_ref()
                .and_then(|s| s.phase.as_deref()),
        );
        let meshed = meta
            .annotations
            .as_ref()
            .and_then(|a| a.get(MESH_ANNOTATION))
            .map(|v| !v.is_empty())
            .unwrap_or(false);

        let owner = meta
            .owner_references
            .as_ref()
            .and_then(|refs| refs.first());

        Self {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
            owner_kind: owner.map(|o| o.kind.clone()),
            owner_name: owner.map(|o| o.name.clone()),
            phase,
            meshed,
        }
    }

    /// Classify this pod per spec §4.3. `running` and `failed` are
    /// mutually exclusive with each other and with neither; a pod in
    /// `Succeeded`/`Pending`/`Unknown` counts toward neither aggregate.
    pub fn classify(&self) -> Classification {
        Classification {
            meshed: self.meshed,
            running: matches!(self.phase, Phase::Running),
            failed: matches!(self.phase, Phase::Failed),
        }
    }
}

/// Output of the Pod Classifier (spec §4.3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub meshed: bool,
    pub running: bool,
    pub failed: bool,
}

/// Fold classifications for a set of pods owned by one response row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PodCounts {
    pub meshed: u64,
    pub running: u64,
    pub failed: u64,
}

impl PodCounts {
    pub fn accumulate(pods: &[PodRecord]) -> Self {
        let mut counts = Self::default();
        for pod in pods {
            let c = pod.classify();
            if c.meshed {
                counts.meshed += 1;
            }
            if c.running {
                counts.running += 1;
            }
            if c.failed {
                counts.failed += 1;
            }
        }
        counts
    }
}
