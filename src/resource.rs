//! The closed vocabulary of resource kinds the control plane can report on.
//!
//! A static table, not an open trait hierarchy: the set of kinds is fixed
//! by the wire protocol and never grows at runtime.

use std::fmt;

/// A resource kind known to the control plane, plus the pseudo-kind `all`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Namespace,
    Deployment,
    ReplicaSet,
    Pod,
    Service,
    Authority,
    All,
}

/// The per-kind facts the Planner and Assembler key off of.
struct KindInfo {
    kind: Kind,
    singular: &'static str,
    /// Canonical plural name, also the only string accepted at the wire edge.
    plural: &'static str,
    /// Label key this kind's identity is stored under in metrics samples.
    /// `None` for kinds that never appear as a metrics label themselves
    /// (`namespace` is carried as `namespace=`, `all` never appears).
    label_key: Option<&'static str>,
}

const TABLE: &[KindInfo] = &[
    KindInfo {
        kind: Kind::Namespace,
        singular: "namespace",
        plural: "namespaces",
        label_key: Some("namespace"),
    },
    KindInfo {
        kind: Kind::Deployment,
        singular: "deployment",
        plural: "deployments",
        label_key: Some("deployment"),
    },
    KindInfo {
        kind: Kind::ReplicaSet,
        singular: "replicaset",
        plural: "replicasets",
        label_key: Some("replicaset"),
    },
    KindInfo {
        kind: Kind::Pod,
        singular: "pod",
        plural: "pods",
        label_key: Some("pod"),
    },
    KindInfo {
        kind: Kind::Service,
        singular: "service",
        plural: "services",
        label_key: Some("service"),
    },
    KindInfo {
        kind: Kind::Authority,
        singular: "authority",
        plural: "authorities",
        label_key: Some("authority"),
    },
    KindInfo {
        kind: Kind::All,
        singular: "all",
        plural: "all",
        label_key: None,
    },
];

/// Rejected at the wire edge: not one of the closed set's canonical plurals.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unimplemented resource type: {0}")]
pub struct UnknownKind(pub String);

fn info(kind: Kind) -> &'static KindInfo {
    TABLE.iter().find(|i| i.kind == kind).expect("closed set")
}

impl Kind {
    /// Parse the canonical plural form used on the wire. Aliases (singular
    /// forms, abbreviations) are rejected by design — see spec §4.1.
    pub fn canonicalize(input: &str) -> Result<Self, UnknownKind> {
        TABLE
            .iter()
            .find(|i| i.plural == input)
            .map(|i| i.kind)
            .ok_or_else(|| UnknownKind(input.to_string()))
    }

    pub fn singular(self) -> &'static str {
        info(self).singular
    }

    pub fn plural(self) -> &'static str {
        info(self).plural
    }

    /// The label key under which the metrics backend stores this kind's
    /// identity. `None` for `namespace` used bare and for `all`.
    pub fn label_key(self) -> Option<&'static str> {
        info(self).label_key
    }

    /// `all` expands into the four workload-ish kinds that can actually
    /// appear in a response, in the fixed order the Assembler concatenates
    /// them (namespace is inserted separately, see `planner`/`assembler`).
    pub fn expand_all() -> [Kind; 4] {
        [Kind::Deployment, Kind::Pod, Kind::Service, Kind::Authority]
    }

    pub fn is_all(self) -> bool {
        matches!(self, Kind::All)
    }

    pub fn is_workload_backed(self) -> bool {
        matches!(self, Kind::Deployment | Kind::ReplicaSet | Kind::Pod | Kind::Service)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

/// A `(kind, namespace, name)` triple. `namespace` is empty for the kind
/// `namespace` itself and for cluster-wide authorities; `name` is empty
/// when the query means "list all of this kind in this namespace".
///
/// Only ever constructed by the Validator from a raw wire resource after
/// `Kind::canonicalize` has succeeded - there is deliberately no
/// `Deserialize` impl here, so an unknown kind can't silently become a
/// `ResourceId` anywhere but through that one checked path.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ResourceId {
    pub kind: Kind,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

// Only `Serialize` is given a manual impl (for echoing a kind back in a
// response row); deserializing a `Kind` goes through `canonicalize`
// explicitly in the Validator so an `UnknownKind` can be surfaced as the
// dedicated RPC-level error spec §4.4 requires, not a generic decode error.
impl serde::Serialize for Kind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.plural())
    }
}
