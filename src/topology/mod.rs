//! Read-only projection of the cluster's workload graph.
//!
//! Everything here is a snapshot taken at request admission: no component
//! in this module writes back to the cluster, and nothing subscribes to
//! change events. The underlying `kube::Client` may be backed by a local
//! informer cache; that's an implementation detail of the client, not
//! something this module depends on.

pub mod pod;

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Namespace, Pod as KubePod, Service};
use kube::api::{Api, ListParams};

use crate::metrics::Sample;
use crate::resource::{Kind, ResourceId};
use pod::PodRecord;

/// What the Assembler needs from the Topology View for one targeted kind:
/// the set of distinct resources to emit rows for, each with the pods it
/// owns. Abstracted behind a trait so tests can substitute an in-memory
/// fixture instead of a live cluster (spec §8's scenarios never touch a
/// real Kubernetes API).
#[async_trait]
pub trait TopologySource: Send + Sync {
    async fn list_rows(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<(ResourceId, Vec<PodRecord>)>, anyhow::Error>;
}

/// Kubernetes API client wrapper, scoped to the read-only calls the core
/// needs. Mirrors the shape of the operator's own `Client` wrapper: one
/// thin method per verb, `kube::Error` propagated unchanged.
#[derive(Clone)]
pub struct Client {
    kube: kube::Client,
}

impl Client {
    pub async fn connect() -> Result<Self, kube::Error> {
        let kube = kube::Client::try_default().await?;
        Ok(Self { kube })
    }

    #[cfg(test)]
    pub fn from_kube(kube: kube::Client) -> Self {
        Self { kube }
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<String>,
    ) -> Result<Vec<KubePod>, kube::Error> {
        let api: Api<KubePod> = match namespace {
            Some(ns) => Api::namespaced(self.kube.clone(), ns),
            None => Api::all(self.kube.clone()),
        };
        let mut pods = Vec::new();
        let mut params = ListParams {
            label_selector,
            limit: Some(500),
            ..Default::default()
        };
        loop {
            let list = api.list(&params).await?;
            pods.extend(list.items);
            if list.metadata.continue_.is_none() {
                break;
            }
            params.continue_token = list.metadata.continue_;
        }
        Ok(pods)
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, kube::Error> {
        match Api::<Deployment>::namespaced(self.kube.clone(), namespace)
            .get(name)
            .await
        {
            Ok(d) => Ok(Some(d)),
            Err(kube::Error::Api(ref err)) if err.code == 404 => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, kube::Error> {
        match Api::<Service>::namespaced(self.kube.clone(), namespace)
            .get(name)
            .await
        {
            Ok(s) => Ok(Some(s)),
            Err(kube::Error::Api(ref err)) if err.code == 404 => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_replicasets_owned_by(
        &self,
        namespace: &str,
        deployment_name: &str,
    ) -> Result<Vec<ReplicaSet>, kube::Error> {
        let api: Api<ReplicaSet> = Api::namespaced(self.kube.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list
            .items
            .into_iter()
            .filter(|rs| owned_by(&rs.metadata, "Deployment", deployment_name))
            .collect())
    }

    pub async fn namespace_exists(&self, name: &str) -> Result<bool, kube::Error> {
        match Api::<Namespace>::all(self.kube.clone()).get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ref err)) if err.code == 404 => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_deployment_names(&self, namespace: &str) -> Result<Vec<String>, kube::Error> {
        let api: Api<Deployment> = Api::namespaced(self.kube.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.into_iter().filter_map(|d| d.metadata.name).collect())
    }

    async fn list_service_names(&self, namespace: &str) -> Result<Vec<String>, kube::Error> {
        let api: Api<Service> = Api::namespaced(self.kube.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.into_iter().filter_map(|s| s.metadata.name).collect())
    }

    async fn list_replicaset_names(&self, namespace: &str) -> Result<Vec<String>, kube::Error> {
        let api: Api<ReplicaSet> = Api::namespaced(self.kube.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.into_iter().filter_map(|rs| rs.metadata.name).collect())
    }

    async fn list_namespace_names(&self) -> Result<Vec<String>, kube::Error> {
        let list = Api::<Namespace>::all(self.kube.clone())
            .list(&ListParams::default())
            .await?;
        Ok(list.items.into_iter().filter_map(|n| n.metadata.name).collect())
    }
}

fn owned_by(meta: &kube::api::ObjectMeta, kind: &str, name: &str) -> bool {
    meta.owner_references
        .as_ref()
        .map(|refs| refs.iter().any(|o| o.kind == kind && o.name == name))
        .unwrap_or(false)
}

/// Strip a Kubernetes-generated ReplicaSet hash suffix (`-7d8f9c6b47`) to
/// recover the owning Deployment's name. Deployments don't set an owner
/// reference on the ReplicaSets they create via the name alone, so when an
/// owner-reference lookup isn't available this convention is the only way
/// back; kept as a fallback, owner references are tried first.
fn strip_replicaset_hash_suffix(replicaset_name: &str) -> &str {
    match replicaset_name.rfind('-') {
        Some(idx) => &replicaset_name[..idx],
        None => replicaset_name,
    }
}

/// Read-only view over workload topology for a single request.
pub struct TopologyView {
    client: Client,
}

impl TopologyView {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// All pods in `namespace` (or all namespaces, if `None`) owned,
    /// directly or transitively, by `owner`. Results are ordered by name
    /// ascending so Assembler output is stable (spec §4.2).
    pub async fn list_pods(
        &self,
        namespace: Option<&str>,
        owner: &ResourceId,
    ) -> Result<Vec<PodRecord>, anyhow::Error> {
        let mut pods = match owner.kind {
            Kind::Pod => {
                let ns = namespace.unwrap_or(&owner.namespace);
                if owner.name.is_empty() {
                    self.client
                        .list_pods(Some(ns), None)
                        .await
                        .context("listing pods")?
                } else {
                    let all = self.client.list_pods(Some(ns), None).await?;
                    all.into_iter()
                        .filter(|p| p.metadata.name.as_deref() == Some(owner.name.as_str()))
                        .collect()
                }
            }
            Kind::Namespace => self
                .client
                .list_pods(Some(&owner.name), None)
                .await
                .context("listing pods for namespace")?,
            Kind::Deployment => self.list_pods_for_deployment(namespace, owner).await?,
            Kind::ReplicaSet => self.list_pods_for_replicaset(namespace, owner).await?,
            Kind::Service => self.list_pods_for_service(namespace, owner).await?,
            Kind::Authority | Kind::All => Vec::new(),
        };
        pods.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(pods.into_iter().map(|p| PodRecord::from_kube_pod(&p)).collect())
    }

    async fn list_pods_for_deployment(
        &self,
        namespace: Option<&str>,
        owner: &ResourceId,
    ) -> Result<Vec<KubePod>, anyhow::Error> {
        let ns = namespace.unwrap_or(&owner.namespace);
        if owner.name.is_empty() {
            return self
                .client
                .list_pods(Some(ns), None)
                .await
                .context("listing all pods in namespace");
        }

        let deployment = self
            .client
            .get_deployment(ns, &owner.name)
            .await
            .context("fetching deployment")?;

        let selector = deployment
            .as_ref()
            .and_then(|d| d.spec.as_ref())
            .and_then(|s| s.selector.match_labels.clone());

        if let Some(labels) = selector {
            let sel = render_label_selector(&labels);
            return self
                .client
                .list_pods(Some(ns), Some(sel))
                .await
                .context("listing pods by deployment selector");
        }

        // Deployment not found (or has no selector) - fall back to walking
        // owner references via its ReplicaSets.
        let replicasets = self
            .client
            .list_replicasets_owned_by(ns, &owner.name)
            .await
            .context("listing replicasets")?;
        let all_pods = self.client.list_pods(Some(ns), None).await?;
        let rs_names: std::collections::HashSet<_> = replicasets
            .iter()
            .filter_map(|rs| rs.metadata.name.clone())
            .collect();
        Ok(all_pods
            .into_iter()
            .filter(|p| {
                p.metadata
                    .owner_references
                    .as_ref()
                    .map(|refs| {
                        refs.iter()
                            .any(|o| o.kind == "ReplicaSet" && rs_names.contains(&o.name))
                    })
                    .unwrap_or(false)
                    || p.metadata
                        .owner_references
                        .as_ref()
                        .and_then(|refs| refs.first())
                        .map(|o| {
                            o.kind == "ReplicaSet"
                                && strip_replicaset_hash_suffix(&o.name) == owner.name
                        })
                        .unwrap_or(false)
            })
            .collect())
    }

    async fn list_pods_for_replicaset(
        &self,
        namespace: Option<&str>,
        owner: &ResourceId,
    ) -> Result<Vec<KubePod>, anyhow::Error> {
        let ns = namespace.unwrap_or(&owner.namespace);
        let all_pods = self.client.list_pods(Some(ns), None).await?;
        Ok(all_pods
            .into_iter()
            .filter(|p| owned_by(&p.metadata, "ReplicaSet", &owner.name))
            .collect())
    }

    async fn list_pods_for_service(
        &self,
        namespace: Option<&str>,
        owner: &ResourceId,
    ) -> Result<Vec<KubePod>, anyhow::Error> {
        let ns = namespace.unwrap_or(&owner.namespace);
        if owner.name.is_empty() {
            return self
                .client
                .list_pods(Some(ns), None)
                .await
                .context("listing all pods in namespace");
        }
        let service = self
            .client
            .get_service(ns, &owner.name)
            .await
            .context("fetching service")?;
        let selector = service
            .as_ref()
            .and_then(|s| s.spec.as_ref())
            .and_then(|s| s.selector.clone());
        match selector {
            Some(labels) if !labels.is_empty() => {
                let sel = render_label_selector(&labels);
                self.client
                    .list_pods(Some(ns), Some(sel))
                    .await
                    .context("listing pods by service selector")
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Children of a resource in the ownership graph (spec §4.2
    /// `resolveOwners`). Currently exercised for Deployment → ReplicaSet;
    /// other kinds return no children.
    pub async fn resolve_owners(
        &self,
        owner: &ResourceId,
    ) -> Result<Vec<ResourceId>, anyhow::Error> {
        match owner.kind {
            Kind::Deployment if !owner.name.is_empty() => {
                let replicasets = self
                    .client
                    .list_replicasets_owned_by(&owner.namespace, &owner.name)
                    .await?;
                let mut children: Vec<ResourceId> = replicasets
                    .into_iter()
                    .filter_map(|rs| rs.metadata.name)
                    .map(|name| ResourceId::new(Kind::ReplicaSet, owner.namespace.clone(), name))
                    .collect();
                children.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(children)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// The Deployment that transitively owns `pod`, if the owning
    /// ReplicaSet can be attributed to one. Used to roll per-pod metrics
    /// samples up to a deployment-scoped row.
    pub fn resolve_parent_deployment(pod: &PodRecord) -> Option<String> {
        match (pod.owner_kind.as_deref(), pod.owner_name.as_deref()) {
            (Some("ReplicaSet"), Some(rs_name)) => {
                Some(strip_replicaset_hash_suffix(rs_name).to_string())
            }
            _ => None,
        }
    }

    /// Authorities are synthesized from observed traffic, not cluster
    /// objects: this is the union of `authority` label values present in
    /// the metrics result set for the requested scope, name-ascending.
    pub fn list_authorities(samples: &[Sample]) -> Vec<String> {
        let mut names: Vec<String> = samples
            .iter()
            .filter_map(|s| s.labels.get("authority").cloned())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl TopologySource for TopologyView {
    async fn list_rows(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<(ResourceId, Vec<PodRecord>)>, anyhow::Error> {
        if !name.is_empty() {
            let owner = ResourceId::new(kind, namespace, name);
            let pods = self.list_pods(Some(namespace), &owner).await?;
            return Ok(vec![(owner, pods)]);
        }

        let names: Vec<String> = match kind {
            Kind::Deployment => self.client.list_deployment_names(namespace).await?,
            Kind::Service => self.client.list_service_names(namespace).await?,
            Kind::ReplicaSet => self.client.list_replicaset_names(namespace).await?,
            Kind::Namespace => self.client.list_namespace_names().await?,
            Kind::Pod => {
                let pods = self
                    .list_pods(Some(namespace), &ResourceId::new(Kind::Pod, namespace, ""))
                    .await?;
                let mut rows: Vec<(ResourceId, Vec<PodRecord>)> = Vec::new();
                for pod in pods {
                    let id = ResourceId::new(Kind::Pod, pod.namespace.clone(), pod.name.clone());
                    rows.push((id, vec![pod]));
                }
                return Ok(rows);
            }
            Kind::Authority | Kind::All => Vec::new(),
        };

        let mut rows = Vec::with_capacity(names.len());
        for child_name in names {
            let owner = ResourceId::new(kind, namespace, child_name);
            let pods = self.list_pods(Some(namespace), &owner).await?;
            rows.push((owner, pods));
        }
        rows.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        Ok(rows)
    }
}

fn render_label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
pub mod fake {
    use super::*;

    /// An in-memory Topology View fixture: every row it could ever
    /// return is given up front, keyed by kind.
    #[derive(Default)]
    pub struct FakeTopology {
        rows: std::collections::HashMap<Kind, Vec<(ResourceId, Vec<PodRecord>)>>,
    }

    impl FakeTopology {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_rows(mut self, kind: Kind, rows: Vec<(ResourceId, Vec<PodRecord>)>) -> Self {
            self.rows.insert(kind, rows);
            self
        }
    }

    #[async_trait]
    impl TopologySource for FakeTopology {
        async fn list_rows(
            &self,
            kind: Kind,
            namespace: &str,
            name: &str,
        ) -> Result<Vec<(ResourceId, Vec<PodRecord>)>, anyhow::Error> {
            let all = self.rows.get(&kind).cloned().unwrap_or_default();
            Ok(all
                .into_iter()
                .filter(|(id, _)| {
                    (namespace.is_empty() || id.namespace == namespace)
                        && (name.is_empty() || id.name == name)
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hash_suffix() {
        assert_eq!(strip_replicaset_hash_suffix("emoji-7d8f9c6b47"), "emoji");
        assert_eq!(strip_replicaset_hash_suffix("noSuffix"), "noSuffix");
    }

    #[test]
    fn list_authorities_dedupes_and_sorts() {
        let samples = vec![
            Sample {
                labels: [("authority".to_string(), "b.svc".to_string())]
                    .into_iter()
                    .collect(),
                value: 1.0,
            },
            Sample {
                labels: [("authority".to_string(), "a.svc".to_string())]
                    .into_iter()
                    .collect(),
                value: 1.0,
            },
            Sample {
                labels: [("authority".to_string(), "a.svc".to_string())]
                    .into_iter()
                    .collect(),
                value: 2.0,
            },
        ];
        assert_eq!(TopologyView::list_authorities(&samples), vec!["a.svc", "b.svc"]);
    }

    #[test]
    fn render_label_selector_is_comma_joined() {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "emoji".to_string());
        labels.insert("tier".to_string(), "backend".to_string());
        assert_eq!(render_label_selector(&labels), "app=emoji,tier=backend");
    }
}
