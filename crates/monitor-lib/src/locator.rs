//! Pod discovery through the Kubernetes API
//!
//! Lists pods across all namespaces, keeps those whose name starts with the
//! configured prefix and maps them to [`PodDescriptor`]s. Results are sorted
//! by name then namespace so the first entry is stable between polls.

use crate::models::{ContainerSpec, PodDescriptor};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Failure to query the cluster for pods
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("failed to list pods: {0}")]
    Query(#[from] kube::Error),
}

/// Trait for finding candidate pods to monitor
#[async_trait]
pub trait PodLocator: Send + Sync {
    /// Return every pod whose name starts with `prefix`, in a deterministic order
    async fn find_pods(&self, prefix: &str) -> Result<Vec<PodDescriptor>, LocatorError>;
}

/// Locator backed by the Kubernetes API server
pub struct KubePodLocator {
    client: Client,
}

impl KubePodLocator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodLocator for KubePodLocator {
    async fn find_pods(&self, prefix: &str) -> Result<Vec<PodDescriptor>, LocatorError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods.list(&ListParams::default()).await?;

        debug!(total = list.items.len(), prefix = %prefix, "Listed cluster pods");

        Ok(select_pods(&list.items, prefix))
    }
}

/// Filter pods by name prefix and order them by (name, namespace)
pub fn select_pods(pods: &[Pod], prefix: &str) -> Vec<PodDescriptor> {
    let mut selected: Vec<PodDescriptor> = pods
        .iter()
        .filter_map(describe_pod)
        .filter(|pod| pod.name.starts_with(prefix))
        .collect();

    selected.sort_by(|a, b| (&a.name, &a.namespace).cmp(&(&b.name, &b.namespace)));
    selected
}

/// Map a Kubernetes pod object to a descriptor; pods without a name are skipped
pub fn describe_pod(pod: &Pod) -> Option<PodDescriptor> {
    let name = pod.metadata.name.clone()?;
    let status = pod.status.as_ref();

    Some(PodDescriptor {
        name,
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        phase: status.and_then(|s| s.phase.clone()),
        host_ip: status.and_then(|s| s.host_ip.clone()),
        pod_ip: status.and_then(|s| s.pod_ip.clone()),
        creation_timestamp: pod.metadata.creation_timestamp.as_ref().map(|t| t.0),
        containers: pod
            .spec
            .as_ref()
            .map(|spec| spec.containers.iter().map(describe_container).collect())
            .unwrap_or_default(),
    })
}

fn describe_container(container: &Container) -> ContainerSpec {
    let resources = container.resources.as_ref();

    ContainerSpec {
        name: container.name.clone(),
        image: container.image.clone(),
        limits: quantities(resources.and_then(|r| r.limits.as_ref())),
        requests: quantities(resources.and_then(|r| r.requests.as_ref())),
    }
}

fn quantities(map: Option<&BTreeMap<String, Quantity>>) -> BTreeMap<String, String> {
    map.map(|m| m.iter().map(|(k, v)| (k.clone(), v.0.clone())).collect())
        .unwrap_or_default()
}
