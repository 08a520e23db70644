//! Pod -> Node

use crate::metrics::SizedIndex;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use kubedesk_refresh_k8s_api::{self as k8s, ResourceExt};
use parking_lot::RwLock;
use std::sync::Arc;

pub type SharedPodNodeIndex = Arc<RwLock<PodNodeIndex>>;

/// Indexes pods by the node they are scheduled to (`spec.nodeName`).
///
/// Unscheduled pods are not indexed.
#[derive(Debug, Default)]
pub struct PodNodeIndex {
    by_node: HashMap<String, HashSet<PodRef>>,
    nodes: HashMap<PodRef, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

// === impl PodNodeIndex ===

impl PodNodeIndex {
    pub fn shared() -> SharedPodNodeIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    /// The pods scheduled to `node`, sorted by namespace and name.
    pub fn pods_on_node(&self, node: &str) -> Vec<PodRef> {
        let mut pods = self
            .by_node
            .get(node)
            .map(|pods| pods.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        pods.sort();
        pods
    }

    pub fn node_of(&self, pod: &PodRef) -> Option<&str> {
        self.nodes.get(pod).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_node = HashMap::new();
        self.nodes = HashMap::new();
    }

    fn insert(&mut self, pod: PodRef, node: String) {
        self.remove(&pod);
        self.by_node
            .entry(node.clone())
            .or_default()
            .insert(pod.clone());
        self.nodes.insert(pod, node);
    }

    fn remove(&mut self, pod: &PodRef) {
        let Some(node) = self.nodes.remove(pod) else {
            return;
        };
        if let Some(pods) = self.by_node.get_mut(&node) {
            pods.remove(pod);
            if pods.is_empty() {
                self.by_node.remove(&node);
            }
        }
    }
}

impl SizedIndex for PodNodeIndex {
    fn size(&self) -> usize {
        self.len()
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Pod> for PodNodeIndex {
    fn apply(&mut self, pod: k8s::Pod) {
        let Some(namespace) = pod.namespace() else {
            tracing::warn!(name = %pod.name_any(), "Pod has no namespace");
            return;
        };
        let pod_ref = PodRef {
            namespace,
            name: pod.name_unchecked(),
        };
        match pod
            .spec
            .and_then(|spec| spec.node_name)
            .filter(|node| !node.is_empty())
        {
            Some(node) => self.insert(pod_ref, node),
            None => self.remove(&pod_ref),
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.remove(&PodRef { namespace, name });
    }
}
