//! The fixed set of watches a factory registers.

use crate::{
    informer::{self, Informer, Pending, Watched},
    metrics::Instrumented,
    pod_node::PodNodeIndex,
};
use kubedesk_refresh_k8s_api::{self as k8s, resources, Client, ResourceDescriptor};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::Instrument;

/// Watches registered unconditionally. Pod events also feed the pod-by-node
/// index.
pub(crate) fn namespaced(
    client: &Client,
    pod_index: Arc<RwLock<Instrumented<PodNodeIndex>>>,
) -> Vec<Informer> {
    let (pods, pod_events) = informer::reflect::<k8s::Pod>(client.clone());
    let pods = Informer::new(
        resources::PODS,
        pods,
        kubert::index::namespaced(pod_index, pod_events)
            .instrument(tracing::debug_span!("pod_node_index")),
    );

    vec![
        pods,
        Informer::watch::<k8s::ConfigMap>(client.clone(), resources::CONFIG_MAPS),
        Informer::watch::<k8s::Secret>(client.clone(), resources::SECRETS),
        Informer::watch::<k8s::Service>(client.clone(), resources::SERVICES),
        Informer::watch::<k8s::EndpointSlice>(client.clone(), resources::ENDPOINT_SLICES),
        Informer::watch::<k8s::Deployment>(client.clone(), resources::DEPLOYMENTS),
        Informer::watch::<k8s::StatefulSet>(client.clone(), resources::STATEFUL_SETS),
        Informer::watch::<k8s::DaemonSet>(client.clone(), resources::DAEMON_SETS),
        Informer::watch::<k8s::ReplicaSet>(client.clone(), resources::REPLICA_SETS),
        Informer::watch::<k8s::Job>(client.clone(), resources::JOBS),
        Informer::watch::<k8s::CronJob>(client.clone(), resources::CRON_JOBS),
        Informer::watch::<k8s::ServiceAccount>(client.clone(), resources::SERVICE_ACCOUNTS),
        Informer::watch::<k8s::PersistentVolumeClaim>(
            client.clone(),
            resources::PERSISTENT_VOLUME_CLAIMS,
        ),
        Informer::watch::<k8s::ResourceQuota>(client.clone(), resources::RESOURCE_QUOTAS),
        Informer::watch::<k8s::LimitRange>(client.clone(), resources::LIMIT_RANGES),
        Informer::watch::<k8s::Ingress>(client.clone(), resources::INGRESSES),
        Informer::watch::<k8s::NetworkPolicy>(client.clone(), resources::NETWORK_POLICIES),
        Informer::watch::<k8s::HorizontalPodAutoscaler>(
            client.clone(),
            resources::HORIZONTAL_POD_AUTOSCALERS,
        ),
        Informer::watch::<k8s::PodDisruptionBudget>(
            client.clone(),
            resources::POD_DISRUPTION_BUDGETS,
        ),
        Informer::watch::<k8s::Event>(client.clone(), resources::EVENTS),
    ]
}

/// Watches that are held back until `list` and `watch` are known to be
/// permitted.
pub(crate) fn cluster_scoped(client: &Client) -> Vec<Pending> {
    vec![
        pending::<k8s::Node>(client, resources::NODES),
        pending::<k8s::Namespace>(client, resources::NAMESPACES),
        pending::<k8s::ClusterRole>(client, resources::CLUSTER_ROLES),
        pending::<k8s::ClusterRoleBinding>(client, resources::CLUSTER_ROLE_BINDINGS),
        pending::<k8s::Role>(client, resources::ROLES),
        pending::<k8s::RoleBinding>(client, resources::ROLE_BINDINGS),
        pending::<k8s::PersistentVolume>(client, resources::PERSISTENT_VOLUMES),
        pending::<k8s::StorageClass>(client, resources::STORAGE_CLASSES),
        pending::<k8s::IngressClass>(client, resources::INGRESS_CLASSES),
        pending::<k8s::MutatingWebhookConfiguration>(
            client,
            resources::MUTATING_WEBHOOK_CONFIGURATIONS,
        ),
        pending::<k8s::ValidatingWebhookConfiguration>(
            client,
            resources::VALIDATING_WEBHOOK_CONFIGURATIONS,
        ),
        pending::<k8s::CustomResourceDefinition>(client, resources::CUSTOM_RESOURCE_DEFINITIONS),
    ]
}

fn pending<K: Watched>(client: &Client, descriptor: ResourceDescriptor) -> Pending {
    let client = client.clone();
    Pending::new(descriptor, move || Informer::watch::<K>(client, descriptor))
}
