//! The resource kinds the refresh controller watches.

use kubedesk_refresh_core::permission::PermissionKey;
use std::fmt;

/// Names a watched resource kind and how it is addressed for authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    pub kind: &'static str,
    /// The API group; empty for the core group.
    pub group: &'static str,
    pub version: &'static str,
    /// The plural resource name used in access reviews.
    pub resource: &'static str,
}

impl ResourceDescriptor {
    const fn new(
        kind: &'static str,
        group: &'static str,
        version: &'static str,
        resource: &'static str,
    ) -> Self {
        Self {
            kind,
            group,
            version,
            resource,
        }
    }

    pub fn permission_key(&self, verb: &str) -> PermissionKey {
        PermissionKey::new(self.group, self.resource, verb)
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

pub const PODS: ResourceDescriptor = ResourceDescriptor::new("Pod", "", "v1", "pods");
pub const CONFIG_MAPS: ResourceDescriptor =
    ResourceDescriptor::new("ConfigMap", "", "v1", "configmaps");
pub const SECRETS: ResourceDescriptor = ResourceDescriptor::new("Secret", "", "v1", "secrets");
pub const SERVICES: ResourceDescriptor = ResourceDescriptor::new("Service", "", "v1", "services");
pub const ENDPOINT_SLICES: ResourceDescriptor =
    ResourceDescriptor::new("EndpointSlice", "discovery.k8s.io", "v1", "endpointslices");
pub const DEPLOYMENTS: ResourceDescriptor =
    ResourceDescriptor::new("Deployment", "apps", "v1", "deployments");
pub const STATEFUL_SETS: ResourceDescriptor =
    ResourceDescriptor::new("StatefulSet", "apps", "v1", "statefulsets");
pub const DAEMON_SETS: ResourceDescriptor =
    ResourceDescriptor::new("DaemonSet", "apps", "v1", "daemonsets");
pub const REPLICA_SETS: ResourceDescriptor =
    ResourceDescriptor::new("ReplicaSet", "apps", "v1", "replicasets");
pub const JOBS: ResourceDescriptor = ResourceDescriptor::new("Job", "batch", "v1", "jobs");
pub const CRON_JOBS: ResourceDescriptor =
    ResourceDescriptor::new("CronJob", "batch", "v1", "cronjobs");
pub const SERVICE_ACCOUNTS: ResourceDescriptor =
    ResourceDescriptor::new("ServiceAccount", "", "v1", "serviceaccounts");
pub const PERSISTENT_VOLUME_CLAIMS: ResourceDescriptor =
    ResourceDescriptor::new("PersistentVolumeClaim", "", "v1", "persistentvolumeclaims");
pub const RESOURCE_QUOTAS: ResourceDescriptor =
    ResourceDescriptor::new("ResourceQuota", "", "v1", "resourcequotas");
pub const LIMIT_RANGES: ResourceDescriptor =
    ResourceDescriptor::new("LimitRange", "", "v1", "limitranges");
pub const INGRESSES: ResourceDescriptor =
    ResourceDescriptor::new("Ingress", "networking.k8s.io", "v1", "ingresses");
pub const NETWORK_POLICIES: ResourceDescriptor =
    ResourceDescriptor::new("NetworkPolicy", "networking.k8s.io", "v1", "networkpolicies");
pub const HORIZONTAL_POD_AUTOSCALERS: ResourceDescriptor = ResourceDescriptor::new(
    "HorizontalPodAutoscaler",
    "autoscaling",
    "v2",
    "horizontalpodautoscalers",
);
pub const POD_DISRUPTION_BUDGETS: ResourceDescriptor =
    ResourceDescriptor::new("PodDisruptionBudget", "policy", "v1", "poddisruptionbudgets");
pub const EVENTS: ResourceDescriptor = ResourceDescriptor::new("Event", "", "v1", "events");

pub const NODES: ResourceDescriptor = ResourceDescriptor::new("Node", "", "v1", "nodes");
pub const NAMESPACES: ResourceDescriptor =
    ResourceDescriptor::new("Namespace", "", "v1", "namespaces");
pub const CLUSTER_ROLES: ResourceDescriptor = ResourceDescriptor::new(
    "ClusterRole",
    "rbac.authorization.k8s.io",
    "v1",
    "clusterroles",
);
pub const CLUSTER_ROLE_BINDINGS: ResourceDescriptor = ResourceDescriptor::new(
    "ClusterRoleBinding",
    "rbac.authorization.k8s.io",
    "v1",
    "clusterrolebindings",
);
pub const ROLES: ResourceDescriptor =
    ResourceDescriptor::new("Role", "rbac.authorization.k8s.io", "v1", "roles");
pub const ROLE_BINDINGS: ResourceDescriptor = ResourceDescriptor::new(
    "RoleBinding",
    "rbac.authorization.k8s.io",
    "v1",
    "rolebindings",
);
pub const PERSISTENT_VOLUMES: ResourceDescriptor =
    ResourceDescriptor::new("PersistentVolume", "", "v1", "persistentvolumes");
pub const STORAGE_CLASSES: ResourceDescriptor =
    ResourceDescriptor::new("StorageClass", "storage.k8s.io", "v1", "storageclasses");
pub const INGRESS_CLASSES: ResourceDescriptor =
    ResourceDescriptor::new("IngressClass", "networking.k8s.io", "v1", "ingressclasses");
pub const MUTATING_WEBHOOK_CONFIGURATIONS: ResourceDescriptor = ResourceDescriptor::new(
    "MutatingWebhookConfiguration",
    "admissionregistration.k8s.io",
    "v1",
    "mutatingwebhookconfigurations",
);
pub const VALIDATING_WEBHOOK_CONFIGURATIONS: ResourceDescriptor = ResourceDescriptor::new(
    "ValidatingWebhookConfiguration",
    "admissionregistration.k8s.io",
    "v1",
    "validatingwebhookconfigurations",
);
pub const CUSTOM_RESOURCE_DEFINITIONS: ResourceDescriptor = ResourceDescriptor::new(
    "CustomResourceDefinition",
    "apiextensions.k8s.io",
    "v1",
    "customresourcedefinitions",
);

/// Kinds watched unconditionally.
pub const NAMESPACED: [ResourceDescriptor; 20] = [
    PODS,
    CONFIG_MAPS,
    SECRETS,
    SERVICES,
    ENDPOINT_SLICES,
    DEPLOYMENTS,
    STATEFUL_SETS,
    DAEMON_SETS,
    REPLICA_SETS,
    JOBS,
    CRON_JOBS,
    SERVICE_ACCOUNTS,
    PERSISTENT_VOLUME_CLAIMS,
    RESOURCE_QUOTAS,
    LIMIT_RANGES,
    INGRESSES,
    NETWORK_POLICIES,
    HORIZONTAL_POD_AUTOSCALERS,
    POD_DISRUPTION_BUDGETS,
    EVENTS,
];

/// Kinds watched only when the identity may both list and watch them
/// cluster-wide.
///
/// Roles and RoleBindings are namespaced, but they are watched across all
/// namespaces and so need the same cluster-wide grant.
pub const CLUSTER_SCOPED: [ResourceDescriptor; 12] = [
    NODES,
    NAMESPACES,
    CLUSTER_ROLES,
    CLUSTER_ROLE_BINDINGS,
    ROLES,
    ROLE_BINDINGS,
    PERSISTENT_VOLUMES,
    STORAGE_CLASSES,
    INGRESS_CLASSES,
    MUTATING_WEBHOOK_CONFIGURATIONS,
    VALIDATING_WEBHOOK_CONFIGURATIONS,
    CUSTOM_RESOURCE_DEFINITIONS,
];
