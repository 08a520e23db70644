#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod access_review;
pub mod resources;

pub use self::{
    access_review::{AccessDecision, AccessReviewer, ReviewError},
    resources::ResourceDescriptor,
};
pub use k8s_openapi::{
    api::{
        self,
        admissionregistration::v1::{MutatingWebhookConfiguration, ValidatingWebhookConfiguration},
        apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
        autoscaling::v2::HorizontalPodAutoscaler,
        batch::v1::{CronJob, Job},
        core::v1::{
            ConfigMap, Event, LimitRange, Namespace, Node, PersistentVolume,
            PersistentVolumeClaim, Pod, PodSpec, ResourceQuota, Secret, Service, ServiceAccount,
        },
        discovery::v1::EndpointSlice,
        networking::v1::{Ingress, IngressClass, NetworkPolicy},
        policy::v1::PodDisruptionBudget,
        rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
        storage::v1::StorageClass,
    },
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
pub use kube::{
    api::{Api, ObjectMeta, ResourceExt},
    runtime::{reflector, watcher, WatchStreamExt},
    Client, Error, Resource,
};
