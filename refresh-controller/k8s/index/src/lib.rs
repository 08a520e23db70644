//! Kubedesk informer factory
//!
//! The factory owns the set of resource watches that keep the console's panels live. Every watch
//! is a kube-rs reflector over a cluster-wide watcher; consumers read the reflector stores.
//!
//! - Namespaced kinds (pods, workloads, config, networking...) are always watched.
//! - Cluster-scoped kinds (nodes, namespaces, RBAC, storage classes, webhooks, CRDs) are only
//!   watched when the current identity may both `list` and `watch` them. Watching a forbidden
//!   resource produces a watch that fails forever, so these registrations are held back until
//!   their permissions have been checked.
//! - Pods are additionally indexed by `spec.nodeName` so that node maintenance flows can find the
//!   pods on a node without scanning the pod store.
//!
//! ```text
//! [ Factory::new ] -> [ prime list/watch ] -> [ register permitted ] -> [ Factory::start ]
//!                           |
//!                 [ Permissions: runtime checker | cache | single-flight review ]
//! ```
//!
//! Authorization decisions are cached per `(group, resource, verb)` with a TTL. Concurrent checks
//! for the same key share a single access review.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod catalog;
mod factory;
mod informer;
pub mod metrics;
mod permissions;
pub mod pod_node;

#[cfg(test)]
mod tests;

pub use self::{
    factory::{Factory, FactoryOptions, StartError},
    metrics::IndexMetrics,
    permissions::{PermissionError, Permissions},
    pod_node::{PodNodeIndex, PodRef},
};
