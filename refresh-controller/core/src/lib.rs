//! Shared building blocks for the kubedesk refresh controller.
//!
//! Nothing in this crate talks to a Kubernetes cluster. It holds the pieces the
//! informer factory and the capability evaluator are assembled from:
//!
//! - a [`Clock`] so that TTLs and timestamps can be driven from tests;
//! - a [`Logger`] seam for components whose diagnostics are optional;
//! - the TTL [`permission::PermissionCache`] and the [`flight::Group`] used to
//!   collapse duplicate in-flight authorization checks;
//! - the [`ratelimit::TickerRateLimiter`] that paces outbound access reviews;
//! - the [`capability`] request/result types exchanged with the UI.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod capability;
mod clock;
pub mod defaults;
pub mod flight;
mod logger;
pub mod permission;
pub mod ratelimit;

pub use self::{
    clock::{Clock, ManualClock, SystemClock},
    logger::{Logger, TracingLogger},
};
