#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use kubedesk_refresh_capabilities as capabilities;
pub use kubedesk_refresh_core as core;
pub use kubedesk_refresh_drain as drain;
pub use kubedesk_refresh_k8s_api as k8s;
pub use kubedesk_refresh_k8s_index as index;
pub use kubedesk_refresh_telemetry as telemetry;

mod args;
mod services;

#[cfg(test)]
mod tests;

pub use self::{
    args::Args,
    services::{Config, Services},
};
