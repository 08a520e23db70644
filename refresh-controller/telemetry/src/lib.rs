//! Refresh health telemetry for the diagnostics panel.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod metrics;
mod recorder;
mod status;


pub use self::{
    recorder::Recorder,
    status::{
        BatchProgress, CatalogStatus, ConnectionStats, MetricsStatus, SnapshotStatus,
        StreamStatus, Summary,
    },
};
