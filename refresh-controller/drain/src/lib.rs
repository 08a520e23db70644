//! Node drain job tracking.
//!
//! Node maintenance flows record the progress of each drain here so that the console can poll a
//! node's recent drains. Polling consumers compare [`Snapshot::version`] to detect changes without
//! diffing jobs.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod job;
mod store;


pub use self::{
    job::{ClusterRef, DrainEvent, DrainJob, DrainOptions, DrainStatus, EventKind, Snapshot},
    store::{DrainJobHandle, Store},
};
