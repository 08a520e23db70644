//! Batch evaluation of UI capability checks.
//!
//! The console asks "may I delete this Deployment?"-style questions in batches, typically while
//! rendering context menus for a whole table. Each question becomes an access review. Reviews are
//! issued from a small fixed pool of workers and, optionally, paced by a rate limiter so that a
//! large table does not flood the API server.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod evaluator;
mod metrics;


pub use self::{
    evaluator::{Config, EvaluateError, Evaluator},
    metrics::NamespaceMetrics,
};
