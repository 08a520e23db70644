//! Process-wide defaults. The runtime exposes most of these as flags.

use std::time::Duration;

/// How long an authorization decision is served from the permission cache.
pub const PERMISSION_CACHE_TTL: Duration = Duration::from_secs(2 * 60);

/// Upper bound on priming cluster-scoped permissions at factory startup.
pub const PERMISSION_PRIME_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of access reviews in flight while priming.
pub const PERMISSION_PRIME_CONCURRENCY: usize = 16;

pub const CAPABILITY_WORKERS: usize = 4;

pub const CAPABILITY_QPS: f64 = 5.0;

/// Access reviews slower than this are logged.
pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_millis(750);

/// Drain jobs retained per node.
pub const DRAIN_MAX_HISTORY: usize = 5;
