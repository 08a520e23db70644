use crate::status::{
    CatalogStatus, ConnectionStats, MetricsStatus, SnapshotStatus, StreamStatus, Summary,
};
use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use kubedesk_refresh_core::{Clock, SystemClock};
use parking_lot::Mutex;
use std::{fmt, sync::Arc, time::Duration};

const CATALOG_FALLBACK: &str = "catalog fallback";
const HYDRATION: &str = "hydration";

const STATUS_SUCCESS: &str = "success";
const STATUS_ERROR: &str = "error";

/// Aggregates refresh, metrics, stream and connection health for the
/// diagnostics panel.
///
/// Every `record_*` method is a state transition applied under one lock:
/// counters increase, "last" fields are replaced and derived fields are
/// recomputed.
pub struct Recorder {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    catalog: CatalogStatus,
    snapshots: HashMap<String, SnapshotStatus>,
    metrics: MetricsStatus,
    connection: ConnectionStats,
    streams: HashMap<String, StreamStatus>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// === impl Recorder ===

impl Default for Recorder {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Recorder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::default(),
        }
    }

    pub fn record_catalog_sync(
        &self,
        item_count: usize,
        resource_count: usize,
        duration: Duration,
        error: Option<&str>,
    ) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let catalog = &mut state.catalog;
        catalog.last_duration_ms = millis(duration);
        match error {
            Some(error) => {
                catalog.failure_count += 1;
                catalog.last_error = error.to_string();
            }
            None => {
                catalog.success_count += 1;
                catalog.last_error.clear();
                catalog.item_count = item_count;
                catalog.resource_count = resource_count;
                catalog.last_synced_at = Some(now);
            }
        }
    }

    /// Records one refresh of `domain`.
    ///
    /// Warnings mentioning a catalog fallback or incomplete hydration are
    /// counted separately.
    pub fn record_snapshot(
        &self,
        domain: &str,
        scope: &str,
        duration: Duration,
        error: Option<&str>,
        warnings: &[String],
    ) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let snapshot = state
            .snapshots
            .entry(domain.to_string())
            .or_insert_with(|| SnapshotStatus {
                domain: domain.to_string(),
                ..Default::default()
            });

        snapshot.scope = scope.to_string();
        snapshot.last_updated = Some(now);
        snapshot.last_duration_ms = millis(duration);
        snapshot.total_duration_ms = snapshot
            .total_duration_ms
            .saturating_add(snapshot.last_duration_ms);
        match error {
            Some(error) => {
                snapshot.failure_count += 1;
                snapshot.last_status = STATUS_ERROR.to_string();
                snapshot.last_error = error.to_string();
            }
            None => {
                snapshot.success_count += 1;
                snapshot.last_status = STATUS_SUCCESS.to_string();
                snapshot.last_error.clear();
            }
        }
        let refreshes = snapshot.success_count + snapshot.failure_count;
        snapshot.average_duration_ms = snapshot.total_duration_ms / refreshes;

        for warning in warnings {
            if warning.contains(CATALOG_FALLBACK) {
                snapshot.fallback_count += 1;
            }
            if warning.contains(HYDRATION) {
                snapshot.hydration_count += 1;
            }
        }
        snapshot.last_warning = warnings.join("; ");
    }

    pub fn record_snapshot_batch(
        &self,
        domain: &str,
        batch_index: usize,
        batch_size: usize,
        total_batches: usize,
        is_final: bool,
    ) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let snapshot = state
            .snapshots
            .entry(domain.to_string())
            .or_insert_with(|| SnapshotStatus {
                domain: domain.to_string(),
                ..Default::default()
            });
        snapshot.batch.index = batch_index;
        snapshot.batch.size = batch_size;
        snapshot.batch.total = total_batches;
        snapshot.batch.is_final = is_final;
        snapshot.last_updated = Some(now);
    }

    pub fn record_metrics_poll(
        &self,
        duration: Duration,
        collected_at: Option<DateTime<Utc>>,
        error: Option<&str>,
        consecutive_failures: u32,
        active: bool,
    ) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let metrics = &mut state.metrics;
        metrics.active = active;
        metrics.last_duration_ms = millis(duration);
        metrics.consecutive_failures = consecutive_failures;
        metrics.last_updated = Some(now);
        match error {
            Some(error) => {
                metrics.failure_count += 1;
                metrics.last_error = error.to_string();
            }
            None => {
                metrics.success_count += 1;
                metrics.last_error.clear();
                if collected_at.is_some() {
                    metrics.last_collected_at = collected_at;
                }
            }
        }
    }

    pub fn record_connection_state(&self, state: &str, reason: &str) {
        let now = self.clock.now();
        let mut guard = self.state.lock();
        let connection = &mut guard.connection;
        if connection.state != state {
            connection.transitions += 1;
            connection.last_transition_at = Some(now);
            tracing::debug!(from = %connection.state, to = %state, %reason, "Connection state changed");
        }
        connection.state = state.to_string();
        connection.reason = reason.to_string();
    }

    pub fn record_retry(&self, reason: &str) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let connection = &mut state.connection;
        connection.retry_count += 1;
        connection.last_retry_reason = reason.to_string();
        connection.last_retry_at = Some(now);
    }

    pub fn record_stream_connect(&self, name: &str) {
        let now = self.clock.now();
        self.update_stream(name, |stream| {
            stream.active_sessions += 1;
            stream.total_sessions += 1;
            stream.last_connected_at = Some(now);
        });
    }

    pub fn record_stream_disconnect(&self, name: &str) {
        self.update_stream(name, |stream| {
            stream.active_sessions = stream.active_sessions.saturating_sub(1);
        });
    }

    pub fn record_stream_delivery(&self, name: &str, count: u64, dropped: u64) {
        let now = self.clock.now();
        self.update_stream(name, |stream| {
            stream.delivered += count;
            stream.dropped += dropped;
            stream.last_event_at = Some(now);
        });
    }

    pub fn record_stream_error(&self, name: &str, error: &str) {
        let now = self.clock.now();
        self.update_stream(name, |stream| {
            stream.errors += 1;
            stream.last_error = error.to_string();
            stream.last_event_at = Some(now);
        });
    }

    fn update_stream(&self, name: &str, f: impl FnOnce(&mut StreamStatus)) {
        let mut state = self.state.lock();
        let stream = state
            .streams
            .entry(name.to_string())
            .or_insert_with(|| StreamStatus {
                name: name.to_string(),
                ..Default::default()
            });
        f(stream);
    }

    /// A copy of the recorded state that later records do not affect.
    pub fn summary(&self) -> Summary {
        let generated_at = self.clock.now();
        let state = self.state.lock();

        let mut snapshots = state.snapshots.values().cloned().collect::<Vec<_>>();
        snapshots.sort_by(|a, b| a.domain.cmp(&b.domain));
        let mut streams = state.streams.values().cloned().collect::<Vec<_>>();
        streams.sort_by(|a, b| a.name.cmp(&b.name));

        Summary {
            catalog: state.catalog.clone(),
            snapshots,
            metrics: state.metrics.clone(),
            connection: state.connection.clone(),
            streams,
            generated_at: Some(generated_at),
        }
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("state", &*self.state.lock())
            .finish()
    }
}
