use chrono::{DateTime, Utc};
use serde::Serialize;

/// A detached view of everything the recorder has observed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub catalog: CatalogStatus,
    /// Ordered by domain.
    pub snapshots: Vec<SnapshotStatus>,
    pub metrics: MetricsStatus,
    pub connection: ConnectionStats,
    /// Ordered by stream name.
    pub streams: Vec<StreamStatus>,
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStatus {
    pub item_count: usize,
    pub resource_count: usize,
    pub last_duration_ms: u64,
    pub last_error: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Refresh health of one snapshot domain (e.g. `pods`, `nodes`).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStatus {
    pub domain: String,
    pub scope: String,
    /// `success` or `error`.
    pub last_status: String,
    pub last_error: String,
    pub last_warning: String,
    pub last_duration_ms: u64,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Snapshots that fell back to the resource catalog.
    pub fallback_count: u64,
    /// Snapshots that reported incomplete hydration.
    pub hydration_count: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub batch: BatchProgress,
}

/// Progress through a snapshot delivered in batches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub index: usize,
    pub size: usize,
    pub total: usize,
    pub is_final: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsStatus {
    pub active: bool,
    pub last_duration_ms: u64,
    pub last_collected_at: Option<DateTime<Utc>>,
    pub last_error: String,
    pub consecutive_failures: u32,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub state: String,
    pub reason: String,
    pub transitions: u64,
    pub last_transition_at: Option<DateTime<Utc>>,
    pub retry_count: u64,
    pub last_retry_reason: String,
    pub last_retry_at: Option<DateTime<Utc>>,
}

/// Delivery health of one named event stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub name: String,
    pub active_sessions: u64,
    pub total_sessions: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub errors: u64,
    pub last_error: String,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
}
