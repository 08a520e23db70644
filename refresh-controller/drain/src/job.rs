use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The cluster a drain was started in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRef {
    pub id: String,
    pub name: String,
}

/// How a node is drained. Mirrors `kubectl drain` flags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DrainOptions {
    /// Overrides each pod's termination grace period when set.
    pub grace_period_seconds: Option<i64>,
    pub ignore_daemon_sets: bool,
    pub delete_empty_dir_data: bool,
    /// Also delete pods not managed by a controller.
    pub force: bool,
    /// Delete pods directly instead of using the eviction API.
    pub disable_eviction: bool,
    pub skip_wait_for_delete_timeout_seconds: Option<i64>,
    pub timeout_seconds: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Info,
    Pod,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub phase: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pod_namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pod_name: String,
}

/// One drain of one node.
///
/// Events are only ever appended. `completed_at` is set once, when the job
/// completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainJob {
    pub id: String,
    pub cluster_id: String,
    pub cluster_name: String,
    pub node_name: String,
    pub status: DrainStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: String,
    pub options: DrainOptions,
    pub events: Vec<DrainEvent>,
}

/// The jobs of a node (or of every node) at a store version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u64,
    pub jobs: Vec<DrainJob>,
}

// === impl DrainJob ===

impl DrainJob {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub(crate) fn push_event(
        &mut self,
        timestamp: DateTime<Utc>,
        kind: EventKind,
        phase: &str,
        message: &str,
        pod: Option<(&str, &str)>,
    ) {
        let (pod_namespace, pod_name) = pod.unwrap_or_default();
        let id = format!("{}-{}", self.id, self.events.len() + 1);
        self.events.push(DrainEvent {
            id,
            timestamp,
            kind,
            phase: phase.to_string(),
            message: message.to_string(),
            pod_namespace: pod_namespace.to_string(),
            pod_name: pod_name.to_string(),
        });
    }
}
