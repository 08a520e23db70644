use crate::job::{ClusterRef, DrainJob, DrainOptions, DrainStatus, EventKind, Snapshot};
use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use kubedesk_refresh_core::{defaults, Clock};
use parking_lot::Mutex;
use std::{collections::VecDeque, fmt, sync::Arc};

/// Tracks drain jobs with a bounded history per node.
///
/// The history is keyed by node name only. Jobs for identically named nodes in
/// different clusters share a history and may evict each other; the cluster is
/// a tag on each job.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

/// Mutates one job of a [`Store`].
///
/// Every method is a no-op once the job has been evicted.
#[derive(Clone)]
pub struct DrainJobHandle {
    id: String,
    store: Store,
}

struct Inner {
    clock: Arc<dyn Clock>,
    max_history: usize,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    version: u64,
    seq: u64,
    jobs: HashMap<String, DrainJob>,
    // Most recent first.
    by_node: HashMap<String, VecDeque<String>>,
}

fn node_key(node_name: &str) -> String {
    node_name.trim().to_lowercase()
}

// === impl Store ===

impl Store {
    /// `max_history` jobs are kept per node; zero selects
    /// [`defaults::DRAIN_MAX_HISTORY`].
    pub fn new(max_history: usize, clock: Arc<dyn Clock>) -> Self {
        let max_history = match max_history {
            0 => defaults::DRAIN_MAX_HISTORY,
            n => n,
        };
        Self {
            inner: Arc::new(Inner {
                clock,
                max_history,
                state: Mutex::default(),
            }),
        }
    }

    pub fn max_history(&self) -> usize {
        self.inner.max_history
    }

    pub fn start_drain(
        &self,
        cluster: &ClusterRef,
        node_name: &str,
        options: DrainOptions,
    ) -> DrainJobHandle {
        let now = self.inner.clock.now();
        let node = node_key(node_name);

        let mut state = self.inner.state.lock();
        state.seq += 1;
        let id = format!("drain-{}-{}", now.timestamp_millis(), state.seq);
        let mut job = DrainJob {
            id: id.clone(),
            cluster_id: cluster.id.clone(),
            cluster_name: cluster.name.clone(),
            node_name: node_name.trim().to_string(),
            status: DrainStatus::Running,
            started_at: now,
            completed_at: None,
            message: String::new(),
            options,
            events: Vec::new(),
        };
        job.push_event(now, EventKind::Info, "scheduled", "Drain scheduled", None);
        state.jobs.insert(id.clone(), job);

        let history = state.by_node.entry(node.clone()).or_default();
        history.push_front(id.clone());
        let keep = self.inner.max_history.min(history.len());
        let evicted = history.drain(keep..).collect::<Vec<_>>();
        for id in &evicted {
            state.jobs.remove(id);
        }
        state.version += 1;
        drop(state);

        tracing::debug!(%id, %node, cluster = %cluster.id, evicted = evicted.len(), "Drain started");
        DrainJobHandle {
            id,
            store: self.clone(),
        }
    }

    /// The jobs for `node_name`, most recent first. An empty name selects every
    /// node's jobs, ordered by start time, most recent first.
    pub fn snapshot(&self, node_name: &str) -> Snapshot {
        let node = node_key(node_name);
        let state = self.inner.state.lock();
        let jobs = if node.is_empty() {
            let mut jobs = state.jobs.values().cloned().collect::<Vec<_>>();
            jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            jobs
        } else {
            state
                .by_node
                .get(&node)
                .into_iter()
                .flatten()
                .filter_map(|id| state.jobs.get(id).cloned())
                .collect()
        };
        Snapshot {
            version: state.version,
            jobs,
        }
    }

    /// Every retained job started in `cluster_id`, most recent first.
    pub fn jobs_for_cluster(&self, cluster_id: &str) -> Vec<DrainJob> {
        let state = self.inner.state.lock();
        let mut jobs = state
            .jobs
            .values()
            .filter(|job| job.cluster_id == cluster_id)
            .cloned()
            .collect::<Vec<_>>();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs
    }

    pub fn job(&self, id: &str) -> Option<DrainJob> {
        self.inner.state.lock().jobs.get(id).cloned()
    }

    pub fn version(&self) -> u64 {
        self.inner.state.lock().version
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut DrainJob, DateTime<Utc>) -> bool) {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        let Some(job) = state.jobs.get_mut(id) else {
            tracing::trace!(%id, "Drain job no longer tracked");
            return;
        };
        if f(job, now) {
            state.version += 1;
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Store")
            .field("max_history", &self.inner.max_history)
            .field("version", &state.version)
            .field("jobs", &state.jobs.len())
            .finish()
    }
}

// === impl DrainJobHandle ===

impl DrainJobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// A copy of the job, unless it has been evicted.
    pub fn job(&self) -> Option<DrainJob> {
        self.store.job(&self.id)
    }

    pub fn add_info(&self, phase: &str, message: &str) {
        self.store.update(&self.id, |job, now| {
            job.push_event(now, EventKind::Info, phase, message, None);
            true
        });
    }

    /// Records progress on one pod. Failures are recorded as error events.
    pub fn add_pod_event(
        &self,
        phase: &str,
        pod_namespace: &str,
        pod_name: &str,
        message: &str,
        failed: bool,
    ) {
        let kind = if failed {
            EventKind::Error
        } else {
            EventKind::Pod
        };
        self.store.update(&self.id, |job, now| {
            job.push_event(now, kind, phase, message, Some((pod_namespace, pod_name)));
            true
        });
    }

    /// Finishes the job. Only the first call with a terminal status has an
    /// effect; [`DrainStatus::Running`] is ignored.
    pub fn complete(&self, status: DrainStatus, message: &str) {
        if status == DrainStatus::Running {
            tracing::debug!(id = %self.id, "Ignoring completion without a terminal status");
            return;
        }
        self.store.update(&self.id, |job, now| {
            if job.is_complete() {
                return false;
            }
            job.status = status;
            job.message = message.to_string();
            job.completed_at = Some(now);
            let (kind, phase) = match status {
                DrainStatus::Failed => (EventKind::Error, "failed"),
                DrainStatus::Succeeded | DrainStatus::Running => (EventKind::Info, "completed"),
            };
            job.push_event(now, kind, phase, message, None);
            true
        });
    }
}

impl fmt::Debug for DrainJobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DrainJobHandle").field(&self.id).finish()
    }
}
