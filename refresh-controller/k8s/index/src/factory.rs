use crate::{
    catalog,
    informer::{Informer, Pending},
    metrics::IndexMetrics,
    permissions::{PermissionError, Permissions},
    pod_node::{PodNodeIndex, SharedPodNodeIndex},
};
use futures::prelude::*;
use kubedesk_refresh_core::{
    defaults,
    permission::{PermissionCache, PermissionKey, RuntimeChecker, VERB_LIST, VERB_WATCH},
    Clock, SystemClock,
};
use kubedesk_refresh_k8s_api::{self as k8s, reflector, AccessReviewer, Client, ResourceDescriptor};
use parking_lot::{Mutex, RwLock};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

#[derive(Clone)]
pub struct FactoryOptions {
    pub permission_cache_ttl: Duration,
    pub permission_prime_timeout: Duration,
    pub clock: Arc<dyn Clock>,
    /// Preferred over direct access reviews when set.
    pub runtime_checker: Option<Arc<dyn RuntimeChecker>>,
    pub index_metrics: IndexMetrics,
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("informer start cancelled")]
    Cancelled,

    #[error("informer for {0} stopped before its cache synced")]
    Stopped(ResourceDescriptor),
}

/// Owns the registered watches of one cluster connection.
pub struct Factory {
    permissions: Permissions,
    informers: RwLock<Vec<Arc<Informer>>>,
    pending: Mutex<Vec<Pending>>,
    pod_index: SharedPodNodeIndex,
    prime_timeout: Duration,
    started: AtomicBool,
    synced: AtomicBool,
}

// === impl FactoryOptions ===

impl Default for FactoryOptions {
    fn default() -> Self {
        Self {
            permission_cache_ttl: defaults::PERMISSION_CACHE_TTL,
            permission_prime_timeout: defaults::PERMISSION_PRIME_TIMEOUT,
            clock: Arc::new(SystemClock),
            runtime_checker: None,
            index_metrics: IndexMetrics::default(),
        }
    }
}

// === impl Factory ===

impl Factory {
    /// Registers the namespaced catalog and those cluster-scoped watches the
    /// identity may list and watch.
    ///
    /// Watches are not started until [`Factory::start`].
    pub async fn new(
        client: Client,
        reviewer: Arc<dyn AccessReviewer>,
        options: FactoryOptions,
    ) -> Self {
        let pod_index = PodNodeIndex::shared();
        let namespaced =
            catalog::namespaced(&client, options.index_metrics.wrap(pod_index.clone()));
        let pending = catalog::cluster_scoped(&client);
        Self::with_catalog(reviewer, options, pod_index, namespaced, pending).await
    }

    pub(crate) async fn with_catalog(
        reviewer: Arc<dyn AccessReviewer>,
        options: FactoryOptions,
        pod_index: SharedPodNodeIndex,
        namespaced: Vec<Informer>,
        pending: Vec<Pending>,
    ) -> Self {
        let cache = PermissionCache::new(options.permission_cache_ttl, options.clock);
        let factory = Self {
            permissions: Permissions::new(reviewer, options.runtime_checker, cache),
            informers: RwLock::new(namespaced.into_iter().map(Arc::new).collect()),
            pending: Mutex::new(pending),
            pod_index,
            prime_timeout: options.permission_prime_timeout,
            started: AtomicBool::new(false),
            synced: AtomicBool::new(false),
        };
        factory.process_pending_cluster_informers().await;
        factory
    }

    /// Registers each pending cluster-scoped watch whose `list` and `watch`
    /// permissions are both granted, and drops the rest without building them.
    async fn process_pending_cluster_informers(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return;
        }

        let deadline = Instant::now() + self.prime_timeout;
        let keys = pending
            .iter()
            .flat_map(|p| {
                let descriptor = p.descriptor();
                [
                    descriptor.permission_key(VERB_LIST),
                    descriptor.permission_key(VERB_WATCH),
                ]
            })
            .collect::<Vec<_>>();
        match time::timeout_at(deadline, self.permissions.prime(keys)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => debug!(%error, "Failed to prime cluster-scoped permissions"),
            Err(_) => debug!(
                timeout = ?self.prime_timeout,
                "Timed out priming cluster-scoped permissions"
            ),
        }

        for pending in pending {
            let descriptor = pending.descriptor();
            let list = self
                .check_before(deadline, descriptor.permission_key(VERB_LIST))
                .await;
            let watch = self
                .check_before(deadline, descriptor.permission_key(VERB_WATCH))
                .await;
            match (list, watch) {
                (Ok(true), Ok(true)) => {
                    let informer = pending.build();
                    self.informers.write().push(Arc::new(informer));
                    debug!(resource = %descriptor, "Registered cluster-scoped informer");
                }
                (list, watch) => {
                    debug!(resource = %descriptor, ?list, ?watch, "Skipping cluster-scoped informer");
                }
            }
        }
    }

    /// Reads the decision primed for the pending registrations,
    /// checking again only when it is missing.
    async fn check_before(
        &self,
        deadline: Instant,
        key: PermissionKey,
    ) -> Result<bool, PermissionError> {
        match time::timeout_at(deadline, self.permissions.check_cached(&key)).await {
            Ok(result) => result,
            Err(_) => Err(PermissionError::Timeout { key }),
        }
    }

    pub async fn check_resource_verb(
        &self,
        group: &str,
        resource: &str,
        verb: &str,
    ) -> Result<bool, PermissionError> {
        self.permissions
            .check(&PermissionKey::new(group, resource, verb))
            .await
    }

    pub async fn can_list_resource(
        &self,
        group: &str,
        resource: &str,
    ) -> Result<bool, PermissionError> {
        self.check_resource_verb(group, resource, VERB_LIST).await
    }

    pub async fn can_watch_resource(
        &self,
        group: &str,
        resource: &str,
    ) -> Result<bool, PermissionError> {
        self.check_resource_verb(group, resource, VERB_WATCH).await
    }

    pub async fn prime_permissions<I>(&self, keys: I) -> Result<(), PermissionError>
    where
        I: IntoIterator<Item = PermissionKey>,
    {
        self.permissions.prime(keys).await
    }

    /// Every key that has been allowed at least once, sorted.
    pub fn allowed_permission_keys(&self) -> Vec<String> {
        self.permissions.cache().allowed_keys()
    }

    /// Starts every registered watch, once, and waits for all of their stores
    /// to complete their initial list.
    ///
    /// Watch tasks run until `cancel` is cancelled.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<(), StartError> {
        let informers = self.informers.read().clone();

        if !self.started.swap(true, Ordering::AcqRel) {
            for informer in &informers {
                let Some(task) = informer.take_task() else {
                    continue;
                };
                let cancel = cancel.clone();
                tokio::spawn(
                    async move {
                        tokio::select! {
                            _ = task => debug!("Watch ended"),
                            _ = cancel.cancelled() => debug!("Watch cancelled"),
                        }
                    }
                    .instrument(info_span!("informer", resource = %informer.descriptor())),
                );
            }
        }

        let synced = future::try_join_all(informers.iter().map(|informer| {
            let descriptor = informer.descriptor();
            informer.ready().map(move |ready| {
                if ready {
                    Ok(())
                } else {
                    Err(StartError::Stopped(descriptor))
                }
            })
        }));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StartError::Cancelled),
            res = synced => {
                res?;
                self.synced.store(true, Ordering::Release);
                info!(informers = informers.len(), "Informer caches synced");
                Ok(())
            }
        }
    }

    /// Whether [`Factory::start`] has observed every store synced.
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Drops every registration and clears cached permissions.
    ///
    /// Watch tasks that were already started keep running until their
    /// cancellation token fires.
    pub fn shutdown(&self) {
        self.informers.write().clear();
        self.pending.lock().clear();
        self.pod_index.write().clear();
        self.permissions.cache().clear();
        self.synced.store(false, Ordering::Release);
        debug!("Factory shut down");
    }

    /// The store of the registered watch of `K`, if any.
    pub fn store<K>(&self) -> Option<reflector::Store<K>>
    where
        K: k8s::Resource<DynamicType = ()>
            + Clone
            + serde::de::DeserializeOwned
            + fmt::Debug
            + Send
            + Sync
            + 'static,
    {
        self.informers
            .read()
            .iter()
            .find_map(|informer| informer.store::<K>())
    }

    /// The pods currently scheduled to `node`.
    pub fn pods_on_node(&self, node: &str) -> Vec<Arc<k8s::Pod>> {
        let Some(pods) = self.store::<k8s::Pod>() else {
            return Vec::new();
        };
        self.pod_index
            .read()
            .pods_on_node(node)
            .into_iter()
            .filter_map(|pod| {
                pods.get(&reflector::ObjectRef::new(&pod.name).within(&pod.namespace))
            })
            .collect()
    }

    /// The number of objects held across every registered store.
    pub fn cached_objects(&self) -> usize {
        self.informers.read().iter().map(|informer| informer.len()).sum()
    }

    pub fn registered_resources(&self) -> Vec<ResourceDescriptor> {
        self.informers
            .read()
            .iter()
            .map(|informer| informer.descriptor())
            .collect()
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("permissions", &self.permissions)
            .field("informers", &self.informers.read().len())
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("synced", &self.synced.load(Ordering::Relaxed))
            .finish()
    }
}
