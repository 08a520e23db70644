use futures::{future::BoxFuture, prelude::*, stream::BoxStream};
use kubedesk_refresh_k8s_api::{
    reflector, watcher, Api, Client, Resource, ResourceDescriptor, WatchStreamExt,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::{any::Any, fmt};
use tracing::warn;

/// A resource type that can be reflected from a cluster-wide watch.
pub(crate) trait Watched:
    Resource<DynamicType = ()> + Clone + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
}

impl<K> Watched for K where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
}

/// A registered watch: the reflector store consumers read, and the task that
/// keeps it populated until the factory is started.
pub(crate) struct Informer {
    descriptor: ResourceDescriptor,
    store: Box<dyn Any + Send + Sync>,
    ready: Box<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>,
    len: Box<dyn Fn() -> usize + Send + Sync>,
    task: Mutex<Option<BoxFuture<'static, ()>>>,
}

/// A cluster-scoped registration that is only built once its permissions have
/// been checked.
pub(crate) struct Pending {
    descriptor: ResourceDescriptor,
    build: Box<dyn FnOnce() -> Informer + Send>,
}

/// Builds a reflector over a cluster-wide watch of `K`.
///
/// The returned stream must be driven for the store to be populated. Watch
/// errors are logged and retried with backoff.
pub(crate) fn reflect<K: Watched>(
    client: Client,
) -> (reflector::Store<K>, BoxStream<'static, watcher::Event<K>>) {
    let (store, writer) = reflector::store();
    let events = watcher(Api::<K>::all(client), watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .filter_map(|event| {
            future::ready(match event {
                Ok(event) => Some(event),
                Err(error) => {
                    warn!(%error, "Watch failed");
                    None
                }
            })
        })
        .boxed();
    (store, events)
}

// === impl Informer ===

impl Informer {
    pub(crate) fn watch<K: Watched>(client: Client, descriptor: ResourceDescriptor) -> Self {
        let (store, events) = reflect::<K>(client);
        Self::new(descriptor, store, events.for_each(|_| future::ready(())))
    }

    pub(crate) fn new<K: Watched>(
        descriptor: ResourceDescriptor,
        store: reflector::Store<K>,
        task: impl Future<Output = ()> + Send + 'static,
    ) -> Self {
        let ready = {
            let store = store.clone();
            Box::new(move || {
                let store = store.clone();
                Box::pin(async move { store.wait_until_ready().await.is_ok() })
                    as BoxFuture<'static, bool>
            })
        };
        let len = {
            let store = store.clone();
            Box::new(move || store.state().len())
        };
        Self {
            descriptor,
            store: Box::new(store),
            ready,
            len,
            task: Mutex::new(Some(task.boxed())),
        }
    }

    pub(crate) fn descriptor(&self) -> ResourceDescriptor {
        self.descriptor
    }

    /// The reflector store, if this informer watches `K`.
    pub(crate) fn store<K: Watched>(&self) -> Option<reflector::Store<K>> {
        self.store.downcast_ref::<reflector::Store<K>>().cloned()
    }

    /// Completes once the store has observed its initial list. Resolves to
    /// false if the watch task ended first.
    pub(crate) fn ready(&self) -> BoxFuture<'static, bool> {
        (self.ready)()
    }

    /// The number of objects currently in the store.
    pub(crate) fn len(&self) -> usize {
        (self.len)()
    }

    /// The watch task. Only the first call returns it.
    pub(crate) fn take_task(&self) -> Option<BoxFuture<'static, ()>> {
        self.task.lock().take()
    }
}

impl fmt::Debug for Informer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Informer")
            .field("resource", &format_args!("{}", self.descriptor))
            .field("started", &self.task.lock().is_none())
            .finish()
    }
}

// === impl Pending ===

impl Pending {
    pub(crate) fn new(
        descriptor: ResourceDescriptor,
        build: impl FnOnce() -> Informer + Send + 'static,
    ) -> Self {
        Self {
            descriptor,
            build: Box::new(build),
        }
    }

    pub(crate) fn descriptor(&self) -> ResourceDescriptor {
        self.descriptor
    }

    pub(crate) fn build(self) -> Informer {
        (self.build)()
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pending")
            .field(&format_args!("{}", self.descriptor))
            .finish()
    }
}
