use std::sync::Arc;

use kube::Resource;
use kubert::index::NamespacedRemoved;
use parking_lot::RwLock;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Metrics describing secondary indexes maintained alongside informers.
#[derive(Clone, Debug, Default)]
pub struct IndexMetrics {
    index_size: Family<IndexLabels, Gauge>,
    index_applies: Family<IndexLabels, Counter>,
    index_deletes: Family<IndexLabels, Counter>,
    index_resets: Family<IndexLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct IndexLabels {
    kind: String,
}

pub trait SizedIndex {
    fn size(&self) -> usize;
}

/// Records index activity and forwards updates to the wrapped index.
pub(crate) struct Instrumented<T> {
    inner: Arc<RwLock<T>>,
    metrics: IndexMetrics,
}

impl<T> SizedIndex for Arc<RwLock<T>>
where
    T: SizedIndex,
{
    fn size(&self) -> usize {
        self.read().size()
    }
}

// === impl IndexMetrics ===

impl IndexMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let index_size = Family::default();
        prom.register(
            "index_size",
            "Gauge of the number of resources in the index",
            index_size.clone(),
        );

        let index_applies = Family::default();
        prom.register(
            "index_applies",
            "Count of applies to the index",
            index_applies.clone(),
        );

        let index_deletes = Family::default();
        prom.register(
            "index_deletes",
            "Count of deletes from the index",
            index_deletes.clone(),
        );

        let index_resets = Family::default();
        prom.register(
            "index_resets",
            "Count of resets of the index",
            index_resets.clone(),
        );

        Self {
            index_size,
            index_applies,
            index_deletes,
            index_resets,
        }
    }

    pub(crate) fn wrap<T>(&self, inner: Arc<RwLock<T>>) -> Arc<RwLock<Instrumented<T>>> {
        Arc::new(RwLock::new(Instrumented {
            inner,
            metrics: self.clone(),
        }))
    }

    fn labels<R: Resource<DynamicType = ()>>() -> IndexLabels {
        IndexLabels {
            kind: R::kind(&()).to_string(),
        }
    }
}

// === impl Instrumented ===

impl<T> Instrumented<T>
where
    T: SizedIndex,
{
    fn set_size(&self, labels: &IndexLabels) {
        let size = self.inner.size();
        self.metrics
            .index_size
            .get_or_create(labels)
            .set(size as i64);
    }
}

impl<R, T> kubert::index::IndexNamespacedResource<R> for Instrumented<T>
where
    T: SizedIndex,
    T: kubert::index::IndexNamespacedResource<R>,
    R: Resource<DynamicType = ()>,
{
    fn apply(&mut self, resource: R) {
        let labels = IndexMetrics::labels::<R>();
        self.metrics.index_applies.get_or_create(&labels).inc();
        self.inner.write().apply(resource);
        self.set_size(&labels);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let labels = IndexMetrics::labels::<R>();
        self.metrics.index_deletes.get_or_create(&labels).inc();
        self.inner.write().delete(namespace, name);
        self.set_size(&labels);
    }

    fn reset(&mut self, resources: Vec<R>, removed: NamespacedRemoved) {
        let labels = IndexMetrics::labels::<R>();
        self.metrics.index_resets.get_or_create(&labels).inc();
        self.inner.write().reset(resources, removed);
        self.set_size(&labels);
    }
}
