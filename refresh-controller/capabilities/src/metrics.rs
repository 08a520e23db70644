use std::{collections::BTreeMap, fmt, time::Duration};

/// The key under which cluster-wide checks are aggregated.
pub const CLUSTER_SCOPE: &str = "<cluster>";

/// Per-namespace totals for one evaluated batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NamespaceMetrics {
    pub count: usize,
    pub allowed: usize,
    pub errors: usize,
    pub total_duration: Duration,
}

#[derive(Debug, Default)]
pub(crate) struct BatchMetrics(BTreeMap<String, NamespaceMetrics>);

// === impl BatchMetrics ===

impl BatchMetrics {
    pub(crate) fn record(&mut self, namespace: &str, allowed: bool, error: bool, elapsed: Duration) {
        let key = if namespace.is_empty() {
            CLUSTER_SCOPE
        } else {
            namespace
        };
        let metrics = self.0.entry(key.to_string()).or_default();
        metrics.count += 1;
        if allowed {
            metrics.allowed += 1;
        }
        if error {
            metrics.errors += 1;
        }
        metrics.total_duration += elapsed;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, namespace: &str) -> Option<&NamespaceMetrics> {
        self.0.get(namespace)
    }
}

/// One `<namespace>=count:.. allowed:.. errors:.. duration:..` group per
/// namespace, ordered by namespace.
impl fmt::Display for BatchMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (namespace, m)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(
                f,
                "{namespace}=count:{} allowed:{} errors:{} duration:{:?}",
                m.count, m.allowed, m.errors, m.total_duration
            )?;
        }
        Ok(())
    }
}
