use crate::Recorder;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{counter::ConstCounter, gauge::ConstGauge, MetricType},
    registry::Registry,
};
use std::sync::Arc;

#[derive(Debug)]
struct Instrumented(Arc<Recorder>);

/// Exposes the recorder's summary as metrics.
pub fn register(reg: &mut Registry, recorder: Arc<Recorder>) {
    reg.register_collector(Box::new(Instrumented(recorder)));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let summary = self.0.summary();

        let catalog_items = encoder.encode_descriptor(
            "catalog_items",
            "The number of objects in the last successful catalog sync",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(summary.catalog.item_count as i64).encode(catalog_items)?;

        let catalog_failures = encoder.encode_descriptor(
            "catalog_sync_failures",
            "Count of failed catalog syncs",
            None,
            MetricType::Counter,
        )?;
        ConstCounter::new(summary.catalog.failure_count).encode(catalog_failures)?;

        let mut snapshot_refreshes = encoder.encode_descriptor(
            "snapshot_refreshes",
            "Count of snapshot refreshes by domain and outcome",
            None,
            MetricType::Counter,
        )?;
        for snapshot in &summary.snapshots {
            for (status, count) in [
                ("success", snapshot.success_count),
                ("error", snapshot.failure_count),
            ] {
                let labels = vec![("domain", snapshot.domain.as_str()), ("status", status)];
                let family = snapshot_refreshes.encode_family(&labels)?;
                ConstCounter::new(count).encode(family)?;
            }
        }

        let mut snapshot_duration = encoder.encode_descriptor(
            "snapshot_average_duration_ms",
            "Average snapshot refresh duration by domain",
            None,
            MetricType::Gauge,
        )?;
        for snapshot in &summary.snapshots {
            let labels = vec![("domain", snapshot.domain.as_str())];
            let family = snapshot_duration.encode_family(&labels)?;
            ConstGauge::new(snapshot.average_duration_ms as i64).encode(family)?;
        }

        let metrics_failures = encoder.encode_descriptor(
            "metrics_poll_consecutive_failures",
            "The number of consecutive failed metrics polls",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(i64::from(summary.metrics.consecutive_failures))
            .encode(metrics_failures)?;

        let retries = encoder.encode_descriptor(
            "connection_retries",
            "Count of connection retries",
            None,
            MetricType::Counter,
        )?;
        ConstCounter::new(summary.connection.retry_count).encode(retries)?;

        let mut stream_sessions = encoder.encode_descriptor(
            "stream_active_sessions",
            "The number of active sessions by stream",
            None,
            MetricType::Gauge,
        )?;
        for stream in &summary.streams {
            let labels = vec![("stream", stream.name.as_str())];
            let family = stream_sessions.encode_family(&labels)?;
            ConstGauge::new(stream.active_sessions as i64).encode(family)?;
        }

        let mut stream_dropped = encoder.encode_descriptor(
            "stream_dropped",
            "Count of events dropped by stream",
            None,
            MetricType::Counter,
        )?;
        for stream in &summary.streams {
            let labels = vec![("stream", stream.name.as_str())];
            let family = stream_dropped.encode_family(&labels)?;
            ConstCounter::new(stream.dropped).encode(family)?;
        }

        Ok(())
    }
}
