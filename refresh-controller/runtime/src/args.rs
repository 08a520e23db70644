use crate::{
    core::{defaults, Clock, SystemClock},
    index::IndexMetrics,
    services::{self, Config, Services},
    telemetry::{self, Recorder},
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

const SUMMARY_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[clap(name = "refresh", about = "Keeps kubedesk's cluster caches and capabilities fresh")]
pub struct Args {
    #[clap(
        long,
        default_value = "kubedesk=info,warn",
        env = "KUBEDESK_REFRESH_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// How long an authorization decision is reused.
    #[clap(long, default_value_t = defaults::PERMISSION_CACHE_TTL.as_secs())]
    permission_cache_ttl_secs: u64,

    /// Upper bound on checking cluster-scoped permissions at startup.
    #[clap(long, default_value_t = defaults::PERMISSION_PRIME_TIMEOUT.as_secs())]
    permission_prime_timeout_secs: u64,

    #[clap(long, default_value_t = defaults::CAPABILITY_WORKERS)]
    capability_workers: usize,

    /// Capability access reviews issued per second. Zero disables pacing.
    #[clap(long, default_value_t = defaults::CAPABILITY_QPS)]
    capability_qps: f64,

    #[clap(long, default_value_t = defaults::SLOW_REQUEST_THRESHOLD.as_millis() as u64)]
    slow_request_threshold_ms: u64,

    /// Drain jobs retained per node.
    #[clap(long, default_value_t = defaults::DRAIN_MAX_HISTORY)]
    drain_max_history: usize,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub(crate) fn config(&self) -> Config {
        Config {
            permission_cache_ttl: Duration::from_secs(self.permission_cache_ttl_secs),
            permission_prime_timeout: Duration::from_secs(self.permission_prime_timeout_secs),
            capability_workers: self.capability_workers,
            capability_qps: self.capability_qps,
            slow_request_threshold: Duration::from_millis(self.slow_request_threshold_ms),
            drain_max_history: self.drain_max_history,
        }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();
        let Self {
            admin,
            client,
            log_level,
            log_format,
            ..
        } = self;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let recorder = Arc::new(Recorder::new(clock.clone()));

        let mut prom = <Registry>::default();
        let index_metrics = IndexMetrics::register(prom.sub_registry_with_prefix("index"));
        telemetry::metrics::register(
            prom.sub_registry_with_prefix("refresh"),
            recorder.clone(),
        );
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let services = Services::new(
            runtime.client(),
            &config,
            index_metrics,
            recorder.clone(),
            clock,
        )
        .await;

        // Watches run until the runtime begins shutting down.
        let cancel = CancellationToken::new();
        let shutdown = runtime.shutdown_handle();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let _release = shutdown.signaled().await;
                cancel.cancel();
            }
        });

        tokio::spawn(
            {
                let cancel = cancel.clone();
                async move {
                    let _ = services.sync_informers(&cancel).await;
                    cancel.cancelled().await;
                    services.shutdown();
                }
            }
            .instrument(info_span!("informers")),
        );

        tokio::spawn(
            services::log_summaries(recorder, SUMMARY_PERIOD, cancel)
                .instrument(info_span!("telemetry")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
