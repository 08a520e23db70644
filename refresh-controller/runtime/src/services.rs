use crate::{
    capabilities::{self, Evaluator},
    core::{
        ratelimit::{RateLimiter, TickerRateLimiter},
        Clock, TracingLogger,
    },
    drain,
    index::{Factory, FactoryOptions, IndexMetrics, StartError},
    k8s::{AccessReviewer, Client},
    telemetry::Recorder,
};
use std::{sync::Arc, time::Duration};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tunables for the services of one cluster connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub permission_cache_ttl: Duration,
    pub permission_prime_timeout: Duration,
    pub capability_workers: usize,
    /// Access reviews per second issued by capability batches. Zero disables
    /// pacing.
    pub capability_qps: f64,
    pub slow_request_threshold: Duration,
    pub drain_max_history: usize,
}

/// Everything the console reads from, wired to a single cluster connection.
pub struct Services {
    pub factory: Arc<Factory>,
    pub evaluator: Evaluator,
    pub telemetry: Arc<Recorder>,
    pub drains: drain::Store,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
}

// === impl Config ===

impl Config {
    pub fn evaluator_config(&self) -> capabilities::Config {
        capabilities::Config {
            worker_count: self.capability_workers,
            slow_request_threshold: self.slow_request_threshold,
        }
    }

    pub fn rate_limiter(&self) -> Option<Arc<dyn RateLimiter>> {
        if self.capability_qps > 0.0 {
            Some(Arc::new(TickerRateLimiter::new(self.capability_qps)))
        } else {
            None
        }
    }
}

// === impl Services ===

impl Services {
    /// Builds the capability evaluator, then the informer factory with the
    /// evaluator as its runtime permission checker.
    pub async fn new(
        client: Client,
        config: &Config,
        index_metrics: IndexMetrics,
        telemetry: Arc<Recorder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let reviewer: Arc<dyn AccessReviewer> = Arc::new(client.clone());
        let rate_limiter = config.rate_limiter();
        let mut evaluator = Evaluator::new(reviewer.clone(), config.evaluator_config())
            .with_logger(Arc::new(TracingLogger));
        if let Some(rate_limiter) = rate_limiter.clone() {
            evaluator = evaluator.with_rate_limiter(rate_limiter);
        }

        let options = FactoryOptions {
            permission_cache_ttl: config.permission_cache_ttl,
            permission_prime_timeout: config.permission_prime_timeout,
            clock: clock.clone(),
            runtime_checker: Some(Arc::new(evaluator.clone())),
            index_metrics,
        };
        let factory = Arc::new(Factory::new(client, reviewer, options).await);
        info!(
            resources = factory.registered_resources().len(),
            "Registered informers"
        );

        Self {
            factory,
            evaluator,
            telemetry,
            drains: drain::Store::new(config.drain_max_history, clock),
            rate_limiter,
        }
    }

    /// Starts the factory's watches and records the outcome of the initial
    /// sync.
    pub async fn sync_informers(&self, cancel: &CancellationToken) -> Result<(), StartError> {
        sync_informers(&self.factory, &self.telemetry, cancel).await
    }

    /// Releases the factory's registrations and the capability rate limiter.
    pub fn shutdown(&self) {
        self.factory.shutdown();
        if let Some(rate_limiter) = &self.rate_limiter {
            rate_limiter.stop();
        }
    }
}

pub(crate) async fn sync_informers(
    factory: &Factory,
    telemetry: &Recorder,
    cancel: &CancellationToken,
) -> Result<(), StartError> {
    let t0 = Instant::now();
    let res = factory.start(cancel).await;
    let resources = factory.registered_resources().len();
    match &res {
        Ok(()) => {
            telemetry.record_catalog_sync(factory.cached_objects(), resources, t0.elapsed(), None);
            telemetry.record_connection_state("healthy", "");
        }
        Err(StartError::Cancelled) => debug!("Informer sync cancelled"),
        Err(error) => {
            let error = error.to_string();
            warn!(%error, "Informer sync failed");
            telemetry.record_catalog_sync(0, resources, t0.elapsed(), Some(&error));
            telemetry.record_connection_state("degraded", &error);
        }
    }
    res
}

/// Logs the telemetry summary every `period` until `cancel` fires.
pub(crate) async fn log_summaries(
    telemetry: Arc<Recorder>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = cancel.cancelled() => return,
        }
        match serde_json::to_string(&telemetry.summary()) {
            Ok(summary) => debug!(%summary, "Refresh telemetry"),
            Err(error) => warn!(%error, "Failed to encode telemetry summary"),
        }
    }
}
