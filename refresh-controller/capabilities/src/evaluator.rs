use crate::metrics::BatchMetrics;
use kubedesk_refresh_core::{
    capability::{Attributes, CheckResult, ReviewAttributes},
    defaults,
    permission::{PermissionKey, RuntimeChecker},
    ratelimit::RateLimiter,
    Logger,
};
use kubedesk_refresh_k8s_api::AccessReviewer;
use parking_lot::Mutex;
use std::{fmt, sync::Arc, time::Duration, vec};
use tokio::{task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;

const LOG_TAG: &str = "Capabilities";

#[derive(Clone, Debug)]
pub struct Config {
    /// Defaults to [`defaults::CAPABILITY_WORKERS`] when zero.
    pub worker_count: usize,
    pub slow_request_threshold: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluateError {
    #[error("capability evaluation cancelled")]
    Cancelled { results: Vec<CheckResult> },

    #[error("all {} capability checks failed: {first}", .results.len())]
    AllFailed {
        first: String,
        results: Vec<CheckResult>,
    },
}

/// Evaluates batches of capability checks with a bounded pool of workers.
#[derive(Clone)]
pub struct Evaluator {
    inner: Arc<Inner>,
}

struct Inner {
    reviewer: Arc<dyn AccessReviewer>,
    config: Config,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    logger: Option<Arc<dyn Logger>>,
}

type Queue = Arc<Mutex<std::iter::Enumerate<vec::IntoIter<ReviewAttributes>>>>;

// === impl Config ===

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: defaults::CAPABILITY_WORKERS,
            slow_request_threshold: defaults::SLOW_REQUEST_THRESHOLD,
        }
    }
}

// === impl EvaluateError ===

impl EvaluateError {
    /// The per-check results, which are populated even when the batch failed.
    pub fn into_results(self) -> Vec<CheckResult> {
        match self {
            Self::Cancelled { results } | Self::AllFailed { results, .. } => results,
        }
    }
}

// === impl Evaluator ===

impl Evaluator {
    pub fn new(reviewer: Arc<dyn AccessReviewer>, config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                reviewer,
                config,
                rate_limiter: None,
                logger: None,
            }),
        }
    }

    pub fn with_rate_limiter(self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.map_inner(|inner| Inner {
            rate_limiter: Some(rate_limiter),
            ..inner
        })
    }

    /// Enables slow-request warnings and per-namespace batch metrics.
    pub fn with_logger(self, logger: Arc<dyn Logger>) -> Self {
        self.map_inner(|inner| Inner {
            logger: Some(logger),
            ..inner
        })
    }

    fn map_inner(self, f: impl FnOnce(Inner) -> Inner) -> Self {
        let inner = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(shared) => Inner {
                reviewer: shared.reviewer.clone(),
                config: shared.config.clone(),
                rate_limiter: shared.rate_limiter.clone(),
                logger: shared.logger.clone(),
            },
        };
        Self {
            inner: Arc::new(f(inner)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The number of workers used for a batch of `requests` checks.
    pub fn resolve_worker_count(&self, requests: usize) -> usize {
        if requests == 0 {
            return 0;
        }
        let workers = match self.inner.config.worker_count {
            0 => defaults::CAPABILITY_WORKERS,
            n => n,
        };
        workers.min(requests).max(1)
    }

    /// Evaluates `checks`, returning one result per check in input order.
    ///
    /// Individual failures are reported in their results. The batch fails only
    /// when `cancel` fires (which takes precedence) or when every check of a
    /// non-empty batch failed.
    pub async fn evaluate(
        &self,
        cancel: &CancellationToken,
        checks: Vec<ReviewAttributes>,
    ) -> Result<Vec<CheckResult>, EvaluateError> {
        let total = checks.len();
        let mut results = checks
            .iter()
            .map(|check| CheckResult::failed(&check.id, "not evaluated"))
            .collect::<Vec<_>>();

        let queue: Queue = Arc::new(Mutex::new(checks.into_iter().enumerate()));
        let metrics = self
            .inner
            .logger
            .as_ref()
            .map(|_| Arc::new(Mutex::new(BatchMetrics::default())));

        let mut workers = JoinSet::new();
        for _ in 0..self.resolve_worker_count(total) {
            workers.spawn(self.inner.clone().work(
                queue.clone(),
                metrics.clone(),
                cancel.clone(),
            ));
        }
        while let Some(outcome) = workers.join_next().await {
            match outcome {
                Ok(evaluated) => {
                    for (index, result) in evaluated {
                        results[index] = result;
                    }
                }
                Err(error) => tracing::error!(%error, "Capability worker failed"),
            }
        }

        if let (Some(logger), Some(metrics)) = (self.inner.logger.as_ref(), metrics) {
            let metrics = metrics.lock();
            if !metrics.is_empty() {
                logger.debug(
                    &format!("capability batch of {total} checks: {metrics}"),
                    LOG_TAG,
                );
            }
        }

        if cancel.is_cancelled() {
            return Err(EvaluateError::Cancelled { results });
        }
        if total > 0 && results.iter().all(CheckResult::is_error) {
            let first = results
                .iter()
                .find_map(|r| r.error.clone())
                .unwrap_or_default();
            return Err(EvaluateError::AllFailed { first, results });
        }
        Ok(results)
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("config", &self.inner.config)
            .field("rate_limited", &self.inner.rate_limiter.is_some())
            .field("logger", &self.inner.logger.is_some())
            .finish()
    }
}

/// Lets the factory prefer the evaluator's paced reviews over its own.
#[async_trait::async_trait]
impl RuntimeChecker for Evaluator {
    async fn check(&self, key: &PermissionKey) -> anyhow::Result<bool> {
        let check = ReviewAttributes {
            id: key.to_string(),
            attributes: Some(Attributes::new(&key.verb, &key.group, &key.resource)),
        };
        let mut results = self
            .evaluate(&CancellationToken::new(), vec![check])
            .await?;
        match results.pop() {
            Some(result) => Ok(result.allowed),
            None => anyhow::bail!("no result for {key}"),
        }
    }
}

// === impl Inner ===

impl Inner {
    async fn work(
        self: Arc<Self>,
        queue: Queue,
        metrics: Option<Arc<Mutex<BatchMetrics>>>,
        cancel: CancellationToken,
    ) -> Vec<(usize, CheckResult)> {
        let mut evaluated = Vec::new();
        loop {
            // The guard must not be held across the review below.
            let next = queue.lock().next();
            let Some((index, check)) = next else {
                return evaluated;
            };
            let result = self.evaluate_one(check, metrics.as_deref(), &cancel).await;
            evaluated.push((index, result));
        }
    }

    async fn evaluate_one(
        &self,
        check: ReviewAttributes,
        metrics: Option<&Mutex<BatchMetrics>>,
        cancel: &CancellationToken,
    ) -> CheckResult {
        let ReviewAttributes { id, attributes } = check;
        let Some(attributes) = attributes else {
            return CheckResult::failed(id, "resource attributes missing");
        };

        if let Some(limiter) = self.rate_limiter.as_ref() {
            if let Err(error) = limiter.wait(cancel).await {
                if let Some(metrics) = metrics {
                    metrics
                        .lock()
                        .record(&attributes.namespace, false, true, Duration::ZERO);
                }
                return CheckResult::failed(id, error);
            }
        }

        let started = Instant::now();
        let review = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            review = self.reviewer.review(&attributes) => Some(review),
        };
        let elapsed = started.elapsed();

        if elapsed > self.config.slow_request_threshold {
            let message = format!("slow capability check {id} took {elapsed:?}");
            match self.logger.as_ref() {
                Some(logger) => logger.warn(&message, LOG_TAG),
                None => tracing::warn!(%id, ?elapsed, "Slow capability check"),
            }
        }

        let result = match review {
            None => CheckResult::failed(id, "capability evaluation cancelled"),
            Some(Err(error)) => CheckResult::failed(id, error),
            Some(Ok(decision)) => CheckResult {
                id,
                allowed: decision.allowed,
                denied_reason: decision.reason.filter(|_| !decision.allowed),
                evaluation_error: decision.evaluation_error,
                error: None,
            },
        };

        if let Some(metrics) = metrics {
            metrics.lock().record(
                &attributes.namespace,
                result.allowed,
                result.is_error(),
                elapsed,
            );
        }
        result
    }
}
