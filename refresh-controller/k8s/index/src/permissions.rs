use futures::prelude::*;
use kubedesk_refresh_core::{
    capability::Attributes,
    defaults,
    flight,
    permission::{PermissionCache, PermissionKey, RuntimeChecker},
};
use kubedesk_refresh_k8s_api::{AccessReviewer, ReviewError};
use std::{collections::BTreeSet, fmt, sync::Arc};
use tracing::{debug, warn};

#[derive(Clone, Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("access review for {key} failed: {source}")]
    Review {
        key: PermissionKey,
        source: Arc<ReviewError>,
    },

    #[error("runtime permission check for {key} failed: {reason}")]
    Runtime { key: PermissionKey, reason: String },

    #[error("permission check for {key} timed out")]
    Timeout { key: PermissionKey },
}

/// Answers `(group, resource, verb)` authorization questions for the factory.
///
/// A runtime checker, when configured, is preferred and writes through to the
/// cache. Otherwise decisions come from the cache or from a single-flight
/// access review whose result is cached. Errors are never cached or retried.
pub struct Permissions {
    reviewer: Arc<dyn AccessReviewer>,
    runtime: Option<Arc<dyn RuntimeChecker>>,
    cache: Arc<PermissionCache>,
    flights: flight::Group<Result<bool, PermissionError>>,
}

// === impl Permissions ===

impl Permissions {
    pub fn new(
        reviewer: Arc<dyn AccessReviewer>,
        runtime: Option<Arc<dyn RuntimeChecker>>,
        cache: PermissionCache,
    ) -> Self {
        Self {
            reviewer,
            runtime,
            cache: Arc::new(cache),
            flights: flight::Group::new(),
        }
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    pub async fn check(&self, key: &PermissionKey) -> Result<bool, PermissionError> {
        if let Some(runtime) = self.runtime.as_ref() {
            return match runtime.check(key).await {
                Ok(allowed) => {
                    self.cache.insert(key, allowed);
                    Ok(allowed)
                }
                Err(error) => {
                    let reason = format!("{error:#}");
                    match self.cache.get(key) {
                        Some(allowed) => {
                            warn!(%key, allowed, error = %reason, "permission fallback to cached decision due to runtime error");
                            Ok(allowed)
                        }
                        None => Err(PermissionError::Runtime {
                            key: key.clone(),
                            reason,
                        }),
                    }
                }
            };
        }

        if let Some(allowed) = self.cache.get(key) {
            return Ok(allowed);
        }

        let reviewer = self.reviewer.clone();
        let cache = self.cache.clone();
        let key = key.clone();
        self.flights
            .run(&key.to_string(), move || async move {
                let attributes = Attributes::new(&key.verb, &key.group, &key.resource);
                match reviewer.review(&attributes).await {
                    Ok(decision) => {
                        debug!(%key, allowed = decision.allowed, "Reviewed permission");
                        cache.insert(&key, decision.allowed);
                        Ok(decision.allowed)
                    }
                    Err(error) => Err(PermissionError::Review {
                        key,
                        source: Arc::new(error),
                    }),
                }
            })
            .await
    }

    /// Serves a still-valid cached decision without consulting the runtime
    /// checker, and otherwise checks as [`Permissions::check`] does.
    pub async fn check_cached(&self, key: &PermissionKey) -> Result<bool, PermissionError> {
        match self.cache.get(key) {
            Some(allowed) => Ok(allowed),
            None => self.check(key).await,
        }
    }

    /// Checks a batch of keys, at most
    /// [`PERMISSION_PRIME_CONCURRENCY`](defaults::PERMISSION_PRIME_CONCURRENCY)
    /// at a time, so that later checks are served from the cache.
    ///
    /// Duplicate keys are checked once. Every check runs to completion; the
    /// first error observed is returned.
    pub async fn prime<I>(&self, keys: I) -> Result<(), PermissionError>
    where
        I: IntoIterator<Item = PermissionKey>,
    {
        let keys = keys.into_iter().collect::<BTreeSet<_>>();
        let results = stream::iter(keys)
            .map(|key| async move { self.check(&key).await })
            .buffer_unordered(defaults::PERMISSION_PRIME_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;
        match results.into_iter().find_map(Result::err) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permissions")
            .field("runtime", &self.runtime.is_some())
            .field("cache", &self.cache)
            .field("flights", &self.flights)
            .finish()
    }
}
