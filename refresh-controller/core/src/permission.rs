//! Cached `(group, resource, verb)` authorization decisions.

use crate::Clock;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use std::{fmt, sync::Arc, time::Duration};

pub const VERB_LIST: &str = "list";
pub const VERB_WATCH: &str = "watch";

/// Identifies a cluster-wide authorization decision.
///
/// Displays as `<group>/<resource>/<verb>`, which is also the cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionKey {
    pub group: String,
    pub resource: String,
    pub verb: String,
}

/// A permission source that is preferred over direct access reviews.
///
/// When it fails, callers may fall back to a still-valid cached decision.
#[async_trait::async_trait]
pub trait RuntimeChecker: Send + Sync {
    async fn check(&self, key: &PermissionKey) -> anyhow::Result<bool>;
}

/// A TTL cache of authorization decisions.
///
/// Entries expire independently and are only removed when a read observes
/// them as expired (or when the cache is cleared). Keys that were ever allowed
/// are remembered separately, even after their entries expire.
pub struct PermissionCache {
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    allowed: HashSet<String>,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    allowed: bool,
    expires_at: DateTime<Utc>,
}

// === impl PermissionKey ===

impl PermissionKey {
    pub fn new(group: impl ToString, resource: impl ToString, verb: impl ToString) -> Self {
        Self {
            group: group.to_string(),
            resource: resource.to_string(),
            verb: verb.to_string(),
        }
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.resource, self.verb)
    }
}

// === impl PermissionCache ===

impl PermissionCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
            state: RwLock::default(),
        }
    }

    /// Returns the cached decision for `key` if it has not expired.
    pub fn get(&self, key: &PermissionKey) -> Option<bool> {
        let key = key.to_string();
        let now = self.clock.now();
        {
            let state = self.state.read();
            match state.entries.get(&key) {
                None => return None,
                Some(entry) if now < entry.expires_at => return Some(entry.allowed),
                Some(_) => {}
            }
        }

        // The entry may have been refreshed between releasing the read lock
        // and acquiring the write lock.
        let mut state = self.state.write();
        match state.entries.get(&key) {
            Some(entry) if now < entry.expires_at => Some(entry.allowed),
            Some(_) => {
                state.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: &PermissionKey, allowed: bool) {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let key = key.to_string();
        let mut state = self.state.write();
        if allowed {
            state.allowed.insert(key.clone());
        }
        state.entries.insert(
            key,
            Entry {
                allowed,
                expires_at,
            },
        );
    }

    /// Keys that have been allowed at least once, sorted.
    pub fn allowed_keys(&self) -> Vec<String> {
        let mut keys = self.state.read().allowed.iter().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    /// The number of entries held, including expired entries not yet read.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries = HashMap::new();
        state.allowed = HashSet::new();
    }
}

impl fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionCache")
            .field("ttl", &self.ttl)
            .field("state", &*self.state.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn cache(ttl: Duration) -> (Arc<ManualClock>, PermissionCache) {
        let clock = Arc::new(ManualClock::default());
        let cache = PermissionCache::new(ttl, clock.clone());
        (clock, cache)
    }

    #[test]
    fn key_displays_as_cache_key() {
        assert_eq!(
            PermissionKey::new("apps", "deployments", "list").to_string(),
            "apps/deployments/list"
        );
        assert_eq!(PermissionKey::new("", "nodes", "watch").to_string(), "/nodes/watch");
    }

    #[test]
    fn decisions_live_until_ttl() {
        let (clock, cache) = cache(Duration::from_secs(120));
        let allowed = PermissionKey::new("", "nodes", "list");
        let denied = PermissionKey::new("", "secrets", "list");
        cache.insert(&allowed, true);
        cache.insert(&denied, false);

        clock.advance(Duration::from_secs(119));
        assert_eq!(cache.get(&allowed), Some(true));
        assert_eq!(cache.get(&denied), Some(false));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&allowed), None);
        assert_eq!(cache.get(&denied), None);
    }

    #[test]
    fn expired_entries_are_removed_on_read() {
        let (clock, cache) = cache(Duration::from_secs(1));
        let key = PermissionKey::new("", "pods", "watch");
        cache.insert(&key, true);
        assert_eq!(cache.len(), 1);

        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.len(), 1, "expiry must not be swept eagerly");
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn refresh_extends_expiry() {
        let (clock, cache) = cache(Duration::from_secs(10));
        let key = PermissionKey::new("rbac.authorization.k8s.io", "roles", "list");
        cache.insert(&key, false);
        clock.advance(Duration::from_secs(8));
        cache.insert(&key, true);
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get(&key), Some(true));
    }

    #[test]
    fn allowed_keys_outlive_expiry_and_clear() {
        let (clock, cache) = cache(Duration::from_secs(1));
        cache.insert(&PermissionKey::new("", "nodes", "watch"), true);
        cache.insert(&PermissionKey::new("", "nodes", "list"), true);
        cache.insert(&PermissionKey::new("", "secrets", "list"), false);

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get(&PermissionKey::new("", "nodes", "list")), None);
        assert_eq!(cache.allowed_keys(), vec!["/nodes/list", "/nodes/watch"]);

        cache.clear();
        assert!(cache.allowed_keys().is_empty());
        assert!(cache.is_empty());
    }
}
