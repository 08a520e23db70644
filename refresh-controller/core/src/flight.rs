//! Single-flight de-duplication of concurrent work.

use ahash::AHashMap as HashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::{fmt, future::Future};

/// Collapses concurrent calls that share a key into one execution.
///
/// The first caller for a key starts the work; callers arriving while it is in
/// flight await the same shared future and receive a clone of its output. The
/// key is forgotten once the flight completes, so later calls start new work.
pub struct Group<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    next_id: u64,
    flights: HashMap<String, Flight<T>>,
}

struct Flight<T> {
    id: u64,
    future: Shared<BoxFuture<'static, T>>,
}

// === impl Group ===

impl<T> Group<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 0,
                flights: HashMap::new(),
            }),
        }
    }

    /// Runs `work` unless a flight for `key` is already in progress, in which
    /// case that flight's result is returned instead and `work` is dropped
    /// without being called.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (id, future) = {
            let mut inner = self.inner.lock();
            match inner.flights.get(key) {
                Some(flight) => (flight.id, flight.future.clone()),
                None => {
                    inner.next_id += 1;
                    let id = inner.next_id;
                    let future = work().boxed().shared();
                    inner.flights.insert(
                        key.to_string(),
                        Flight {
                            id,
                            future: future.clone(),
                        },
                    );
                    (id, future)
                }
            }
        };

        let output = future.await;

        // A newer flight may already have replaced this one.
        let mut inner = self.inner.lock();
        if inner.flights.get(key).map(|f| f.id) == Some(id) {
            inner.flights.remove(key);
        }
        output
    }

    /// The number of keys with work in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().flights.len()
    }
}

impl<T> Default for Group<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Group<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Group")
            .field("in_flight", &inner.flights.keys().collect::<Vec<_>>())
            .finish()
    }
}
