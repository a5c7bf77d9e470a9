//! Singleflight for deduplicating concurrent backing lookups
//!
//! The first caller for a key becomes the leader and registers a shared
//! future; callers arriving while it is in flight await a clone of the same
//! future and observe the same result, error included. The leader alone may
//! publish the result to the cache, and only while its flight is still
//! registered, so a flight removed by invalidation can never repopulate the
//! cache with a pre-invalidation value.

use crate::error::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

type SharedLookup<V> = Shared<BoxFuture<'static, Result<V>>>;

struct Flight<V: Clone> {
    id: u64,
    lookup: SharedLookup<V>,
}

/// Result of trying to acquire a singleflight slot.
enum SingleflightSlot<V: Clone> {
    /// We registered the flight and own its publication.
    Leader(u64, SharedLookup<V>),
    /// Another caller is executing; share its future.
    Follower(SharedLookup<V>),
}

/// Deduplicates concurrent lookups per key
pub struct Singleflight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Map of in-flight lookups
    in_flight: DashMap<K, Flight<V>>,
    next_id: AtomicU64,
}

impl<K, V> Singleflight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Atomically join or start the flight for `key`
    fn acquire<F>(&self, key: K, lookup: F) -> SingleflightSlot<V>
    where
        F: FnOnce() -> BoxFuture<'static, Result<V>>,
    {
        match self.in_flight.entry(key) {
            Entry::Occupied(entry) => SingleflightSlot::Follower(entry.get().lookup.clone()),
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let shared = lookup().shared();
                entry.insert(Flight {
                    id,
                    lookup: shared.clone(),
                });
                SingleflightSlot::Leader(id, shared)
            }
        }
    }

    /// Run `lookup` for `key`, or join the flight already running for it
    ///
    /// On success the leader calls `publish` with the value, under the
    /// in-flight entry lock, if its flight was not forgotten meanwhile.
    pub async fn run<F, P>(&self, key: K, lookup: F, publish: P) -> Result<V>
    where
        F: FnOnce() -> BoxFuture<'static, Result<V>>,
        P: FnOnce(&V),
    {
        match self.acquire(key.clone(), lookup) {
            SingleflightSlot::Follower(shared) => shared.await,
            SingleflightSlot::Leader(id, shared) => {
                let guard = SingleflightGuard::new(self, key, id);
                let result = shared.await;
                match &result {
                    Ok(value) => guard.complete(|| publish(value)),
                    Err(_) => guard.complete(|| {}),
                }
                result
            }
        }
    }

    /// Drop every in-flight registration whose key matches
    ///
    /// Callers already waiting keep their shared future; new callers start
    /// a fresh lookup.
    pub fn forget<P>(&self, predicate: P) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let before = self.in_flight.len();
        self.in_flight.retain(|key, _| !predicate(key));
        before.saturating_sub(self.in_flight.len())
    }

    /// Number of lookups currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Remove the flight if it is still ours, running `commit` first
    fn finish<C>(&self, key: &K, id: u64, commit: C)
    where
        C: FnOnce(),
    {
        if let Entry::Occupied(entry) = self.in_flight.entry(key.clone()) {
            if entry.get().id == id {
                commit();
                entry.remove();
            }
        }
    }
}

impl<K, V> Default for Singleflight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that deregisters the leader's flight on drop.
///
/// If the leader is cancelled (e.g. a short-circuited sibling branch), the
/// registration is removed without publishing; followers still drive the
/// shared future to completion.
struct SingleflightGuard<'a, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + Send + Sync + 'static,
{
    singleflight: &'a Singleflight<K, V>,
    key: K,
    id: u64,
    completed: bool,
}

impl<'a, K, V> SingleflightGuard<'a, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn new(singleflight: &'a Singleflight<K, V>, key: K, id: u64) -> Self {
        Self {
            singleflight,
            key,
            id,
            completed: false,
        }
    }

    /// Mark as completed (normal path, not cancellation).
    fn complete<C: FnOnce()>(mut self, commit: C) {
        self.singleflight.finish(&self.key, self.id, commit);
        self.completed = true;
    }
}

impl<K, V> Drop for SingleflightGuard<'_, K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.completed {
            self.singleflight.finish(&self.key, self.id, || {});
        }
    }
}
