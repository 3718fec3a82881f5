use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::errors::CoreError;
use crate::models::budget::MonthData;
use crate::models::month::MonthKey;

/// Result of one month fetch, shared by everyone who joined it.
pub type FetchOutcome = Result<Arc<MonthData>, CoreError>;

/// Handle to an in-flight fetch for one month.
///
/// Clones share the same cell: whichever holder calls [`run`](Self::run)
/// first performs the fetch, the others wait for its outcome.
#[derive(Clone)]
pub struct PendingFetch {
    key: MonthKey,
    seq: u64,
    generation: u64,
    cell: Arc<OnceCell<FetchOutcome>>,
}

impl std::fmt::Debug for PendingFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFetch")
            .field("key", &self.key)
            .field("seq", &self.seq)
            .field("generation", &self.generation)
            .field("finished", &self.cell.initialized())
            .finish()
    }
}

impl PendingFetch {
    fn new(key: MonthKey, seq: u64, generation: u64) -> Self {
        Self {
            key,
            seq,
            generation,
            cell: Arc::new(OnceCell::new()),
        }
    }

    pub fn key(&self) -> MonthKey {
        self.key
    }

    /// Per-month initiation order; higher is newer.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Cache generation the fetch was started in; see [`SnapshotCache::clear`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.cell.initialized()
    }

    pub fn is_same(&self, other: &PendingFetch) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Drive the fetch, or wait for the holder already driving it.
    /// If that holder is dropped mid-flight, the next waiter takes over
    /// with its own `fetch`, so there is still only one call at a time.
    pub async fn run<F, Fut>(&self, fetch: F) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        self.cell.get_or_init(fetch).await.clone()
    }
}

/// Answer of [`SnapshotCache::get`].
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Ready(Arc<MonthData>),
    Pending(PendingFetch),
    Absent,
}

/// Answer of [`SnapshotCache::acquire`].
#[derive(Debug, Clone)]
pub enum Acquired {
    /// Valid data, no fetch needed.
    Cached(Arc<MonthData>),
    /// A fetch was already in flight; wait on it.
    Joined(PendingFetch),
    /// A new fetch was registered; the caller must run it.
    Started(PendingFetch),
}

impl Acquired {
    pub fn pending(&self) -> Option<&PendingFetch> {
        match self {
            Acquired::Cached(_) => None,
            Acquired::Joined(p) | Acquired::Started(p) => Some(p),
        }
    }
}

/// What [`SnapshotCache::complete`] did with a finished fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Stored as the month's current data.
    Applied,
    /// Dropped: an invalidation, a later-initiated fetch or a
    /// [`clear`](SnapshotCache::clear) superseded it.
    Superseded,
    /// The fetch failed; existing data is untouched.
    Failed,
}

#[derive(Debug, Default)]
struct Slot {
    data: Option<Arc<MonthData>>,
    valid: bool,
    in_flight: Option<PendingFetch>,
    next_seq: u64,
    /// Seq of the fetch (or put) that produced `data`.
    applied_seq: Option<u64>,
    /// Fetches initiated before the last invalidation may predate a
    /// mutation and are never applied.
    min_valid_seq: u64,
}

impl Slot {
    fn issue_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

#[derive(Debug, Default)]
struct CacheState {
    /// Bumped by every `clear`; fetches from an older generation are dropped.
    generation: u64,
    slots: HashMap<MonthKey, Slot>,
}

/// Per-month snapshot store with single-flight fetches.
///
/// - One slot per [`MonthKey`]; operations on one key never touch another.
/// - No expiry: data stays valid until [`invalidate`](Self::invalidate).
/// - Invalidated data remains readable through
///   [`last_known`](Self::last_known) so a failed refetch can still show it.
/// - [`clear`](Self::clear) starts a new generation: fetches begun before it
///   never write into the cache.
/// - The lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    state: RwLock<CacheState>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: MonthKey) -> CacheLookup {
        let state = self.read();
        let Some(slot) = state.slots.get(&key) else {
            return CacheLookup::Absent;
        };
        match (&slot.data, slot.valid, &slot.in_flight) {
            (Some(data), true, _) => CacheLookup::Ready(Arc::clone(data)),
            (_, _, Some(pending)) => CacheLookup::Pending(pending.clone()),
            _ => CacheLookup::Absent,
        }
    }

    /// Store data directly, superseding any fetch initiated earlier.
    pub fn put(&self, key: MonthKey, data: MonthData) -> Arc<MonthData> {
        let data = Arc::new(data);
        let mut state = self.write();
        let slot = state.slots.entry(key).or_default();
        let seq = slot.issue_seq();
        slot.data = Some(Arc::clone(&data));
        slot.valid = true;
        slot.applied_seq = Some(seq);
        data
    }

    /// Mark the month stale and detach any in-flight fetch, so the next
    /// request starts a fresh one. Other months are untouched.
    pub fn invalidate(&self, key: MonthKey) {
        let mut state = self.write();
        if let Some(slot) = state.slots.get_mut(&key) {
            slot.valid = false;
            slot.in_flight = None;
            slot.min_valid_seq = slot.next_seq;
            debug!(month = %key, "snapshot invalidated");
        }
    }

    /// Valid data (unless `force`), else the in-flight fetch, else a newly
    /// registered one. Atomic per key.
    pub fn acquire(&self, key: MonthKey, force: bool) -> Acquired {
        let mut state = self.write();
        let generation = state.generation;
        let slot = state.slots.entry(key).or_default();
        if !force && slot.valid {
            if let Some(data) = &slot.data {
                return Acquired::Cached(Arc::clone(data));
            }
        }
        if let Some(pending) = &slot.in_flight {
            return Acquired::Joined(pending.clone());
        }
        let pending = PendingFetch::new(key, slot.issue_seq(), generation);
        slot.in_flight = Some(pending.clone());
        Acquired::Started(pending)
    }

    /// Record a finished fetch. Safe to call once per waiter: repeated
    /// calls for the same fetch are no-ops.
    pub fn complete(&self, pending: &PendingFetch, outcome: &FetchOutcome) -> Completion {
        let key = pending.key;
        let mut state = self.write();
        if pending.generation != state.generation {
            debug!(month = %key, seq = pending.seq, "discarding fetch from before cache reset");
            return Completion::Superseded;
        }
        let slot = state.slots.entry(key).or_default();
        if slot.in_flight.as_ref().is_some_and(|p| p.is_same(pending)) {
            slot.in_flight = None;
        }

        let data = match outcome {
            Ok(data) => data,
            Err(_) => return Completion::Failed,
        };
        if slot.applied_seq == Some(pending.seq) {
            return Completion::Applied;
        }
        let newer_applied = slot.applied_seq.is_some_and(|applied| applied > pending.seq);
        if newer_applied || pending.seq < slot.min_valid_seq {
            debug!(month = %key, seq = pending.seq, "discarding superseded fetch result");
            return Completion::Superseded;
        }
        slot.data = Some(Arc::clone(data));
        slot.valid = true;
        slot.applied_seq = Some(pending.seq);
        Completion::Applied
    }

    /// Last successfully fetched data, valid or not.
    pub fn last_known(&self, key: MonthKey) -> Option<Arc<MonthData>> {
        self.read().slots.get(&key).and_then(|s| s.data.clone())
    }

    pub fn is_valid(&self, key: MonthKey) -> bool {
        self.read()
            .slots
            .get(&key)
            .is_some_and(|s| s.valid && s.data.is_some())
    }

    pub fn is_loading(&self, key: MonthKey) -> bool {
        self.read()
            .slots
            .get(&key)
            .is_some_and(|s| s.in_flight.is_some())
    }

    /// Drop everything, e.g. on logout. Fetches still in flight finish
    /// for their callers but are never stored.
    pub fn clear(&self) {
        let mut state = self.write();
        state.slots.clear();
        state.generation += 1;
    }

    /// Current generation; compare with [`PendingFetch::generation`].
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    pub fn len(&self) -> usize {
        self.read()
            .slots
            .values()
            .filter(|s| s.data.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn key(i: i64) -> MonthKey {
        MonthKey::new(i).unwrap()
    }

    fn empty(k: MonthKey) -> MonthData {
        MonthData::NotConfigured {
            month_key: k,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn second_acquire_joins_first() {
        let cache = SnapshotCache::new();
        let a = cache.acquire(key(1), false);
        let b = cache.acquire(key(1), true);
        assert!(matches!(a, Acquired::Started(_)));
        match (a, b) {
            (Acquired::Started(p1), Acquired::Joined(p2)) => assert!(p1.is_same(&p2)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(cache.get(key(1)), CacheLookup::Pending(_)));
    }

    #[test]
    fn later_result_wins_over_earlier_completion() {
        let cache = SnapshotCache::new();
        let Acquired::Started(first) = cache.acquire(key(2), false) else {
            panic!("expected start")
        };
        cache.invalidate(key(2));
        let Acquired::Started(second) = cache.acquire(key(2), false) else {
            panic!("expected start")
        };
        let newer = Arc::new(empty(key(2)));
        assert_eq!(cache.complete(&second, &Ok(Arc::clone(&newer))), Completion::Applied);
        let older = Arc::new(empty(key(2)));
        assert_eq!(cache.complete(&first, &Ok(older)), Completion::Superseded);
        assert!(Arc::ptr_eq(&cache.last_known(key(2)).unwrap(), &newer));
    }

    #[test]
    fn failure_keeps_previous_data() {
        let cache = SnapshotCache::new();
        let stored = cache.put(key(3), empty(key(3)));
        let Acquired::Started(p) = cache.acquire(key(3), true) else {
            panic!("expected start")
        };
        let outcome = Err(CoreError::Network("timeout".into()));
        assert_eq!(cache.complete(&p, &outcome), Completion::Failed);
        assert!(Arc::ptr_eq(&cache.last_known(key(3)).unwrap(), &stored));
        assert!(!cache.is_loading(key(3)));
    }

    #[test]
    fn fetch_from_before_clear_is_never_stored() {
        let cache = SnapshotCache::new();
        let Acquired::Started(old) = cache.acquire(key(6), false) else {
            panic!("expected start")
        };
        cache.clear();
        let Acquired::Started(fresh) = cache.acquire(key(6), false) else {
            panic!("expected start")
        };
        // Same per-key seq in both generations.
        assert_eq!(old.seq(), fresh.seq());
        assert_ne!(old.generation(), fresh.generation());

        let outcome = Ok(Arc::new(empty(key(6))));
        assert_eq!(cache.complete(&old, &outcome), Completion::Superseded);
        assert!(cache.last_known(key(6)).is_none());
        assert!(cache.is_loading(key(6)));
        assert_eq!(cache.complete(&fresh, &outcome), Completion::Applied);
    }

    #[test]
    fn clear_without_new_fetch_leaves_cache_empty() {
        let cache = SnapshotCache::new();
        let Acquired::Started(old) = cache.acquire(key(7), false) else {
            panic!("expected start")
        };
        cache.clear();
        let outcome = Ok(Arc::new(empty(key(7))));
        assert_eq!(cache.complete(&old, &outcome), Completion::Superseded);
        assert!(cache.is_empty());
        assert!(!cache.is_loading(key(7)));
    }

    #[test]
    fn invalidate_is_scoped_to_one_month() {
        let cache = SnapshotCache::new();
        cache.put(key(4), empty(key(4)));
        cache.put(key(5), empty(key(5)));
        cache.invalidate(key(4));
        assert!(matches!(cache.get(key(4)), CacheLookup::Absent));
        assert!(matches!(cache.get(key(5)), CacheLookup::Ready(_)));
        assert!(cache.last_known(key(4)).is_some());
    }
}
