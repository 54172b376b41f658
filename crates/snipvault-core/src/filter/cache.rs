//! Bounded recency cache of filter results

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::criteria::FilterCriteria;
use crate::storage::{CacheInvalidator, CategorySummary};

/// Shared, immutable filter result
pub type FilterResult = Arc<Vec<CategorySummary>>;

/// Counters describing cache behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Times the criteria were evaluated against the store
    pub evaluations: u64,
    pub invalidations: u64,
}

/// Outcome of a cache lookup
#[derive(Debug)]
pub enum Lookup {
    Hit(FilterResult),
    /// Not cached; insert the computed result under `generation`
    Miss { generation: u64 },
}

struct CacheState {
    entries: LruCache<FilterCriteria, FilterResult>,
    /// Bumped on every invalidation
    generation: u64,
}

/// LRU map from criteria to results
///
/// The lock is held only for lookups, inserts and clears. A result computed
/// while an invalidation happened is discarded instead of inserted, since it
/// may predate the mutation.
pub struct FilterCache {
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    evaluations: AtomicU64,
    invalidations: AtomicU64,
}

impl FilterCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                generation: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evaluations: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Cache contents stay consistent even if a holder panicked
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn lookup(&self, criteria: &FilterCriteria) -> Lookup {
        let mut state = self.lock();
        let generation = state.generation;
        match state.entries.get(criteria) {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Lookup::Hit(result.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Lookup::Miss { generation }
            }
        }
    }

    /// Insert a result computed at `generation`
    ///
    /// Returns `false` (and drops the result) if the cache was invalidated
    /// since.
    pub fn insert(&self, criteria: FilterCriteria, generation: u64, result: FilterResult) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            debug!("Discarding filter result computed before an invalidation");
            return false;
        }
        state.entries.put(criteria, result);
        true
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut state = self.lock();
        state.generation = state.generation.wrapping_add(1);
        state.entries.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evaluation(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl CacheInvalidator for FilterCache {
    fn invalidate(&self) {
        self.clear();
        debug!("Filter cache invalidated");
    }
}
