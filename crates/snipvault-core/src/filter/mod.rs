//! Category filter engine
//!
//! Computes filtered and sorted category views and memoizes them in a
//! bounded LRU cache keyed by the full criteria. The cache subscribes to the
//! store, so every committed mutation clears it.

mod cache;
mod criteria;
mod engine;

pub use cache::{CacheStats, FilterCache, FilterResult, Lookup};
pub use criteria::{FilterCriteria, SortKey, SortOrder};
pub use engine::FilterEngine;
