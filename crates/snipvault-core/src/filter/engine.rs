//! Filter evaluation over the store

use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

use super::cache::{CacheStats, FilterCache, FilterResult, Lookup};
use super::criteria::FilterCriteria;
use crate::error::Result;
use crate::storage::{CategorySummary, Store};

/// Serves filtered category views, memoized until the next mutation
#[derive(Clone)]
pub struct FilterEngine {
    store: Arc<Store>,
    cache: Arc<FilterCache>,
}

impl FilterEngine {
    /// Build an engine whose cache is cleared by every store mutation
    pub fn new(store: Arc<Store>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        let cache = Arc::new(FilterCache::new(capacity));
        store.subscribe(cache.clone());

        Self { store, cache }
    }

    /// Categories matching every predicate of `criteria`, in sort order
    ///
    /// Repeated calls with equal criteria return the same shared result
    /// until the store is mutated. The cache lock is not held while the
    /// store is queried.
    pub fn apply(&self, criteria: &FilterCriteria) -> Result<FilterResult> {
        let generation = match self.cache.lookup(criteria) {
            Lookup::Hit(result) => return Ok(result),
            Lookup::Miss { generation } => generation,
        };

        let result = Arc::new(self.evaluate(criteria)?);
        self.cache
            .insert(criteria.clone(), generation, result.clone());
        Ok(result)
    }

    /// Evaluate `criteria` against the store, bypassing the cache
    pub fn evaluate(&self, criteria: &FilterCriteria) -> Result<Vec<CategorySummary>> {
        self.cache.record_evaluation();

        let text = criteria.text_query();
        let mut summaries: Vec<CategorySummary> = self
            .store
            .category_summaries(text.as_deref())?
            .into_iter()
            .filter(|summary| criteria.matches(summary))
            .collect();
        summaries.sort_by(|a, b| criteria.compare(a, b));

        debug!("Filter matched {} categories", summaries.len());
        Ok(summaries)
    }

    /// Drop every cached result
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{SortKey, SortOrder};
    use crate::storage::test_support::{keyed_context, test_store};
    use crate::storage::{CategoryUpdate, ItemUpdate, NewCategory, NewItem};

    fn engine() -> (FilterEngine, Arc<Store>) {
        let store = Arc::new(test_store());
        (FilterEngine::new(store.clone(), 8), store)
    }

    fn ids(result: &FilterResult) -> Vec<i64> {
        result.iter().map(|s| s.category.id).collect()
    }

    #[test]
    fn test_repeat_query_served_from_cache() {
        let (engine, store) = engine();
        store.add_category(NewCategory::new("Git")).unwrap();
        let criteria = FilterCriteria::new().text("git");

        let first = engine.apply(&criteria).unwrap();
        let second = engine.apply(&criteria).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = engine.stats();
        assert_eq!(stats.evaluations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_every_mutation_kind_invalidates() {
        let (engine, store) = engine();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("Shell")).unwrap();
        let criteria = FilterCriteria::new().text("docker");

        assert!(engine.apply(&criteria).unwrap().is_empty());

        // New item matching by content
        let item = store
            .add_item(&ctx, NewItem::new(category, "ps", "docker ps"))
            .unwrap();
        assert_eq!(ids(&engine.apply(&criteria).unwrap()), vec![category]);

        // Edited content no longer matches
        store
            .update_item(
                &ctx,
                item,
                ItemUpdate {
                    content: Some("podman ps".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(engine.apply(&criteria).unwrap().is_empty());

        // Tag change matches again
        store.set_item_tags(item, &["docker".to_string()]).unwrap();
        assert_eq!(ids(&engine.apply(&criteria).unwrap()), vec![category]);

        // Deleted item is gone
        store.delete_item(item).unwrap();
        assert!(engine.apply(&criteria).unwrap().is_empty());

        // Renamed category matches by name
        store
            .update_category(
                category,
                CategoryUpdate {
                    name: Some("Docker".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ids(&engine.apply(&criteria).unwrap()), vec![category]);

        store.delete_category(category).unwrap();
        assert!(engine.apply(&criteria).unwrap().is_empty());
    }

    #[test]
    fn test_predicates_and_sort() {
        let (engine, store) = engine();
        let ctx = keyed_context();
        let busy = store.add_category(NewCategory::new("Busy")).unwrap();
        let quiet = store.add_category(NewCategory::new("Quiet")).unwrap();
        let pinned = store.add_category(NewCategory::new("Pinned").pinned()).unwrap();

        for (category, uses) in [(busy, 6), (quiet, 1), (pinned, 6)] {
            let item = store
                .add_item(&ctx, NewItem::new(category, "x", "y"))
                .unwrap();
            for _ in 0..uses {
                store.record_item_use(item).unwrap();
            }
        }

        let result = engine
            .apply(
                &FilterCriteria::new()
                    .min_usage(5)
                    .sort_by(SortKey::Usage, SortOrder::Descending),
            )
            .unwrap();
        assert_eq!(ids(&result), vec![busy, pinned]);

        let result = engine
            .apply(&FilterCriteria::new().min_usage(5).pinned(false))
            .unwrap();
        assert_eq!(ids(&result), vec![busy]);
    }

    #[test]
    fn test_text_query_matches_accented_names() {
        let (engine, store) = engine();
        let exito = store.add_category(NewCategory::new("Éxito")).unwrap();
        store.add_category(NewCategory::new("Git")).unwrap();

        let exact = engine.apply(&FilterCriteria::new().text("Éxito")).unwrap();
        assert_eq!(ids(&exact), vec![exito]);
        let upper = engine.apply(&FilterCriteria::new().text("ÉXITO")).unwrap();
        assert_eq!(ids(&upper), vec![exito]);
    }

    #[test]
    fn test_explicit_invalidate() {
        let (engine, store) = engine();
        store.add_category(NewCategory::new("a")).unwrap();
        let criteria = FilterCriteria::new();

        engine.apply(&criteria).unwrap();
        assert_eq!(engine.cached_entries(), 1);

        engine.invalidate();
        assert_eq!(engine.cached_entries(), 0);
        engine.apply(&criteria).unwrap();
        assert_eq!(engine.stats().evaluations, 2);
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let (engine, store) = engine();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("Git")).unwrap();
        let criteria = FilterCriteria::new().text("git");

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let engine = engine.clone();
                let criteria = criteria.clone();
                scope.spawn(move || {
                    for _ in 0..25 {
                        engine.apply(&criteria).unwrap();
                    }
                });
            }
            scope.spawn(|| {
                for i in 0..10 {
                    store
                        .add_item(&ctx, NewItem::new(category, format!("git {}", i), "x"))
                        .unwrap();
                }
            });
        });

        // After all writers finish, the view reflects every item
        let result = engine.apply(&criteria).unwrap();
        assert_eq!(result[0].item_count, 10);
    }
}
