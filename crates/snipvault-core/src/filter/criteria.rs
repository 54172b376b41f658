//! Filter criteria

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::storage::CategorySummary;

/// Sort key for filter results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Category name, case-insensitive
    Name,
    /// Sum of item use counts
    Usage,
    /// Most recent item use; never-used categories sort lowest
    Recency,
    /// Stored category position
    #[default]
    Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Composite category predicate, combined with AND semantics
///
/// Also the cache key: two criteria that compare equal share one cached
/// result. Unset fields do not constrain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Substring of a category name, item label, tag or non-sensitive content
    pub text: Option<String>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub min_usage: Option<u64>,
    pub max_usage: Option<u64>,
    /// Last use at or after this instant
    pub used_after: Option<DateTime<Utc>>,
    /// Last use strictly before this instant
    pub used_before: Option<DateTime<Utc>>,
    pub active: Option<bool>,
    pub pinned: Option<bool>,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text query, trimmed and lowercased; blank clears it
    pub fn text(mut self, text: impl AsRef<str>) -> Self {
        let text = text.as_ref().trim().to_lowercase();
        self.text = (!text.is_empty()).then_some(text);
        self
    }

    pub fn item_count_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_items = min;
        self.max_items = max;
        self
    }

    pub fn min_usage(mut self, min: u64) -> Self {
        self.min_usage = Some(min);
        self
    }

    pub fn max_usage(mut self, max: u64) -> Self {
        self.max_usage = Some(max);
        self
    }

    pub fn used_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.used_after = after;
        self.used_before = before;
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    pub fn sort_by(mut self, sort: SortKey, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    /// Text used for matching, normalized even if set directly
    pub(crate) fn text_query(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
    }

    /// Check every non-text predicate against a summary
    pub fn matches(&self, summary: &CategorySummary) -> bool {
        let within = |value: u64, min: Option<u64>, max: Option<u64>| {
            min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
        };

        if !within(summary.item_count, self.min_items, self.max_items) {
            return false;
        }
        if !within(summary.usage_count, self.min_usage, self.max_usage) {
            return false;
        }

        if self.used_after.is_some() || self.used_before.is_some() {
            let Some(last_used) = summary.last_used_at else {
                return false;
            };
            if self.used_after.is_some_and(|after| last_used < after) {
                return false;
            }
            if self.used_before.is_some_and(|before| last_used >= before) {
                return false;
            }
        }

        if self.active.is_some_and(|active| summary.category.is_active != active) {
            return false;
        }
        if self.pinned.is_some_and(|pinned| summary.category.is_pinned != pinned) {
            return false;
        }

        true
    }

    /// Ordering by the configured key; ties always fall back to id ascending
    pub fn compare(&self, a: &CategorySummary, b: &CategorySummary) -> Ordering {
        let primary = match self.sort {
            SortKey::Name => a
                .category
                .name
                .to_lowercase()
                .cmp(&b.category.name.to_lowercase()),
            SortKey::Usage => a.usage_count.cmp(&b.usage_count),
            SortKey::Recency => a.last_used_at.cmp(&b.last_used_at),
            SortKey::Position => a.category.position.cmp(&b.category.position),
        };

        let primary = match self.order {
            SortOrder::Ascending => primary,
            SortOrder::Descending => primary.reverse(),
        };

        primary.then_with(|| a.category.id.cmp(&b.category.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Category;
    use chrono::{Duration, TimeZone};

    fn summary(id: i64, name: &str, items: u64, usage: u64, last_used: Option<i64>) -> CategorySummary {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        CategorySummary {
            category: Category {
                id,
                name: name.to_string(),
                icon: None,
                is_predefined: false,
                is_active: true,
                is_pinned: false,
                position: 10 - id,
                created_at: base,
                updated_at: base,
            },
            item_count: items,
            usage_count: usage,
            last_used_at: last_used.map(|h| base + Duration::hours(h)),
        }
    }

    #[test]
    fn test_text_builder_normalizes() {
        assert_eq!(FilterCriteria::new().text("  Git ").text.as_deref(), Some("git"));
        assert_eq!(FilterCriteria::new().text("   ").text, None);
        assert_eq!(
            FilterCriteria::new().text("GIT"),
            FilterCriteria::new().text("git")
        );
    }

    #[test]
    fn test_ranges_are_inclusive() {
        let s = summary(1, "a", 3, 5, None);

        assert!(FilterCriteria::new().min_usage(5).matches(&s));
        assert!(!FilterCriteria::new().min_usage(6).matches(&s));
        assert!(FilterCriteria::new().max_usage(5).matches(&s));
        assert!(FilterCriteria::new().item_count_range(Some(3), Some(3)).matches(&s));
        assert!(!FilterCriteria::new().item_count_range(None, Some(2)).matches(&s));
    }

    #[test]
    fn test_date_range() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let used = summary(1, "a", 1, 1, Some(5));
        let never = summary(2, "b", 1, 0, None);

        let criteria = FilterCriteria::new()
            .used_between(Some(base + Duration::hours(5)), Some(base + Duration::hours(6)));
        assert!(criteria.matches(&used));
        assert!(!criteria.matches(&never));

        let before = FilterCriteria::new().used_between(None, Some(base + Duration::hours(5)));
        assert!(!before.matches(&used));
    }

    #[test]
    fn test_flags() {
        let mut s = summary(1, "a", 1, 1, None);
        s.category.is_pinned = true;

        assert!(FilterCriteria::new().pinned(true).active(true).matches(&s));
        assert!(!FilterCriteria::new().pinned(false).matches(&s));
        assert!(!FilterCriteria::new().active(false).matches(&s));
    }

    #[test]
    fn test_sort_ties_by_id() {
        let mut rows = vec![
            summary(3, "b", 1, 7, Some(1)),
            summary(1, "B", 1, 7, Some(2)),
            summary(2, "a", 1, 2, None),
        ];

        let by_usage = FilterCriteria::new().sort_by(SortKey::Usage, SortOrder::Descending);
        rows.sort_by(|a, b| by_usage.compare(a, b));
        assert_eq!(rows.iter().map(|r| r.category.id).collect::<Vec<_>>(), vec![1, 3, 2]);

        let by_name = FilterCriteria::new().sort_by(SortKey::Name, SortOrder::Ascending);
        rows.sort_by(|a, b| by_name.compare(a, b));
        assert_eq!(rows.iter().map(|r| r.category.id).collect::<Vec<_>>(), vec![2, 1, 3]);

        let by_recency = FilterCriteria::new().sort_by(SortKey::Recency, SortOrder::Descending);
        rows.sort_by(|a, b| by_recency.compare(a, b));
        assert_eq!(rows.iter().map(|r| r.category.id).collect::<Vec<_>>(), vec![1, 3, 2]);
    }
}
