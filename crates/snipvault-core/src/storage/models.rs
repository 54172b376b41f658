//! Record types owned by the store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VaultError;

/// A category of snippets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    pub is_predefined: bool,
    pub is_active: bool,
    pub is_pinned: bool,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new category
#[derive(Debug, Clone, Default)]
pub struct NewCategory {
    pub name: String,
    pub icon: Option<String>,
    pub is_predefined: bool,
    pub is_active: bool,
    pub is_pinned: bool,
    /// Appended after the last category when `None`
    pub position: Option<i64>,
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_active: true,
            ..Default::default()
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn pinned(mut self) -> Self {
        self.is_pinned = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn predefined(mut self) -> Self {
        self.is_predefined = true;
        self
    }
}

/// Partial update of a category; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub icon: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub is_pinned: Option<bool>,
    pub position: Option<i64>,
}

/// Kind of snippet content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    #[default]
    Text,
    Code,
    Url,
    Path,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Text => "text",
            ItemType::Code => "code",
            ItemType::Url => "url",
            ItemType::Path => "path",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ItemType::Text),
            "code" => Ok(ItemType::Code),
            "url" => Ok(ItemType::Url),
            "path" => Ok(ItemType::Path),
            other => Err(VaultError::Validation(format!("Unknown item type: {}", other))),
        }
    }
}

/// A snippet with its content already in plaintext
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub category_id: i64,
    pub label: String,
    pub content: String,
    pub item_type: ItemType,
    pub is_sensitive: bool,
    pub is_favorite: bool,
    pub description: Option<String>,
    pub use_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub list_id: Option<i64>,
    pub list_position: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content: &dyn fmt::Debug = if self.is_sensitive {
            &"[REDACTED]"
        } else {
            &self.content
        };

        f.debug_struct("Item")
            .field("id", &self.id)
            .field("category_id", &self.category_id)
            .field("label", &self.label)
            .field("content", content)
            .field("item_type", &self.item_type)
            .field("is_sensitive", &self.is_sensitive)
            .field("is_favorite", &self.is_favorite)
            .field("use_count", &self.use_count)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Fields for a new item
#[derive(Clone, Default)]
pub struct NewItem {
    pub category_id: i64,
    pub label: String,
    pub content: String,
    pub item_type: ItemType,
    pub is_sensitive: bool,
    pub is_favorite: bool,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl NewItem {
    pub fn new(category_id: i64, label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            category_id,
            label: label.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.is_sensitive = true;
        self
    }

    pub fn favorite(mut self) -> Self {
        self.is_favorite = true;
        self
    }

    pub fn with_type(mut self, item_type: ItemType) -> Self {
        self.item_type = item_type;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Debug for NewItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewItem")
            .field("category_id", &self.category_id)
            .field("label", &self.label)
            .field("item_type", &self.item_type)
            .field("is_sensitive", &self.is_sensitive)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Partial update of an item; `None` leaves a field unchanged
#[derive(Clone, Default)]
pub struct ItemUpdate {
    pub category_id: Option<i64>,
    pub label: Option<String>,
    pub content: Option<String>,
    pub item_type: Option<ItemType>,
    pub is_sensitive: Option<bool>,
    pub is_favorite: Option<bool>,
    pub description: Option<Option<String>>,
    /// Replaces the full tag set when present
    pub tags: Option<Vec<String>>,
}

impl fmt::Debug for ItemUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemUpdate")
            .field("category_id", &self.category_id)
            .field("label", &self.label)
            .field("content", &self.content.as_ref().map(|_| "[REDACTED]"))
            .field("is_sensitive", &self.is_sensitive)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Identifying fields of an item whose content could not be materialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPlaceholder {
    pub id: i64,
    pub category_id: i64,
    pub label: String,
}

/// Result of reading one item row
///
/// Bulk reads never abort on a single bad row; a row whose ciphertext fails
/// to decrypt is returned as `Corrupted`, and a sensitive row read without
/// key material is returned as `Locked`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedItem {
    Ready(Item),
    Corrupted(ItemPlaceholder),
    Locked(ItemPlaceholder),
}

impl LoadedItem {
    pub fn id(&self) -> i64 {
        match self {
            LoadedItem::Ready(item) => item.id,
            LoadedItem::Corrupted(placeholder) | LoadedItem::Locked(placeholder) => placeholder.id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            LoadedItem::Ready(item) => &item.label,
            LoadedItem::Corrupted(placeholder) | LoadedItem::Locked(placeholder) => {
                &placeholder.label
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LoadedItem::Ready(_))
    }

    pub fn ready(self) -> Option<Item> {
        match self {
            LoadedItem::Ready(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_ready(&self) -> Option<&Item> {
        match self {
            LoadedItem::Ready(item) => Some(item),
            _ => None,
        }
    }
}

/// Named group of tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagGroup {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A tag, optionally belonging to a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub group_id: Option<i64>,
}

/// An ordered list of items within one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemList {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub use_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub item_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One step of a new list
#[derive(Clone, Default)]
pub struct ListStep {
    pub label: String,
    pub content: String,
    pub item_type: ItemType,
    pub is_sensitive: bool,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl ListStep {
    pub fn new(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.is_sensitive = true;
        self
    }
}

impl fmt::Debug for ListStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListStep")
            .field("label", &self.label)
            .field("is_sensitive", &self.is_sensitive)
            .finish_non_exhaustive()
    }
}

/// Fields for a new list
#[derive(Debug, Clone, Default)]
pub struct NewList {
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<ListStep>,
}

/// One clipboard history row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardEntry {
    pub id: i64,
    pub item_id: Option<i64>,
    /// `None` for sensitive items; only the reference is kept
    pub content: Option<String>,
    pub copied_at: DateTime<Utc>,
}

/// A category together with aggregates over its items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: Category,
    pub item_count: u64,
    pub usage_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}
