//! Raw row types and timestamp encoding

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;

use super::models::{Category, ClipboardEntry, ItemList, ItemPlaceholder, Tag, TagGroup};
use crate::error::{Result, VaultError};

/// Format a timestamp for storage
///
/// Fixed width (microseconds, `Z` suffix) so lexical order is time order.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| VaultError::Storage(format!("Invalid timestamp '{}': {}", value, e)))?
        .with_timezone(&Utc))
}

pub(crate) fn parse_optional_timestamp(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(parse_timestamp).transpose()
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

pub(crate) const CATEGORY_COLUMNS: &str =
    "id, name, icon, is_predefined, is_active, is_pinned, position, created_at, updated_at";

/// Raw row from the categories table
#[derive(Debug)]
pub(crate) struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub icon: Option<String>,
    pub is_predefined: bool,
    pub is_active: bool,
    pub is_pinned: bool,
    pub position: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl CategoryRow {
    /// Map a row selected with [`CATEGORY_COLUMNS`] starting at `offset`
    pub fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            name: row.get(offset + 1)?,
            icon: row.get(offset + 2)?,
            is_predefined: row.get(offset + 3)?,
            is_active: row.get(offset + 4)?,
            is_pinned: row.get(offset + 5)?,
            position: row.get(offset + 6)?,
            created_at: row.get(offset + 7)?,
            updated_at: row.get(offset + 8)?,
        })
    }
}

impl TryFrom<CategoryRow> for Category {
    type Error = VaultError;

    fn try_from(row: CategoryRow) -> Result<Self> {
        Ok(Category {
            id: row.id,
            name: row.name,
            icon: row.icon,
            is_predefined: row.is_predefined,
            is_active: row.is_active,
            is_pinned: row.is_pinned,
            position: row.position,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

pub(crate) const ITEM_COLUMNS: &str = "id, category_id, label, content, item_type, is_sensitive, \
     is_favorite, description, use_count, last_used_at, list_id, list_position, created_at, updated_at";

/// Raw row from the items table, content still in its stored form
pub(crate) struct ItemRow {
    pub id: i64,
    pub category_id: i64,
    pub label: String,
    pub content: Vec<u8>,
    pub item_type: String,
    pub is_sensitive: bool,
    pub is_favorite: bool,
    pub description: Option<String>,
    pub use_count: i64,
    pub last_used_at: Option<String>,
    pub list_id: Option<i64>,
    pub list_position: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl ItemRow {
    /// Map a row selected with [`ITEM_COLUMNS`]
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            category_id: row.get(1)?,
            label: row.get(2)?,
            content: row.get(3)?,
            item_type: row.get(4)?,
            is_sensitive: row.get(5)?,
            is_favorite: row.get(6)?,
            description: row.get(7)?,
            use_count: row.get(8)?,
            last_used_at: row.get(9)?,
            list_id: row.get(10)?,
            list_position: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    pub fn placeholder(&self) -> ItemPlaceholder {
        ItemPlaceholder {
            id: self.id,
            category_id: self.category_id,
            label: self.label.clone(),
        }
    }

    pub fn use_count(&self) -> u64 {
        count(self.use_count)
    }
}

pub(crate) fn tag_group_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

impl TryFrom<(i64, String, String)> for TagGroup {
    type Error = VaultError;

    fn try_from((id, name, created_at): (i64, String, String)) -> Result<Self> {
        Ok(TagGroup {
            id,
            name,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

pub(crate) fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        group_id: row.get(2)?,
    })
}

pub(crate) const LIST_COLUMNS: &str = "l.id, l.category_id, l.name, l.description, l.use_count, \
     l.last_used_at, l.created_at, l.updated_at, \
     (SELECT COUNT(*) FROM items i WHERE i.list_id = l.id)";

/// Raw row from the lists table with its step count
#[derive(Debug)]
pub(crate) struct ListRow {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub use_count: i64,
    pub last_used_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub item_count: i64,
}

impl ListRow {
    /// Map a row selected with [`LIST_COLUMNS`]
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            category_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            use_count: row.get(4)?,
            last_used_at: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            item_count: row.get(8)?,
        })
    }
}

impl TryFrom<ListRow> for ItemList {
    type Error = VaultError;

    fn try_from(row: ListRow) -> Result<Self> {
        Ok(ItemList {
            id: row.id,
            category_id: row.category_id,
            name: row.name,
            description: row.description,
            use_count: count(row.use_count),
            last_used_at: parse_optional_timestamp(row.last_used_at.as_deref())?,
            item_count: count(row.item_count),
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

/// Raw row from the clipboard_history table
#[derive(Debug)]
pub(crate) struct HistoryRow {
    pub id: i64,
    pub item_id: Option<i64>,
    pub content: Option<String>,
    pub copied_at: String,
}

impl HistoryRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            item_id: row.get(1)?,
            content: row.get(2)?,
            copied_at: row.get(3)?,
        })
    }
}

impl TryFrom<HistoryRow> for ClipboardEntry {
    type Error = VaultError;

    fn try_from(row: HistoryRow) -> Result<Self> {
        Ok(ClipboardEntry {
            id: row.id,
            item_id: row.item_id,
            content: row.content,
            copied_at: parse_timestamp(&row.copied_at)?,
        })
    }
}
