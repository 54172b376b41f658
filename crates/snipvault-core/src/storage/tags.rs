//! Tags, tag groups and item-tag links

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::models::{Tag, TagGroup};
use super::row::{tag_from_row, tag_group_from_row, timestamp};
use super::store::Store;
use crate::error::{Result, VaultError};

const MAX_TAGS_PER_ITEM: usize = 100;
const MAX_TAG_BYTES: usize = 128;
const MAX_GROUP_NAME_LEN: usize = 100;

/// Trim, lowercase and de-duplicate tags, rejecting invalid ones
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>> {
    if tags.len() > MAX_TAGS_PER_ITEM {
        return Err(VaultError::Validation(format!(
            "Too many tags (max {})",
            MAX_TAGS_PER_ITEM
        )));
    }

    let mut seen = HashSet::with_capacity(tags.len());
    let mut normalized = Vec::with_capacity(tags.len());

    for tag in tags {
        let trimmed = tag.trim().to_lowercase();
        if trimmed.is_empty() {
            return Err(VaultError::Validation("Empty tag is not allowed".to_string()));
        }
        if trimmed.len() > MAX_TAG_BYTES {
            return Err(VaultError::Validation(format!(
                "Tag too long (max {} bytes)",
                MAX_TAG_BYTES
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        {
            return Err(VaultError::Validation(format!(
                "Tag '{}' contains invalid characters",
                trimmed
            )));
        }
        if seen.insert(trimmed.clone()) {
            normalized.push(trimmed);
        }
    }

    Ok(normalized)
}

/// Replace the tag set of `item_id` inside an open transaction
///
/// Returns the normalized tags actually linked.
pub(crate) fn link_tags(tx: &Transaction<'_>, item_id: i64, tags: &[String]) -> Result<Vec<String>> {
    let tags = normalize_tags(tags)?;

    tx.execute("DELETE FROM item_tags WHERE item_id = ?1", params![item_id])?;

    for tag in &tags {
        tx.execute(
            "INSERT INTO tags (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
            params![tag],
        )?;
        tx.execute(
            "INSERT INTO item_tags (item_id, tag_id) SELECT ?1, id FROM tags WHERE name = ?2",
            params![item_id, tag],
        )?;
    }

    Ok(tags)
}

/// Tag names keyed by item id for every item matching `scope`
///
/// `scope` is a predicate over the `items` alias `i` with one parameter.
pub(crate) fn tags_by_item(
    conn: &Connection,
    scope: &str,
    param: i64,
) -> Result<HashMap<i64, Vec<String>>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT it.item_id, t.name
         FROM item_tags it
         JOIN tags t ON t.id = it.tag_id
         JOIN items i ON i.id = it.item_id
         WHERE {}
         ORDER BY it.item_id, t.name",
        scope
    ))?;

    let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
    let rows = stmt.query_map(params![param], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (item_id, name) = row?;
        tags.entry(item_id).or_default().push(name);
    }

    Ok(tags)
}

fn validate_group_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VaultError::Validation(
            "Tag group name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_GROUP_NAME_LEN {
        return Err(VaultError::Validation(format!(
            "Tag group name exceeds {} characters",
            MAX_GROUP_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

impl Store {
    pub fn create_tag_group(&self, name: &str) -> Result<i64> {
        let name = validate_group_name(name)?;
        let now = timestamp(self.now());

        self.write(|tx| {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM tag_groups WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(VaultError::Validation(format!(
                    "Tag group '{}' already exists",
                    name
                )));
            }

            tx.execute(
                "INSERT INTO tag_groups (name, created_at) VALUES (?1, ?2)",
                params![name, now],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    pub fn list_tag_groups(&self) -> Result<Vec<TagGroup>> {
        let rows = self.read(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, created_at FROM tag_groups ORDER BY name, id")?;
            let rows = stmt
                .query_map([], tag_group_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(TagGroup::try_from).collect()
    }

    /// Delete a tag group; its tags stay, ungrouped
    pub fn delete_tag_group(&self, id: i64) -> Result<()> {
        self.write(|tx| {
            let changed = tx.execute("DELETE FROM tag_groups WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(VaultError::NotFound(format!("tag group {}", id)));
            }
            Ok(())
        })
    }

    /// Move an existing tag into a group, or out of any group with `None`
    pub fn set_tag_group(&self, tag: &str, group_id: Option<i64>) -> Result<()> {
        let name = normalize_tags(&[tag.to_string()])?
            .pop()
            .ok_or_else(|| VaultError::Validation("Empty tag is not allowed".to_string()))?;

        self.write(|tx| {
            if let Some(group_id) = group_id {
                let exists: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM tag_groups WHERE id = ?1",
                        params![group_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Err(VaultError::NotFound(format!("tag group {}", group_id)));
                }
            }

            let changed = tx.execute(
                "UPDATE tags SET group_id = ?2 WHERE name = ?1",
                params![name, group_id],
            )?;
            if changed == 0 {
                return Err(VaultError::NotFound(format!("tag '{}'", name)));
            }
            Ok(())
        })
    }

    /// All tags ordered by name
    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, group_id FROM tags ORDER BY name")?;
            let tags = stmt
                .query_map([], tag_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tags)
        })
    }

    /// Replace the tags of an item, returning the normalized set
    pub fn set_item_tags(&self, item_id: i64, tags: &[String]) -> Result<Vec<String>> {
        let now = timestamp(self.now());

        let tags = self.write(|tx| {
            let changed = tx.execute(
                "UPDATE items SET updated_at = ?2 WHERE id = ?1",
                params![item_id, now],
            )?;
            if changed == 0 {
                return Err(VaultError::NotFound(format!("item {}", item_id)));
            }
            link_tags(tx, item_id, tags)
        })?;

        debug!("Item {} now has {} tags", item_id, tags.len());
        Ok(tags)
    }
}
