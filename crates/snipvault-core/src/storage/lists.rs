//! Ordered item lists
//!
//! A list is a named sequence of steps inside one category. Every step is an
//! ordinary item carrying the list id and its position, so steps show up in
//! category reads and filter results like any other item.

use rusqlite::{params, OptionalExtension, Transaction};
use tracing::{debug, info};

use super::codec::decode_item;
use super::items::{ensure_category, insert_item, load_rows, validate_label, ListSlot};
use super::models::{ItemList, LoadedItem, NewItem, NewList};
use super::row::{timestamp, ListRow, LIST_COLUMNS};
use super::store::Store;
use crate::context::AuthContext;
use crate::error::{Result, VaultError};

const MAX_LIST_NAME_LEN: usize = 100;
const MAX_LIST_STEPS: usize = 50;

fn validate_list_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VaultError::Validation("List name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_LIST_NAME_LEN {
        return Err(VaultError::Validation(format!(
            "List name exceeds {} characters",
            MAX_LIST_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn ensure_unique_name(
    tx: &Transaction<'_>,
    category_id: i64,
    name: &str,
    except: Option<i64>,
) -> Result<()> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM lists WHERE category_id = ?1 AND name = ?2",
            params![category_id, name],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) if Some(id) != except => Err(VaultError::Validation(format!(
            "A list named '{}' already exists in this category",
            name
        ))),
        _ => Ok(()),
    }
}

impl Store {
    /// Create a list and all of its steps atomically
    ///
    /// Returns the list id and the step item ids in order.
    pub fn create_list(&self, ctx: &AuthContext, list: NewList) -> Result<(i64, Vec<i64>)> {
        let name = validate_list_name(&list.name)?;
        if list.steps.is_empty() {
            return Err(VaultError::Validation(
                "A list needs at least one step".to_string(),
            ));
        }
        if list.steps.len() > MAX_LIST_STEPS {
            return Err(VaultError::Validation(format!(
                "A list can have at most {} steps",
                MAX_LIST_STEPS
            )));
        }
        for step in &list.steps {
            validate_label(&step.label)?;
        }

        let now = timestamp(self.now());
        let (list_id, item_ids) = self.write(|tx| {
            ensure_category(tx, list.category_id)?;
            ensure_unique_name(tx, list.category_id, &name, None)?;

            tx.execute(
                "INSERT INTO lists (category_id, name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![list.category_id, name, list.description, now],
            )?;
            let list_id = tx.last_insert_rowid();

            let mut item_ids = Vec::with_capacity(list.steps.len());
            for (position, step) in (1_i64..).zip(&list.steps) {
                let item = NewItem {
                    category_id: list.category_id,
                    label: step.label.clone(),
                    content: step.content.clone(),
                    item_type: step.item_type,
                    is_sensitive: step.is_sensitive,
                    is_favorite: false,
                    description: step.description.clone(),
                    tags: step.tags.clone(),
                };
                let slot = ListSlot { list_id, position };
                item_ids.push(insert_item(tx, ctx, &item, Some(slot), &now)?);
            }

            Ok((list_id, item_ids))
        })?;

        info!(
            "Created list {} in category {} with {} steps",
            list_id,
            list.category_id,
            item_ids.len()
        );
        Ok((list_id, item_ids))
    }

    pub fn get_list(&self, id: i64) -> Result<Option<ItemList>> {
        let row = self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM lists l WHERE l.id = ?1", LIST_COLUMNS),
                    params![id],
                    ListRow::from_row,
                )
                .optional()?)
        })?;

        row.map(ItemList::try_from).transpose()
    }

    /// Lists of a category ordered by name
    pub fn get_lists(&self, category_id: i64) -> Result<Vec<ItemList>> {
        let rows = self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM lists l WHERE l.category_id = ?1 ORDER BY l.name, l.id",
                LIST_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![category_id], ListRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(ItemList::try_from).collect()
    }

    /// Steps of a list in order
    pub fn list_items(&self, ctx: &AuthContext, list_id: i64) -> Result<Vec<LoadedItem>> {
        let rows = self.read(|conn| {
            load_rows(conn, "i.list_id = ?1", "i.list_position, i.id", list_id)
        })?;

        rows.into_iter()
            .map(|(row, tags)| decode_item(row, tags, ctx))
            .collect()
    }

    pub fn rename_list(&self, id: i64, name: &str) -> Result<()> {
        let name = validate_list_name(name)?;
        let now = timestamp(self.now());

        self.write(|tx| {
            let category_id: Option<i64> = tx
                .query_row(
                    "SELECT category_id FROM lists WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(category_id) = category_id else {
                return Err(VaultError::NotFound(format!("list {}", id)));
            };

            ensure_unique_name(tx, category_id, &name, Some(id))?;
            tx.execute(
                "UPDATE lists SET name = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, name, now],
            )?;
            Ok(())
        })
    }

    /// Delete a list together with its steps
    pub fn delete_list(&self, id: i64) -> Result<()> {
        self.write(|tx| {
            let changed = tx.execute("DELETE FROM lists WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(VaultError::NotFound(format!("list {}", id)));
            }
            Ok(())
        })?;

        debug!("Deleted list {}", id);
        Ok(())
    }

    pub fn record_list_use(&self, id: i64) -> Result<()> {
        let now = timestamp(self.now());

        self.write(|tx| {
            let changed = tx.execute(
                "UPDATE lists SET use_count = use_count + 1, last_used_at = ?2 WHERE id = ?1",
                params![id, now],
            )?;
            if changed == 0 {
                return Err(VaultError::NotFound(format!("list {}", id)));
            }
            Ok(())
        })
    }

    /// Contents of every step joined by `separator`
    ///
    /// Fails if any step cannot be materialized: `CorruptedItem` for a step
    /// that does not decrypt, `VaultLocked` for a sensitive step read
    /// without key material.
    pub fn combined_content(
        &self,
        ctx: &AuthContext,
        list_id: i64,
        separator: &str,
    ) -> Result<String> {
        if self.get_list(list_id)?.is_none() {
            return Err(VaultError::NotFound(format!("list {}", list_id)));
        }

        let items = self.list_items(ctx, list_id)?;
        if items.is_empty() {
            return Err(VaultError::Validation(format!("List {} has no steps", list_id)));
        }

        let contents = items
            .into_iter()
            .map(|item| match item {
                LoadedItem::Ready(item) => Ok(item.content),
                LoadedItem::Corrupted(placeholder) => Err(VaultError::CorruptedItem(placeholder.id)),
                LoadedItem::Locked(_) => Err(VaultError::VaultLocked),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(contents.join(separator))
    }
}
