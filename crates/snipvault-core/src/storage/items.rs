//! Item records with transparent content encoding

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use super::codec::{decode_content, decode_item, encode_content};
use super::history::trim_history;
use super::models::{ItemUpdate, LoadedItem, NewItem};
use super::row::{timestamp, ItemRow, ITEM_COLUMNS};
use super::store::Store;
use super::tags::{link_tags, tags_by_item};
use crate::context::AuthContext;
use crate::error::{Result, VaultError};

const MAX_LABEL_LEN: usize = 200;

pub(crate) fn validate_label(label: &str) -> Result<String> {
    let label = label.trim();
    if label.is_empty() {
        return Err(VaultError::Validation("Item label cannot be empty".to_string()));
    }
    if label.chars().count() > MAX_LABEL_LEN {
        return Err(VaultError::Validation(format!(
            "Item label exceeds {} characters",
            MAX_LABEL_LEN
        )));
    }
    Ok(label.to_string())
}

pub(crate) fn ensure_category(tx: &Transaction<'_>, category_id: i64) -> Result<()> {
    let exists: Option<i64> = tx
        .query_row(
            "SELECT id FROM categories WHERE id = ?1",
            params![category_id],
            |row| row.get(0),
        )
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(VaultError::NotFound(format!("category {}", category_id))),
    }
}

/// Position of an item inside a list
#[derive(Debug, Clone, Copy)]
pub(crate) struct ListSlot {
    pub list_id: i64,
    pub position: i64,
}

/// Insert one item row and its tag links inside an open transaction
///
/// The content is encoded first; the row statement only ever sees the
/// stored form.
pub(crate) fn insert_item(
    tx: &Transaction<'_>,
    ctx: &AuthContext,
    item: &NewItem,
    slot: Option<ListSlot>,
    now: &str,
) -> Result<i64> {
    let label = validate_label(&item.label)?;
    let content = encode_content(&item.content, item.is_sensitive, ctx)?;

    tx.execute(
        "INSERT INTO items (category_id, label, content, item_type, is_sensitive, is_favorite,
                            description, list_id, list_position, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            item.category_id,
            label,
            content,
            item.item_type.as_str(),
            item.is_sensitive,
            item.is_favorite,
            item.description,
            slot.map(|s| s.list_id),
            slot.map(|s| s.position),
            now
        ],
    )?;
    let id = tx.last_insert_rowid();

    link_tags(tx, id, &item.tags)?;
    Ok(id)
}

/// Load item rows matching `scope` (a predicate over alias `i`) with tags
pub(crate) fn load_rows(
    conn: &Connection,
    scope: &str,
    order: &str,
    param: i64,
) -> Result<Vec<(ItemRow, Vec<String>)>> {
    let columns = ITEM_COLUMNS
        .split(", ")
        .map(|column| format!("i.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM items i WHERE {} ORDER BY {}",
        columns, scope, order
    ))?;
    let rows = stmt
        .query_map(params![param], ItemRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut tags = tags_by_item(conn, scope, param)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let item_tags = tags.remove(&row.id).unwrap_or_default();
            (row, item_tags)
        })
        .collect())
}

impl Store {
    /// Add an item, returning its id
    ///
    /// Sensitive content is sealed with the context's key before the row is
    /// written. The item row and its tag links commit together or not at all.
    pub fn add_item(&self, ctx: &AuthContext, item: NewItem) -> Result<i64> {
        let now = timestamp(self.now());

        let id = self.write(|tx| {
            ensure_category(tx, item.category_id)?;
            insert_item(tx, ctx, &item, None, &now)
        })?;

        debug!(
            "Added item {} to category {} (sensitive: {})",
            id, item.category_id, item.is_sensitive
        );
        Ok(id)
    }

    /// Apply a partial update to an item
    ///
    /// Flipping `is_sensitive` re-encodes the existing content in place
    /// within the same transaction.
    pub fn update_item(&self, ctx: &AuthContext, id: i64, update: ItemUpdate) -> Result<()> {
        let label = update.label.as_deref().map(validate_label).transpose()?;
        let now = timestamp(self.now());

        self.write(|tx| {
            let current: Option<(Vec<u8>, bool, i64, Option<i64>)> = tx
                .query_row(
                    "SELECT content, is_sensitive, category_id, list_id FROM items WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;
            let Some((stored, was_sensitive, old_category, list_id)) = current else {
                return Err(VaultError::NotFound(format!("item {}", id)));
            };

            if let Some(category_id) = update.category_id {
                // A list step lives in the category of its list
                if list_id.is_some() && category_id != old_category {
                    return Err(VaultError::Validation(format!(
                        "Item {} belongs to a list and cannot change category",
                        id
                    )));
                }
                ensure_category(tx, category_id)?;
            }

            let sensitive = update.is_sensitive.unwrap_or(was_sensitive);
            let content = match &update.content {
                Some(content) => Some(encode_content(content, sensitive, ctx)?),
                None if sensitive != was_sensitive => {
                    let key = if was_sensitive { Some(ctx.key()?) } else { None };
                    let plaintext = decode_content(&stored, was_sensitive, key)?;
                    Some(encode_content(&plaintext, sensitive, ctx)?)
                }
                None => None,
            };

            tx.execute(
                "UPDATE items SET
                    category_id = COALESCE(?2, category_id),
                    label = COALESCE(?3, label),
                    content = COALESCE(?4, content),
                    item_type = COALESCE(?5, item_type),
                    is_sensitive = ?6,
                    is_favorite = COALESCE(?7, is_favorite),
                    description = CASE WHEN ?8 THEN ?9 ELSE description END,
                    updated_at = ?10
                 WHERE id = ?1",
                params![
                    id,
                    update.category_id,
                    label,
                    content,
                    update.item_type.map(|t| t.as_str()),
                    sensitive,
                    update.is_favorite,
                    update.description.is_some(),
                    update.description.clone().flatten(),
                    now
                ],
            )?;

            if sensitive && !was_sensitive {
                // History rows copied while the item was plain keep only the reference
                tx.execute(
                    "UPDATE clipboard_history SET content = NULL WHERE item_id = ?1",
                    params![id],
                )?;
            }

            if let Some(tags) = &update.tags {
                link_tags(tx, id, tags)?;
            }
            Ok(())
        })?;

        debug!("Updated item {}", id);
        Ok(())
    }

    pub fn delete_item(&self, id: i64) -> Result<()> {
        self.write(|tx| {
            let changed = tx.execute("DELETE FROM items WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(VaultError::NotFound(format!("item {}", id)));
            }
            Ok(())
        })?;

        debug!("Deleted item {}", id);
        Ok(())
    }

    /// Load one item, `None` if it does not exist
    pub fn get_item(&self, ctx: &AuthContext, id: i64) -> Result<Option<LoadedItem>> {
        let mut rows = self.read(|conn| load_rows(conn, "i.id = ?1", "i.id", id))?;

        match rows.pop() {
            Some((row, tags)) => decode_item(row, tags, ctx).map(Some),
            None => Ok(None),
        }
    }

    /// Load every item of a category
    ///
    /// A row that fails to decrypt is returned as `LoadedItem::Corrupted`
    /// rather than failing the whole read.
    pub fn get_items_by_category(
        &self,
        ctx: &AuthContext,
        category_id: i64,
    ) -> Result<Vec<LoadedItem>> {
        let rows = self.read(|conn| load_rows(conn, "i.category_id = ?1", "i.id", category_id))?;

        rows.into_iter()
            .map(|(row, tags)| decode_item(row, tags, ctx))
            .collect()
    }

    /// Count a use of an item and append it to the clipboard history
    pub fn record_item_use(&self, id: i64) -> Result<()> {
        let now = timestamp(self.now());
        let limit = self.history_limit();

        self.write(|tx| {
            let changed = tx.execute(
                "UPDATE items SET use_count = use_count + 1, last_used_at = ?2 WHERE id = ?1",
                params![id, now],
            )?;
            if changed == 0 {
                return Err(VaultError::NotFound(format!("item {}", id)));
            }

            tx.execute(
                "INSERT INTO clipboard_history (item_id, content, copied_at)
                 SELECT id, CASE WHEN is_sensitive = 0 THEN CAST(content AS TEXT) END, ?2
                 FROM items WHERE id = ?1",
                params![id, now],
            )?;
            trim_history(tx, limit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyMaterial;
    use crate::storage::models::{ItemType, NewCategory};
    use crate::storage::test_support::{keyed_context, keyless_context, test_store};

    fn raw_content(store: &Store, id: i64) -> Vec<u8> {
        store
            .read(|conn| {
                Ok(conn.query_row("SELECT content FROM items WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })?)
            })
            .unwrap()
    }

    fn count_rows(store: &Store, table: &str) -> i64 {
        store
            .read(|conn| {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?)
            })
            .unwrap()
    }

    #[test]
    fn test_add_and_read_items() {
        let store = test_store();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("Shell")).unwrap();

        let id = store
            .add_item(
                &ctx,
                NewItem::new(category, "List files", "ls -la")
                    .with_type(ItemType::Code)
                    .with_description("long listing")
                    .with_tags(["unix", "Files"])
                    .favorite(),
            )
            .unwrap();

        let item = store.get_item(&ctx, id).unwrap().unwrap().ready().unwrap();
        assert_eq!(item.label, "List files");
        assert_eq!(item.content, "ls -la");
        assert_eq!(item.item_type, ItemType::Code);
        assert_eq!(item.description.as_deref(), Some("long listing"));
        assert_eq!(item.tags, vec!["files", "unix"]);
        assert!(item.is_favorite);
        assert_eq!(item.use_count, 0);
        assert_eq!(raw_content(&store, id), b"ls -la");

        assert!(store.get_item(&ctx, id + 1).unwrap().is_none());
    }

    #[test]
    fn test_sensitive_content_encrypted_at_rest() {
        let store = test_store();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("Keys")).unwrap();

        let id = store
            .add_item(&ctx, NewItem::new(category, "api", "sk-123").sensitive())
            .unwrap();

        let raw = raw_content(&store, id);
        assert_ne!(raw, b"sk-123");
        assert!(!raw.windows(6).any(|w| w == b"sk-123"));

        let items = store.get_items_by_category(&ctx, category).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ready().unwrap().content, "sk-123");
    }

    #[test]
    fn test_unknown_category() {
        let store = test_store();
        let ctx = keyed_context();

        assert!(matches!(
            store.add_item(&ctx, NewItem::new(42, "x", "y")),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_tag_link_rolls_back_item() {
        let store = test_store();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("c")).unwrap();

        let result = store.add_item(
            &ctx,
            NewItem::new(category, "label", "content").with_tags(["fine", "not fine"]),
        );

        assert!(matches!(result, Err(VaultError::TransactionAborted(_))));
        assert_eq!(count_rows(&store, "items"), 0);
        assert_eq!(count_rows(&store, "item_tags"), 0);
        assert_eq!(count_rows(&store, "tags"), 0);
    }

    #[test]
    fn test_toggle_sensitivity_reencodes_in_place() {
        let store = test_store();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("c")).unwrap();
        let id = store
            .add_item(&ctx, NewItem::new(category, "db", "postgres://u:p@h"))
            .unwrap();

        store
            .update_item(
                &ctx,
                id,
                ItemUpdate {
                    is_sensitive: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_ne!(raw_content(&store, id), b"postgres://u:p@h");
        let item = store.get_item(&ctx, id).unwrap().unwrap().ready().unwrap();
        assert!(item.is_sensitive);
        assert_eq!(item.content, "postgres://u:p@h");

        store
            .update_item(
                &ctx,
                id,
                ItemUpdate {
                    is_sensitive: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(raw_content(&store, id), b"postgres://u:p@h");
    }

    #[test]
    fn test_update_fields() {
        let store = test_store();
        let ctx = keyed_context();
        let first = store.add_category(NewCategory::new("a")).unwrap();
        let second = store.add_category(NewCategory::new("b")).unwrap();
        let id = store
            .add_item(
                &ctx,
                NewItem::new(first, "old", "secret")
                    .sensitive()
                    .with_description("d"),
            )
            .unwrap();

        store
            .update_item(
                &ctx,
                id,
                ItemUpdate {
                    category_id: Some(second),
                    label: Some("new".to_string()),
                    content: Some("rotated".to_string()),
                    description: Some(None),
                    tags: Some(vec!["moved".to_string()]),
                    ..Default::default()
                },
            )
            .unwrap();

        let item = store.get_item(&ctx, id).unwrap().unwrap().ready().unwrap();
        assert_eq!(item.category_id, second);
        assert_eq!(item.label, "new");
        assert_eq!(item.content, "rotated");
        assert_eq!(item.description, None);
        assert_eq!(item.tags, vec!["moved"]);
        assert_ne!(raw_content(&store, id), b"rotated");

        assert!(matches!(
            store.update_item(&ctx, id + 1, ItemUpdate::default()),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_keyless_context() {
        let store = test_store();
        let ctx = keyed_context();
        let locked = keyless_context();
        let category = store.add_category(NewCategory::new("c")).unwrap();
        let secret = store
            .add_item(&ctx, NewItem::new(category, "secret", "s3cr3t").sensitive())
            .unwrap();
        let plain = store
            .add_item(&locked, NewItem::new(category, "plain", "hello"))
            .unwrap();

        let items = store.get_items_by_category(&locked, category).unwrap();
        assert!(matches!(&items[0], LoadedItem::Locked(p) if p.id == secret));
        assert_eq!(items[1].as_ready().unwrap().id, plain);

        assert!(matches!(
            store.add_item(&locked, NewItem::new(category, "x", "y").sensitive()),
            Err(VaultError::VaultLocked)
        ));
        assert!(matches!(
            store.update_item(
                &locked,
                secret,
                ItemUpdate {
                    content: Some("new".to_string()),
                    ..Default::default()
                }
            ),
            Err(VaultError::VaultLocked)
        ));

        // Label edits do not need the key
        store
            .update_item(
                &locked,
                secret,
                ItemUpdate {
                    label: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    #[test]
    fn test_corrupted_row_does_not_hide_others() {
        let store = test_store();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("c")).unwrap();
        let first = store
            .add_item(&ctx, NewItem::new(category, "one", "1").sensitive())
            .unwrap();
        let broken = store
            .add_item(&ctx, NewItem::new(category, "two", "2").sensitive())
            .unwrap();
        let third = store
            .add_item(&ctx, NewItem::new(category, "three", "3"))
            .unwrap();

        let mut tampered = raw_content(&store, broken);
        tampered[20] ^= 0x01;
        store
            .write(|tx| {
                tx.execute(
                    "UPDATE items SET content = ?1 WHERE id = ?2",
                    params![tampered, broken],
                )?;
                Ok(())
            })
            .unwrap();

        let items = store.get_items_by_category(&ctx, category).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ready().unwrap().id, first);
        assert!(matches!(&items[1], LoadedItem::Corrupted(p) if p.id == broken));
        assert_eq!(items[2].as_ready().unwrap().id, third);

        // Wrong key reads every sensitive row as corrupted
        let stranger = crate::storage::test_support::context_with_key(KeyMaterial::new([0xee; 32]));
        let items = store.get_items_by_category(&stranger, category).unwrap();
        assert!(matches!(items[0], LoadedItem::Corrupted(_)));
        assert!(items[2].is_ready());
    }

    #[test]
    fn test_record_item_use() {
        let store = test_store();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("c")).unwrap();
        let id = store
            .add_item(&ctx, NewItem::new(category, "x", "echo hi"))
            .unwrap();

        store.record_item_use(id).unwrap();
        store.record_item_use(id).unwrap();

        let item = store.get_item(&ctx, id).unwrap().unwrap().ready().unwrap();
        assert_eq!(item.use_count, 2);
        assert!(item.last_used_at.is_some());
        assert_eq!(count_rows(&store, "clipboard_history"), 2);

        assert!(matches!(
            store.record_item_use(id + 1),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_item() {
        let store = test_store();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("c")).unwrap();
        let id = store
            .add_item(&ctx, NewItem::new(category, "x", "y").with_tags(["t"]))
            .unwrap();

        store.delete_item(id).unwrap();
        assert!(store.get_item(&ctx, id).unwrap().is_none());
        assert_eq!(count_rows(&store, "item_tags"), 0);
        assert!(matches!(store.delete_item(id), Err(VaultError::NotFound(_))));
    }
}
