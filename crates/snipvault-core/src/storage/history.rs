//! Clipboard history

use rusqlite::{params, Transaction};

use super::models::ClipboardEntry;
use super::row::{timestamp, HistoryRow};
use super::store::Store;
use crate::error::Result;

/// Delete all but the newest `limit` history rows
pub(crate) fn trim_history(tx: &Transaction<'_>, limit: usize) -> Result<()> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    tx.execute(
        "DELETE FROM clipboard_history WHERE id NOT IN (
            SELECT id FROM clipboard_history ORDER BY copied_at DESC, id DESC LIMIT ?1
        )",
        params![limit],
    )?;
    Ok(())
}

impl Store {
    /// Record text copied from outside the store
    pub fn record_clipboard_text(&self, text: &str) -> Result<i64> {
        let now = timestamp(self.now());
        let limit = self.history_limit();

        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO clipboard_history (item_id, content, copied_at) VALUES (NULL, ?1, ?2)",
                params![text, now],
            )?;
            let id = tx.last_insert_rowid();
            trim_history(tx, limit)?;
            Ok(id)
        })
    }

    /// Most recent history entries, newest first
    pub fn clipboard_history(&self, limit: usize) -> Result<Vec<ClipboardEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, item_id, content, copied_at FROM clipboard_history
                 ORDER BY copied_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], HistoryRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(ClipboardEntry::try_from).collect()
    }

    pub fn clear_clipboard_history(&self) -> Result<()> {
        self.transaction(|tx| {
            tx.execute("DELETE FROM clipboard_history", [])?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{ItemUpdate, NewCategory, NewItem};
    use crate::storage::test_support::{keyed_context, test_store};

    #[test]
    fn test_sensitive_history_keeps_reference_only() {
        let store = test_store();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("c")).unwrap();
        let plain = store
            .add_item(&ctx, NewItem::new(category, "p", "echo hi"))
            .unwrap();
        let secret = store
            .add_item(&ctx, NewItem::new(category, "s", "sk-123").sensitive())
            .unwrap();

        store.record_item_use(plain).unwrap();
        store.record_item_use(secret).unwrap();

        let history = store.clipboard_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].item_id, Some(secret));
        assert_eq!(history[0].content, None);
        assert_eq!(history[1].item_id, Some(plain));
        assert_eq!(history[1].content.as_deref(), Some("echo hi"));
    }

    #[test]
    fn test_marking_sensitive_scrubs_earlier_history() {
        let store = test_store();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("c")).unwrap();
        let item = store
            .add_item(&ctx, NewItem::new(category, "token", "sk-live-999"))
            .unwrap();
        let other = store.add_item(&ctx, NewItem::new(category, "p", "echo")).unwrap();
        store.record_item_use(item).unwrap();
        store.record_item_use(other).unwrap();

        store
            .update_item(
                &ctx,
                item,
                ItemUpdate {
                    is_sensitive: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        let history = store.clipboard_history(10).unwrap();
        let scrubbed = history.iter().find(|e| e.item_id == Some(item)).unwrap();
        assert_eq!(scrubbed.content, None);
        let kept = history.iter().find(|e| e.item_id == Some(other)).unwrap();
        assert_eq!(kept.content.as_deref(), Some("echo"));

        let leaked: i64 = store
            .read(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM clipboard_history WHERE content LIKE '%sk-live%'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(leaked, 0);
    }

    #[test]
    fn test_history_trimmed_to_limit() {
        let store = test_store();
        store.set_history_limit(3);

        for i in 0..5 {
            store.record_clipboard_text(&format!("copy {}", i)).unwrap();
        }

        let history = store.clipboard_history(10).unwrap();
        let contents: Vec<_> = history.iter().filter_map(|e| e.content.clone()).collect();
        assert_eq!(contents, vec!["copy 4", "copy 3", "copy 2"]);

        store.clear_clipboard_history().unwrap();
        assert!(store.clipboard_history(10).unwrap().is_empty());
    }

    #[test]
    fn test_deleted_item_keeps_history_row() {
        let store = test_store();
        let ctx = keyed_context();
        let category = store.add_category(NewCategory::new("c")).unwrap();
        let item = store.add_item(&ctx, NewItem::new(category, "p", "x")).unwrap();
        store.record_item_use(item).unwrap();

        store.delete_item(item).unwrap();

        let history = store.clipboard_history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].item_id, None);
    }
}
