//! Category records

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::database::FOLD_FUNCTION;
use super::models::{Category, CategorySummary, CategoryUpdate, NewCategory};
use super::row::{parse_optional_timestamp, timestamp, CategoryRow, CATEGORY_COLUMNS};
use super::store::Store;
use crate::error::{Result, VaultError};

const MAX_CATEGORY_NAME_LEN: usize = 100;

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VaultError::Validation(
            "Category name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_CATEGORY_NAME_LEN {
        return Err(VaultError::Validation(format!(
            "Category name exceeds {} characters",
            MAX_CATEGORY_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// `LIKE` pattern matching `text` anywhere, with wildcards escaped
pub(crate) fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl Store {
    /// Add a category, returning its id
    pub fn add_category(&self, category: NewCategory) -> Result<i64> {
        let name = validate_name(&category.name)?;
        let now = timestamp(self.now());

        let id = self.write(|tx| {
            let position = match category.position {
                Some(position) => position,
                None => tx.query_row(
                    "SELECT COALESCE(MAX(position) + 1, 0) FROM categories",
                    [],
                    |row| row.get(0),
                )?,
            };

            tx.execute(
                "INSERT INTO categories (name, icon, is_predefined, is_active, is_pinned, position, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    name,
                    category.icon,
                    category.is_predefined,
                    category.is_active,
                    category.is_pinned,
                    position,
                    now
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })?;

        debug!("Added category {}", id);
        Ok(id)
    }

    /// Apply a partial update to a category
    pub fn update_category(&self, id: i64, update: CategoryUpdate) -> Result<()> {
        let name = update.name.as_deref().map(validate_name).transpose()?;
        let now = timestamp(self.now());

        self.write(|tx| {
            let changed = tx.execute(
                "UPDATE categories SET
                    name = COALESCE(?2, name),
                    icon = CASE WHEN ?3 THEN ?4 ELSE icon END,
                    is_active = COALESCE(?5, is_active),
                    is_pinned = COALESCE(?6, is_pinned),
                    position = COALESCE(?7, position),
                    updated_at = ?8
                 WHERE id = ?1",
                params![
                    id,
                    name,
                    update.icon.is_some(),
                    update.icon.clone().flatten(),
                    update.is_active,
                    update.is_pinned,
                    update.position,
                    now
                ],
            )?;
            if changed == 0 {
                return Err(VaultError::NotFound(format!("category {}", id)));
            }
            Ok(())
        })
    }

    /// Delete a category together with its items, lists and tag links
    pub fn delete_category(&self, id: i64) -> Result<()> {
        self.write(|tx| {
            let changed = tx.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(VaultError::NotFound(format!("category {}", id)));
            }
            Ok(())
        })?;

        debug!("Deleted category {}", id);
        Ok(())
    }

    pub fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let row = self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
                    params![id],
                    |row| CategoryRow::from_row(row, 0),
                )
                .optional()?)
        })?;

        row.map(Category::try_from).transpose()
    }

    /// All categories ordered by position, then id
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM categories ORDER BY position ASC, id ASC",
                CATEGORY_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], |row| CategoryRow::from_row(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(Category::try_from).collect()
    }

    /// Categories with item aggregates, optionally narrowed by a text match
    ///
    /// `text` matches (case-insensitively, as a substring) the category
    /// name, any item label, any tag on an item, or the content of a
    /// non-sensitive item. Sensitive content is never searched.
    pub fn category_summaries(&self, text: Option<&str>) -> Result<Vec<CategorySummary>> {
        let pattern = text
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .map(|t| contains_pattern(&t));

        let rows = self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {columns},
                        (SELECT COUNT(*) FROM items i WHERE i.category_id = c.id),
                        (SELECT COALESCE(SUM(i.use_count), 0) FROM items i WHERE i.category_id = c.id),
                        (SELECT MAX(i.last_used_at) FROM items i WHERE i.category_id = c.id)
                 FROM categories c
                 WHERE ?1 IS NULL
                    OR {fold}(c.name) LIKE ?1 ESCAPE '\\'
                    OR EXISTS (
                        SELECT 1 FROM items m
                        LEFT JOIN item_tags it ON it.item_id = m.id
                        LEFT JOIN tags t ON t.id = it.tag_id
                        WHERE m.category_id = c.id
                          AND ({fold}(m.label) LIKE ?1 ESCAPE '\\'
                               OR t.name LIKE ?1 ESCAPE '\\'
                               OR (m.is_sensitive = 0 AND {fold}(m.content) LIKE ?1 ESCAPE '\\'))
                    )
                 ORDER BY c.id ASC",
                fold = FOLD_FUNCTION,
                columns = CATEGORY_COLUMNS
                    .split(", ")
                    .map(|column| format!("c.{}", column))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))?;

            let rows = stmt
                .query_map(params![pattern], |row| {
                    Ok((
                        CategoryRow::from_row(row, 0)?,
                        row.get::<_, i64>(9)?,
                        row.get::<_, i64>(10)?,
                        row.get::<_, Option<String>>(11)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(category, item_count, usage_count, last_used_at)| {
                Ok(CategorySummary {
                    category: Category::try_from(category)?,
                    item_count: u64::try_from(item_count).unwrap_or(0),
                    usage_count: u64::try_from(usage_count).unwrap_or(0),
                    last_used_at: parse_optional_timestamp(last_used_at.as_deref())?,
                })
            })
            .collect()
    }
}
