//! Content encoding between callers and the items table
//!
//! Every write calls [`encode_content`] before the statement is built and
//! every read calls [`decode_item`] after the row is loaded. Sensitive
//! content is sealed with the context's key; everything else is stored as
//! UTF-8 bytes.

use tracing::warn;

use super::models::{Item, LoadedItem};
use super::row::{parse_optional_timestamp, parse_timestamp, ItemRow};
use crate::context::AuthContext;
use crate::crypto::{decrypt_to_string, encrypt, KeyMaterial};
use crate::error::{Result, VaultError};

/// Encode plaintext for storage
///
/// Needs key material only when `sensitive` is set.
pub(crate) fn encode_content(content: &str, sensitive: bool, ctx: &AuthContext) -> Result<Vec<u8>> {
    if sensitive {
        seal(content, ctx.key()?)
    } else {
        Ok(content.as_bytes().to_vec())
    }
}

pub(crate) fn seal(content: &str, key: &KeyMaterial) -> Result<Vec<u8>> {
    encrypt(content.as_bytes(), key)
}

/// Recover plaintext from a stored content column
pub(crate) fn decode_content(stored: &[u8], sensitive: bool, key: Option<&KeyMaterial>) -> Result<String> {
    if sensitive {
        let key = key.ok_or(VaultError::VaultLocked)?;
        decrypt_to_string(stored, key)
    } else {
        String::from_utf8(stored.to_vec())
            .map_err(|e| VaultError::Storage(format!("Item content is not UTF-8: {}", e)))
    }
}

/// Materialize one item row
///
/// Never fails because of the content column: an undecryptable row becomes
/// `Corrupted`, a sensitive row without key material becomes `Locked`.
pub(crate) fn decode_item(row: ItemRow, tags: Vec<String>, ctx: &AuthContext) -> Result<LoadedItem> {
    let key = if row.is_sensitive {
        match ctx.key() {
            Ok(key) => Some(key),
            Err(_) => return Ok(LoadedItem::Locked(row.placeholder())),
        }
    } else {
        None
    };

    let content = match decode_content(&row.content, row.is_sensitive, key) {
        Ok(content) => content,
        Err(e) => {
            warn!(
                "Item {} in category {} could not be decoded: {}",
                row.id, row.category_id, e
            );
            return Ok(LoadedItem::Corrupted(row.placeholder()));
        }
    };

    let use_count = row.use_count();
    Ok(LoadedItem::Ready(Item {
        id: row.id,
        category_id: row.category_id,
        label: row.label,
        content,
        item_type: row
            .item_type
            .parse()
            .map_err(|_| VaultError::Storage(format!("Unknown item type '{}'", row.item_type)))?,
        is_sensitive: row.is_sensitive,
        is_favorite: row.is_favorite,
        description: row.description,
        use_count,
        last_used_at: parse_optional_timestamp(row.last_used_at.as_deref())?,
        tags,
        list_id: row.list_id,
        list_position: row.list_position,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    }))
}
