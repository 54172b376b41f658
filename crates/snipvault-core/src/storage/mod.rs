//! Structured storage and the data access layer

mod categories;
mod codec;
mod database;
mod history;
mod items;
mod lists;
pub mod migrations;
mod models;
pub(crate) mod row;
mod store;
mod tags;

#[cfg(test)]
pub(crate) mod test_support;

pub use database::Database;
pub use models::{
    Category, CategorySummary, CategoryUpdate, ClipboardEntry, Item, ItemList, ItemPlaceholder,
    ItemType, ItemUpdate, ListStep, LoadedItem, NewCategory, NewItem, NewList, Tag, TagGroup,
};
pub use store::{CacheInvalidator, KeyCheck, Store, DEFAULT_HISTORY_LIMIT};
pub use tags::normalize_tags;
