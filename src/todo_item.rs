//! Data model for the to-do collection.
//!
//! [`TodoItem`] is the only entity stored. It is persisted as a JSON document
//! with camelCase field names, addressed in the store by
//! (`partitionKey`, `id`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Partition used when the caller does not pick one.
pub const DEFAULT_PARTITION_KEY: &str = "default";

/// A single to-do entry.
///
/// `id` and `createdDate` are assigned once, when the item is constructed,
/// and are never changed afterwards. Title, description and completion are
/// mutated in place and written back with an upsert.
///
/// # Examples
///
/// ```rust
/// use todo_app_core::todo_item::{TodoItem, DEFAULT_PARTITION_KEY};
///
/// let item = TodoItem::new("Buy milk", "2 litres");
/// assert_eq!(item.partition_key, DEFAULT_PARTITION_KEY);
/// assert!(!item.is_completed);
///
/// let json = serde_json::to_value(&item)?;
/// assert_eq!(json["isCompleted"], false);
/// assert_eq!(json["partitionKey"], "default");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TodoItem {
    /// Unique identifier within the partition (UUID v4 by default).
    pub id: String,

    /// Grouping key for the store's physical partitioning.
    pub partition_key: String,

    pub title: String,

    pub description: String,

    pub is_completed: bool,

    /// Creation timestamp in UTC.
    pub created_date: DateTime<Utc>,
}

impl TodoItem {
    /// Builds a fresh, incomplete item in the default partition.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// Moves the item to another partition. Only meaningful before creation.
    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = partition_key.into();
        self
    }
}

impl Default for TodoItem {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            partition_key: DEFAULT_PARTITION_KEY.to_string(),
            title: String::new(),
            description: String::new(),
            is_completed: false,
            created_date: Utc::now(),
        }
    }
}

/// Payload of the "add" action.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewTodo {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub partition_key: Option<String>,
}

impl From<NewTodo> for TodoItem {
    fn from(new: NewTodo) -> Self {
        let item = TodoItem::new(new.title, new.description.unwrap_or_default());
        match new.partition_key {
            Some(pk) if !pk.trim().is_empty() => item.with_partition_key(pk),
            _ => item,
        }
    }
}

/// Payload of the "update" action.
///
/// `id` is required so that an update never mints a new item. A missing
/// `createdDate` keeps the stored one; see [`TodoService::save`].
///
/// [`TodoService::save`]: crate::todo_service::TodoService::save
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTodo {
    pub id: String,
    #[serde(default)]
    pub partition_key: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
}

impl UpdateTodo {
    pub fn partition_key(&self) -> &str {
        match self.partition_key.as_deref() {
            Some(pk) if !pk.trim().is_empty() => pk,
            _ => DEFAULT_PARTITION_KEY,
        }
    }

    /// Builds the item to write, taking `createdDate` from `existing` when
    /// the item is already stored.
    pub fn into_item(self, existing: Option<&TodoItem>) -> TodoItem {
        let partition_key = self.partition_key().to_string();
        let created_date = existing
            .map(|item| item.created_date)
            .or(self.created_date)
            .unwrap_or_else(Utc::now);
        TodoItem {
            id: self.id,
            partition_key,
            title: self.title,
            description: self.description,
            is_completed: self.is_completed,
            created_date,
        }
    }
}
