//! Data access for the to-do collection.
//!
//! [`TodoService`] is a thin pass-through over an injected [`DocumentStore`]
//! handle. Its only job beyond (de)serialization is translating store
//! signals into [`TodoError`] variants. No retries, no batching, and no
//! version check on update: concurrent upserts of one item are last writer wins.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::document_store::{DocumentKey, DocumentStore, QueryIterator};
use crate::error::{StoreError, TodoError};
use crate::query::{Query, SELECT_ALL};
use crate::todo_item::{TodoItem, UpdateTodo};

pub const DEFAULT_PAGE_SIZE: usize = 100;

pub struct TodoService<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    page_size: usize,
}

impl<S: DocumentStore + ?Sized> Clone for TodoService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            page_size: self.page_size,
        }
    }
}

impl<S: DocumentStore + ?Sized> TodoService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_page_size(store, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(store: Arc<S>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Inserts a new item.
    ///
    /// # Errors
    ///
    /// [`TodoError::Conflict`] if an item with the same (id, partition key)
    /// already exists; the stored item is left untouched.
    pub fn create(&self, item: TodoItem) -> Result<TodoItem, TodoError> {
        let key = key_of(&item);
        let document = serde_json::to_value(&item).map_err(StoreError::from)?;

        match self.store.create_document(&key, &document) {
            Ok(stored) => {
                info!("Created item {}", item.id);
                Ok(from_document(stored)?)
            }
            Err(StoreError::Conflict) => {
                warn!("Create rejected, item {} already exists", item.id);
                Err(TodoError::Conflict { id: item.id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns `Ok(None)` when the item does not exist.
    pub fn get(&self, id: &str, partition_key: &str) -> Result<Option<TodoItem>, TodoError> {
        match self.store.read_document(&DocumentKey::new(partition_key, id)) {
            Ok(document) => Ok(Some(from_document(document)?)),
            Err(StoreError::NotFound) => {
                debug!("Item {partition_key}/{id} not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runs `query` (or `SELECT * FROM c` when `None` or blank) and drains
    /// every page into one collection, in arrival order.
    pub fn list(&self, query: Option<&str>) -> Result<Vec<TodoItem>, TodoError> {
        let text = match query {
            Some(q) if !q.trim().is_empty() => q,
            _ => SELECT_ALL,
        };
        let query = Query::parse(text)?;

        let mut iterator = QueryIterator::new(&*self.store, query, self.page_size);
        let mut results = Vec::new();
        let mut pages = 0usize;

        while iterator.has_more_results() {
            let page = iterator.read_next()?;
            pages += 1;
            for document in page {
                results.push(from_document(document)?);
            }
        }

        debug!("Query '{text}' returned {} items in {pages} pages", results.len());
        Ok(results)
    }

    /// Inserts or replaces the item.
    ///
    /// # Errors
    ///
    /// Every store failure is reported as [`TodoError::UpdateFailed`].
    pub fn update(&self, item: TodoItem) -> Result<TodoItem, TodoError> {
        let key = key_of(&item);
        let result: Result<TodoItem, StoreError> = serde_json::to_value(&item)
            .map_err(StoreError::from)
            .and_then(|document| self.store.upsert_document(&key, &document))
            .and_then(|stored| Ok(serde_json::from_value(stored)?));

        result.map_err(|e| {
            warn!("Update of item {} failed: {e}", item.id);
            TodoError::UpdateFailed(e.to_string())
        })
    }

    /// Applies an update payload. The stored `createdDate` wins over
    /// whatever the payload carries, so only title, description and
    /// completion change for an existing item.
    pub fn save(&self, update: UpdateTodo) -> Result<TodoItem, TodoError> {
        let existing = self
            .get(&update.id, update.partition_key())
            .map_err(|e| TodoError::UpdateFailed(e.to_string()))?;
        self.update(update.into_item(existing.as_ref()))
    }

    /// Removes the item.
    ///
    /// # Errors
    ///
    /// [`TodoError::NotFound`] if it does not exist.
    pub fn delete(&self, id: &str, partition_key: &str) -> Result<(), TodoError> {
        match self.store.delete_document(&DocumentKey::new(partition_key, id)) {
            Ok(()) => {
                info!("Deleted item {id}");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(TodoError::NotFound { id: id.to_string() }),
            Err(e) => Err(e.into()),
        }
    }

    /// Flips `is_completed` and writes the item back.
    pub fn toggle(&self, id: &str, partition_key: &str) -> Result<TodoItem, TodoError> {
        let mut item = self
            .get(id, partition_key)?
            .ok_or_else(|| TodoError::NotFound { id: id.to_string() })?;
        item.is_completed = !item.is_completed;
        self.update(item)
    }
}

fn key_of(item: &TodoItem) -> DocumentKey {
    DocumentKey::new(item.partition_key.clone(), item.id.clone())
}

fn from_document(document: serde_json::Value) -> Result<TodoItem, StoreError> {
    Ok(serde_json::from_value(document)?)
}
