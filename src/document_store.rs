//! The document store seam.
//!
//! A [`DocumentStore`] holds JSON documents in one container, addressed by
//! [`DocumentKey`]. Implementations report duplicate keys and missing keys
//! as [`StoreError::Conflict`] and [`StoreError::NotFound`], and answer
//! queries one page at a time through [`DocumentStore::query_page`].
//! [`QueryIterator`] drives that paging for callers.

use serde_json::Value as JsonValue;

use crate::error::StoreError;
use crate::query::Query;

/// Address of a document: partition key plus id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub partition_key: String,
    pub id: String,
}

impl DocumentKey {
    pub fn new(partition_key: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            id: id.into(),
        }
    }

    /// Storage key bytes: `partition_key \0 id`.
    ///
    /// Neither part may be empty or contain NUL.
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        for (name, part) in [("partition key", &self.partition_key), ("id", &self.id)] {
            if part.is_empty() {
                return Err(StoreError::BadRequest(format!("Document {name} cannot be empty")));
            }
            if part.contains('\0') {
                return Err(StoreError::BadRequest(format!(
                    "Document {name} cannot contain NUL"
                )));
            }
        }

        let mut key = Vec::with_capacity(self.partition_key.len() + self.id.len() + 1);
        key.extend_from_slice(self.partition_key.as_bytes());
        key.push(0);
        key.extend_from_slice(self.id.as_bytes());
        Ok(key)
    }
}

/// Opaque resume position of a paged query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(pub Vec<u8>);

/// One page of query results.
#[derive(Debug, Default)]
pub struct QueryPage {
    pub documents: Vec<JsonValue>,
    /// `None` once the query is exhausted.
    pub continuation: Option<ContinuationToken>,
}

pub trait DocumentStore: Send + Sync {
    /// Inserts a new document. Fails with [`StoreError::Conflict`] if the key is taken.
    fn create_document(&self, key: &DocumentKey, document: &JsonValue)
        -> Result<JsonValue, StoreError>;

    /// Reads a document. Fails with [`StoreError::NotFound`] if absent.
    fn read_document(&self, key: &DocumentKey) -> Result<JsonValue, StoreError>;

    /// Inserts or replaces a document.
    fn upsert_document(&self, key: &DocumentKey, document: &JsonValue)
        -> Result<JsonValue, StoreError>;

    /// Removes a document. Fails with [`StoreError::NotFound`] if absent.
    fn delete_document(&self, key: &DocumentKey) -> Result<(), StoreError>;

    /// Returns at most `max_items` matches after `continuation`.
    fn query_page(
        &self,
        query: &Query,
        continuation: Option<&ContinuationToken>,
        max_items: usize,
    ) -> Result<QueryPage, StoreError>;
}

/// Paged cursor over a query.
///
/// ```no_run
/// # use todo_app_core::document_store::{DocumentStore, QueryIterator};
/// # use todo_app_core::query::Query;
/// # fn drain(store: &dyn DocumentStore) -> Result<(), todo_app_core::error::StoreError> {
/// let mut iterator = QueryIterator::new(store, Query::all(), 50);
/// while iterator.has_more_results() {
///     for document in iterator.read_next()? {
///         println!("{document}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct QueryIterator<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    query: Query,
    page_size: usize,
    continuation: Option<ContinuationToken>,
    exhausted: bool,
}

impl<'a, S: DocumentStore + ?Sized> QueryIterator<'a, S> {
    /// A `page_size` of zero is treated as one.
    pub fn new(store: &'a S, query: Query, page_size: usize) -> Self {
        Self {
            store,
            query,
            page_size: page_size.max(1),
            continuation: None,
            exhausted: false,
        }
    }

    pub fn has_more_results(&self) -> bool {
        !self.exhausted
    }

    /// Fetches the next page. Returns an empty page once exhausted.
    pub fn read_next(&mut self) -> Result<Vec<JsonValue>, StoreError> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let page = self
            .store
            .query_page(&self.query, self.continuation.as_ref(), self.page_size)?;

        self.exhausted = page.continuation.is_none();
        self.continuation = page.continuation;
        Ok(page.documents)
    }
}
