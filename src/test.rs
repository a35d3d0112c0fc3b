//! # Store and Service Test Suite
//!
//! Covers the LMDB document store and the to-do service on top of it.
//!
//! ## Test Categories
//!
//! ### 1. Service CRUD
//! - create / get / list / update / delete / toggle against a real LMDB container
//! - Conflict on duplicate create leaves the stored item untouched
//! - Missing items: `get` returns `None`, `delete` and `toggle` return NotFound
//!
//! ### 2. Queries and Paging
//! - Every item comes back exactly once for any page size
//! - WHERE clauses filter, bad queries are rejected
//!
//! ### 3. Store Behaviour
//! - Partition isolation, key validation, clearing, persistence across reopen
//! - Store failures on upsert surface as UpdateFailed
//!
//! ### 4. Concurrency
//! - Parallel readers and last-writer-wins upserts
//!
//! Each test opens its own container inside a [`tempfile::TempDir`], so no
//! artifacts are left behind.

#[cfg(test)]
pub mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use log::info;
    use serde_json::{json, Value as JsonValue};
    use tempfile::TempDir;

    use crate::app_response::AppResponse;
    use crate::document_store::{
        ContinuationToken, DocumentKey, DocumentStore, QueryIterator, QueryPage,
    };
    use crate::error::{StoreError, TodoError};
    use crate::lmdb_store::LmdbStore;
    use crate::query::Query;
    use crate::todo_item::{NewTodo, TodoItem, UpdateTodo, DEFAULT_PARTITION_KEY};
    use crate::todo_service::TodoService;

    // Helper function to create a service over a fresh container
    fn open_service(page_size: usize) -> (TodoService<LmdbStore>, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let store = LmdbStore::open(dir.path(), "todos_test", "items").expect("open store");
        (TodoService::with_page_size(Arc::new(store), page_size), dir)
    }

    fn create_test_item(title: &str) -> TodoItem {
        TodoItem::new(title, format!("description of {title}"))
    }

    /// Store whose writes always fail, for the update error path.
    struct ReadOnlyStore;

    impl DocumentStore for ReadOnlyStore {
        fn create_document(&self, _: &DocumentKey, _: &JsonValue) -> Result<JsonValue, StoreError> {
            Err(StoreError::Database(lmdb::Error::ReadersFull))
        }

        fn read_document(&self, _: &DocumentKey) -> Result<JsonValue, StoreError> {
            Err(StoreError::NotFound)
        }

        fn upsert_document(&self, _: &DocumentKey, _: &JsonValue) -> Result<JsonValue, StoreError> {
            Err(StoreError::Database(lmdb::Error::MapFull))
        }

        fn delete_document(&self, _: &DocumentKey) -> Result<(), StoreError> {
            Err(StoreError::NotFound)
        }

        fn query_page(
            &self,
            _: &Query,
            _: Option<&ContinuationToken>,
            _: usize,
        ) -> Result<QueryPage, StoreError> {
            Ok(QueryPage::default())
        }
    }

    // ===============================
    // SERVICE CRUD
    // ===============================

    #[test]
    fn test_create_then_get() {
        let (todos, _dir) = open_service(10);
        let item = create_test_item("write report");

        let created = todos.create(item.clone()).unwrap();
        assert_eq!(created, item);

        let stored = todos.get(&item.id, &item.partition_key).unwrap().unwrap();
        assert_eq!(stored, item);
        assert_eq!(stored.partition_key, DEFAULT_PARTITION_KEY);
    }

    #[test]
    fn test_duplicate_create_conflicts_without_overwriting() {
        let (todos, _dir) = open_service(10);
        let original = create_test_item("original");
        todos.create(original.clone()).unwrap();

        let mut duplicate = original.clone();
        duplicate.title = "impostor".to_string();
        duplicate.is_completed = true;

        match todos.create(duplicate) {
            Err(TodoError::Conflict { id }) => assert_eq!(id, original.id),
            other => panic!("expected conflict, got {other:?}"),
        }

        let stored = todos.get(&original.id, &original.partition_key).unwrap().unwrap();
        assert_eq!(stored.title, "original");
        assert!(!stored.is_completed);
    }

    #[test]
    fn test_conflict_message() {
        let (todos, _dir) = open_service(10);
        let item = create_test_item("once");
        todos.create(item.clone()).unwrap();

        let err = todos.create(item.clone()).unwrap_err();
        assert_eq!(err.to_string(), format!("Item with id {} already exists", item.id));
    }

    #[test]
    fn test_get_missing_is_none() {
        let (todos, _dir) = open_service(10);
        assert!(todos.get("nonexistent", DEFAULT_PARTITION_KEY).unwrap().is_none());
    }

    #[test]
    fn test_same_id_in_other_partition_is_distinct() {
        let (todos, _dir) = open_service(10);
        let home = create_test_item("home").with_partition_key("home");
        let mut work = create_test_item("work").with_partition_key("work");
        work.id = home.id.clone();

        todos.create(home.clone()).unwrap();
        todos.create(work.clone()).unwrap();

        assert_eq!(todos.get(&home.id, "home").unwrap().unwrap().title, "home");
        assert_eq!(todos.get(&home.id, "work").unwrap().unwrap().title, "work");
        assert!(todos.get(&home.id, DEFAULT_PARTITION_KEY).unwrap().is_none());
    }

    #[test]
    fn test_update_is_visible_on_get() {
        let (todos, _dir) = open_service(10);
        let mut item = todos.create(create_test_item("finish me")).unwrap();

        item.is_completed = true;
        item.description = "done".to_string();
        let updated = todos.update(item.clone()).unwrap();
        assert_eq!(updated, item);

        let stored = todos.get(&item.id, &item.partition_key).unwrap().unwrap();
        assert!(stored.is_completed);
        assert_eq!(stored.description, "done");
        assert_eq!(stored.created_date, item.created_date);
    }

    #[test]
    fn test_update_inserts_when_missing() {
        let (todos, _dir) = open_service(10);
        let item = create_test_item("upserted");

        todos.update(item.clone()).unwrap();
        assert_eq!(todos.get(&item.id, &item.partition_key).unwrap(), Some(item));
    }

    #[test]
    fn test_save_keeps_created_date() {
        let (todos, _dir) = open_service(10);
        let item = todos.create(create_test_item("dated")).unwrap();

        let saved = todos
            .save(UpdateTodo {
                id: item.id.clone(),
                partition_key: None,
                title: "renamed".to_string(),
                description: String::new(),
                is_completed: true,
                created_date: None,
            })
            .unwrap();
        assert_eq!(saved.created_date, item.created_date);

        let stored = todos.get(&item.id, &item.partition_key).unwrap().unwrap();
        assert_eq!(stored.title, "renamed");
        assert_eq!(stored.created_date, item.created_date);
    }

    #[test]
    fn test_update_failure_is_reported_as_update_failed() {
        let todos = TodoService::new(Arc::new(ReadOnlyStore));

        match todos.update(create_test_item("nope")) {
            Err(TodoError::UpdateFailed(msg)) => assert!(msg.contains("Database error")),
            other => panic!("expected UpdateFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_update_rejects_empty_id() {
        let (todos, _dir) = open_service(10);
        let mut item = create_test_item("no id");
        item.id = String::new();

        let err = todos.update(item).unwrap_err();
        assert!(matches!(err, TodoError::UpdateFailed(_)));
        assert!(err.to_string().starts_with("Failed to update item:"));
    }

    #[test]
    fn test_delete_removes_from_get_and_list() {
        let (todos, _dir) = open_service(10);
        let keep = todos.create(create_test_item("keep")).unwrap();
        let gone = todos.create(create_test_item("gone")).unwrap();

        todos.delete(&gone.id, &gone.partition_key).unwrap();

        assert!(todos.get(&gone.id, &gone.partition_key).unwrap().is_none());
        let remaining = todos.list(None).unwrap();
        assert_eq!(remaining, vec![keep]);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let (todos, _dir) = open_service(10);
        match todos.delete("ghost", DEFAULT_PARTITION_KEY) {
            Err(TodoError::NotFound { id }) => assert_eq!(id, "ghost"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_toggle_flips_completion() {
        let (todos, _dir) = open_service(10);
        let item = todos.create(create_test_item("toggle")).unwrap();

        assert!(todos.toggle(&item.id, &item.partition_key).unwrap().is_completed);
        assert!(!todos.toggle(&item.id, &item.partition_key).unwrap().is_completed);
        assert!(matches!(
            todos.toggle("missing", DEFAULT_PARTITION_KEY),
            Err(TodoError::NotFound { .. })
        ));
    }

    #[test]
    fn test_new_todo_conversion() {
        let item = TodoItem::from(NewTodo {
            title: "From form".to_string(),
            description: None,
            partition_key: Some("  ".to_string()),
        });
        assert_eq!(item.partition_key, DEFAULT_PARTITION_KEY);
        assert_eq!(item.description, "");
        assert!(uuid::Uuid::parse_str(&item.id).is_ok());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let item: TodoItem = serde_json::from_value(json!({"id": "legacy", "title": "old"})).unwrap();
        assert_eq!(item.id, "legacy");
        assert_eq!(item.partition_key, DEFAULT_PARTITION_KEY);
        assert!(!item.is_completed);
    }

    // ===============================
    // QUERIES AND PAGING
    // ===============================

    #[test]
    fn test_list_returns_every_item_once_for_any_page_size() {
        for page_size in [1, 2, 3, 7, 100] {
            let (todos, _dir) = open_service(page_size);
            let mut expected = HashSet::new();
            for i in 0..10 {
                let item = todos.create(create_test_item(&format!("item {i}"))).unwrap();
                expected.insert(item.id);
            }

            let listed = todos.list(None).unwrap();
            assert_eq!(listed.len(), 10, "page size {page_size}");
            let ids: HashSet<String> = listed.into_iter().map(|i| i.id).collect();
            assert_eq!(ids, expected, "page size {page_size}");
        }
    }

    #[test]
    fn test_list_empty_container() {
        let (todos, _dir) = open_service(3);
        assert!(todos.list(None).unwrap().is_empty());
        assert!(todos.list(Some("   ")).unwrap().is_empty());
    }

    #[test]
    fn test_list_after_deleting_everything() {
        let (todos, _dir) = open_service(2);
        let items: Vec<TodoItem> = (0..3)
            .map(|i| todos.create(create_test_item(&format!("temp {i}"))).unwrap())
            .collect();
        for item in &items {
            todos.delete(&item.id, &item.partition_key).unwrap();
        }

        assert!(todos.list(None).unwrap().is_empty());
        assert!(todos
            .list(Some("SELECT * FROM c WHERE c.isCompleted = false"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_list_with_filter_query() {
        let (todos, _dir) = open_service(2);
        for i in 0..6 {
            let mut item = create_test_item(&format!("task {i}"));
            item.is_completed = i % 2 == 0;
            todos.create(item).unwrap();
        }

        let done = todos
            .list(Some("SELECT * FROM c WHERE c.isCompleted = true"))
            .unwrap();
        assert_eq!(done.len(), 3);
        assert!(done.iter().all(|i| i.is_completed));

        let titled = todos
            .list(Some("SELECT * FROM c WHERE c.title = 'task 1' AND c.isCompleted = false"))
            .unwrap();
        assert_eq!(titled.len(), 1);
        assert_eq!(titled[0].title, "task 1");
    }

    #[test]
    fn test_list_rejects_bad_query() {
        let (todos, _dir) = open_service(2);
        let err = todos.list(Some("SELECT title FROM c")).unwrap_err();
        assert!(matches!(err, TodoError::Store(StoreError::BadRequest(_))));
    }

    #[test]
    fn test_query_iterator_pages() {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open(dir.path(), "paging", "items").unwrap();
        for i in 0..5 {
            let key = DocumentKey::new("p", format!("{i}"));
            store.create_document(&key, &json!({"n": i})).unwrap();
        }

        let mut iterator = QueryIterator::new(&store, Query::all(), 2);
        let mut sizes = Vec::new();
        while iterator.has_more_results() {
            sizes.push(iterator.read_next().unwrap().len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(iterator.read_next().unwrap().is_empty());
    }

    #[test]
    fn test_exact_page_boundary_has_no_empty_trailing_page() {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open(dir.path(), "boundary", "items").unwrap();
        for i in 0..4 {
            store
                .create_document(&DocumentKey::new("p", format!("{i}")), &json!({"n": i}))
                .unwrap();
        }

        let first = store.query_page(&Query::all(), None, 2).unwrap();
        assert_eq!(first.documents.len(), 2);
        let token = first.continuation.expect("more pages");

        let second = store.query_page(&Query::all(), Some(&token), 2).unwrap();
        assert_eq!(second.documents.len(), 2);
        assert!(second.continuation.is_none());
    }

    #[test]
    fn test_continuation_survives_deleted_key() {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open(dir.path(), "resume", "items").unwrap();
        for i in 0..4 {
            store
                .create_document(&DocumentKey::new("p", format!("{i}")), &json!({"n": i}))
                .unwrap();
        }

        let first = store.query_page(&Query::all(), None, 2).unwrap();
        let token = first.continuation.expect("more pages");
        assert_eq!(token.0, b"p\01".to_vec());

        // The key the token points at is gone; paging resumes at its successor.
        store.delete_document(&DocumentKey::new("p", "1")).unwrap();
        let second = store.query_page(&Query::all(), Some(&token), 2).unwrap();
        assert_eq!(second.documents, vec![json!({"n": 2}), json!({"n": 3})]);
        assert!(second.continuation.is_none());

        // A token past the last key yields an empty page, not a restart.
        let past_end = ContinuationToken(b"q".to_vec());
        let page = store.query_page(&Query::all(), Some(&past_end), 2).unwrap();
        assert!(page.documents.is_empty());
        assert!(page.continuation.is_none());
    }

    // ===============================
    // STORE BEHAVIOUR
    // ===============================

    #[test]
    fn test_store_signals() {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open(dir.path(), "signals", "items").unwrap();
        let key = DocumentKey::new("p", "1");

        assert!(matches!(store.read_document(&key), Err(StoreError::NotFound)));
        assert!(matches!(store.delete_document(&key), Err(StoreError::NotFound)));

        store.create_document(&key, &json!({"v": 1})).unwrap();
        assert!(matches!(
            store.create_document(&key, &json!({"v": 2})),
            Err(StoreError::Conflict)
        ));
        assert_eq!(store.read_document(&key).unwrap(), json!({"v": 1}));

        store.upsert_document(&key, &json!({"v": 3})).unwrap();
        assert_eq!(store.read_document(&key).unwrap(), json!({"v": 3}));
    }

    #[test]
    fn test_key_validation() {
        for key in [
            DocumentKey::new("", "id"),
            DocumentKey::new("pk", ""),
            DocumentKey::new("pk", "a\0b"),
        ] {
            assert!(matches!(key.encode(), Err(StoreError::BadRequest(_))));
        }
        assert_eq!(DocumentKey::new("pk", "id").encode().unwrap(), b"pk\0id".to_vec());
    }

    #[test]
    fn test_open_rejects_blank_names() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            LmdbStore::open(dir.path(), " ", "items"),
            Err(StoreError::BadRequest(_))
        ));
        assert!(matches!(
            LmdbStore::open(dir.path(), "todos", ""),
            Err(StoreError::BadRequest(_))
        ));
    }

    #[test]
    fn test_clear_all_records() {
        let (todos, _dir) = open_service(10);
        for i in 0..3 {
            todos.create(create_test_item(&format!("clear {i}"))).unwrap();
        }

        assert_eq!(todos.store().clear_all_records().unwrap(), 3);
        assert!(todos.list(None).unwrap().is_empty());
        assert_eq!(todos.store().clear_all_records().unwrap(), 0);
    }

    #[test]
    fn test_data_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let item = create_test_item("persistent");

        {
            let store = LmdbStore::open(dir.path(), "restart", "items").unwrap();
            let todos = TodoService::new(Arc::new(store));
            todos.create(item.clone()).unwrap();
            todos.store().close_database().unwrap();
        }

        let store = LmdbStore::open(dir.path(), "restart", "items").unwrap();
        assert!(store.path().ends_with("restart.lmdb"));
        let todos = TodoService::new(Arc::new(store));
        assert_eq!(todos.get(&item.id, &item.partition_key).unwrap(), Some(item));
    }

    #[test]
    fn test_containers_are_isolated() {
        let dir = TempDir::new().unwrap();
        let item = create_test_item("isolated");

        let first = LmdbStore::open(dir.path(), "shared", "first").unwrap();
        TodoService::new(Arc::new(first)).create(item.clone()).unwrap();

        let second = LmdbStore::open(dir.path(), "shared", "second").unwrap();
        assert_eq!(second.container(), "second");
        let todos = TodoService::new(Arc::new(second));
        assert!(todos.get(&item.id, &item.partition_key).unwrap().is_none());
    }

    // ===============================
    // CONCURRENCY
    // ===============================

    #[test]
    fn test_concurrent_reads() {
        let (todos, _dir) = open_service(4);
        let item = todos.create(create_test_item("shared")).unwrap();
        for i in 0..9 {
            todos.create(create_test_item(&format!("filler {i}"))).unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let todos = todos.clone();
                let item = item.clone();
                thread::spawn(move || {
                    let found = todos.get(&item.id, &item.partition_key).unwrap();
                    assert_eq!(found, Some(item));
                    todos.list(None).unwrap().len()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 10);
        }
    }

    #[test]
    fn test_concurrent_upserts_last_writer_wins() {
        let (todos, _dir) = open_service(10);
        let item = todos.create(create_test_item("contended")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let todos = todos.clone();
                let mut copy = item.clone();
                thread::spawn(move || {
                    copy.title = format!("writer {n}");
                    todos.update(copy).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = todos.get(&item.id, &item.partition_key).unwrap().unwrap();
        info!("Final title after contention: {}", stored.title);
        assert!(stored.title.starts_with("writer "));
        assert_eq!(todos.list(None).unwrap().len(), 1);
    }

    // ===============================
    // RESPONSES
    // ===============================

    #[test]
    fn test_app_response_display_and_status() {
        let missing = AppResponse::from(TodoError::NotFound { id: "42".to_string() });
        assert_eq!(missing.to_string(), "Not found: Item with id 42 not found");
        assert_eq!(missing.status(), axum::http::StatusCode::NOT_FOUND);

        let bad = AppResponse::from(StoreError::BadRequest("Invalid query: x".to_string()));
        assert_eq!(bad.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(bad.to_string().starts_with("Bad Request: "));

        assert_eq!(AppResponse::success("done").to_string(), "Ok: done");
    }
}
