//! LMDB-backed [`DocumentStore`].
//!
//! A store is opened for a (database name, container name) pair. The database
//! name selects the environment directory `<data_dir>/<database>.lmdb`, and
//! the container name selects a named LMDB database inside it. Documents are
//! stored as JSON bytes under the key produced by [`DocumentKey::encode`], so
//! a cursor walk returns them grouped by partition.

use std::fs;
use std::path::{Path, PathBuf};

use lmdb::{Cursor, Database, DatabaseFlags, Environment, Error as LmdbError, Transaction, WriteFlags};
use lmdb_sys::{MDB_cursor_op, MDB_FIRST, MDB_GET_CURRENT, MDB_NEXT, MDB_SET_RANGE};
use log::{debug, info, warn};
use serde_json::Value as JsonValue;

use crate::document_store::{ContinuationToken, DocumentKey, DocumentStore, QueryPage};
use crate::error::StoreError;
use crate::query::Query;

const MAX_DBS: u32 = 16;
const MAP_SIZE: usize = 1024 * 1024 * 1024;

pub struct LmdbStore {
    env: Environment,
    db: Database,
    path: PathBuf,
    container: String,
}

impl LmdbStore {
    /// Opens (creating if needed) the container `container_name` inside the
    /// environment `<data_dir>/<database_name>.lmdb`.
    pub fn open(
        data_dir: impl AsRef<Path>,
        database_name: &str,
        container_name: &str,
    ) -> Result<Self, StoreError> {
        if database_name.trim().is_empty() || container_name.trim().is_empty() {
            return Err(StoreError::BadRequest(
                "Database and container names cannot be empty".to_string(),
            ));
        }

        let path = data_dir.as_ref().join(format!("{database_name}.lmdb"));
        if path.exists() {
            info!("Opening existing database at: {}", path.display());
        } else {
            info!("Creating new database at: {}", path.display());
        }
        fs::create_dir_all(&path)?;

        let env = Environment::new()
            .set_max_dbs(MAX_DBS)
            .set_map_size(MAP_SIZE)
            .open(&path)
            .map_err(|e| {
                warn!("Failed to open LMDB environment at {}: {e}", path.display());
                StoreError::Database(e)
            })?;

        let db = env.create_db(Some(container_name), DatabaseFlags::empty())?;
        info!("Container '{container_name}' ready");

        Ok(Self {
            env,
            db,
            path,
            container: container_name.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Removes every document in the container and returns how many there were.
    pub fn clear_all_records(&self) -> Result<usize, StoreError> {
        let mut txn = self.env.begin_rw_txn()?;
        let count = {
            let mut cursor = txn.open_ro_cursor(self.db)?;
            match cursor_step(&cursor, None, MDB_FIRST)? {
                Some(_) => 1 + cursor.iter().count(),
                None => 0,
            }
        };
        txn.clear_db(self.db)?;
        txn.commit()?;
        info!("Cleared {count} records from '{}'", self.container);
        Ok(count)
    }

    /// Flushes the environment to disk. The handle stays usable; the
    /// environment itself is released on drop.
    pub fn close_database(&self) -> Result<(), StoreError> {
        self.env.sync(true)?;
        info!("Database at {} flushed and closed", self.path.display());
        Ok(())
    }

    fn write(
        &self,
        key: &DocumentKey,
        document: &JsonValue,
        flags: WriteFlags,
    ) -> Result<JsonValue, StoreError> {
        let raw_key = key.encode()?;
        let bytes = serde_json::to_vec(document)?;

        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.db, &raw_key, &bytes, flags).map_err(|e| match e {
            LmdbError::KeyExist => StoreError::Conflict,
            other => StoreError::Database(other),
        })?;
        txn.commit()?;

        Ok(document.clone())
    }
}

impl DocumentStore for LmdbStore {
    fn create_document(
        &self,
        key: &DocumentKey,
        document: &JsonValue,
    ) -> Result<JsonValue, StoreError> {
        debug!("create {}/{}", key.partition_key, key.id);
        self.write(key, document, WriteFlags::NO_OVERWRITE)
    }

    fn read_document(&self, key: &DocumentKey) -> Result<JsonValue, StoreError> {
        let raw_key = key.encode()?;
        let txn = self.env.begin_ro_txn()?;
        let bytes = txn.get(self.db, &raw_key).map_err(not_found)?;
        Ok(serde_json::from_slice(bytes)?)
    }

    fn upsert_document(
        &self,
        key: &DocumentKey,
        document: &JsonValue,
    ) -> Result<JsonValue, StoreError> {
        debug!("upsert {}/{}", key.partition_key, key.id);
        self.write(key, document, WriteFlags::empty())
    }

    fn delete_document(&self, key: &DocumentKey) -> Result<(), StoreError> {
        let raw_key = key.encode()?;
        let mut txn = self.env.begin_rw_txn()?;
        txn.del(self.db, &raw_key, None).map_err(not_found)?;
        txn.commit()?;
        debug!("deleted {}/{}", key.partition_key, key.id);
        Ok(())
    }

    fn query_page(
        &self,
        query: &Query,
        continuation: Option<&ContinuationToken>,
        max_items: usize,
    ) -> Result<QueryPage, StoreError> {
        let max_items = max_items.max(1);
        let txn = self.env.begin_ro_txn()?;
        let mut cursor = txn.open_ro_cursor(self.db)?;

        let mut documents = Vec::new();
        let mut last_key: Option<Vec<u8>> = None;
        let mut more = false;

        // Resume just past the token's key; the token may name a document
        // deleted since, in which case SET_RANGE lands on its successor.
        let first = match continuation {
            Some(token) => match cursor_step(&cursor, Some(&token.0), MDB_SET_RANGE)? {
                Some((key, _)) if key == token.0.as_slice() => {
                    cursor_step(&cursor, None, MDB_NEXT)?
                }
                entry => entry,
            },
            None => cursor_step(&cursor, None, MDB_FIRST)?,
        };
        let Some(first) = first else {
            return Ok(QueryPage {
                documents,
                continuation: None,
            });
        };
        let entries = std::iter::once(first).chain(cursor.iter());

        for (key, value) in entries {
            let document: JsonValue = serde_json::from_slice(value)?;
            if !query.matches(&document) {
                continue;
            }
            if documents.len() == max_items {
                more = true;
                break;
            }
            documents.push(document);
            last_key = Some(key.to_vec());
        }

        Ok(QueryPage {
            documents,
            continuation: if more {
                last_key.map(ContinuationToken)
            } else {
                None
            },
        })
    }
}

/// Positions the cursor with `op` and returns the entry under it, or `None`
/// when there is no such entry (empty database, end of data).
fn cursor_step<'txn>(
    cursor: &impl Cursor<'txn>,
    key: Option<&[u8]>,
    op: MDB_cursor_op,
) -> Result<Option<(&'txn [u8], &'txn [u8])>, StoreError> {
    match cursor.get(key, None, op) {
        Ok((Some(key), value)) => Ok(Some((key, value))),
        Ok((None, _)) => match cursor.get(None, None, MDB_GET_CURRENT) {
            Ok((Some(key), value)) => Ok(Some((key, value))),
            Ok((None, _)) | Err(LmdbError::NotFound) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        },
        Err(LmdbError::NotFound) => Ok(None),
        Err(e) => Err(StoreError::Database(e)),
    }
}

fn not_found(e: LmdbError) -> StoreError {
    match e {
        LmdbError::NotFound => StoreError::NotFound,
        other => StoreError::Database(other),
    }
}
