use chrono::{DateTime, Utc};
use redb::{Database as RedbDatabase, ReadTransaction, ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("Deserialization error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Serialization error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Redb(#[from] redb::Error),
    #[error("Database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),
    #[error("Secret already exists")]
    SecretConflict,
    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
}

/// Handle to the embedded store. Cheap to clone; clones share one redb file.
#[derive(Clone)]
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("punchlist-links.redb");
        let db = RedbDatabase::create(db_path)?;

        // Create tables up front so read transactions never see a missing table
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CAPABILITY_TOKENS)?;
            let _ = write_txn.open_table(TOKEN_SECRETS)?;
            let _ = write_txn.open_table(SUBJECT_TOKENS)?;
            let _ = write_txn.open_table(TOKEN_EXPIRY)?;
            let _ = write_txn.open_table(ACCESS_EVENTS)?;
            let _ = write_txn.open_table(TOKEN_EVENTS)?;
            let _ = write_txn.open_table(SUBJECT_EVENTS)?;
            let _ = write_txn.open_table(LINK_META)?;
            let _ = write_txn.open_table(ROOMS)?;
            let _ = write_txn.open_table(TASKS)?;
            let _ = write_txn.open_table(PHOTOS)?;
            let _ = write_txn.open_table(ROOM_TASKS)?;
            let _ = write_txn.open_table(TASK_PHOTOS)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }
}

pub(super) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, DatabaseError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

pub(super) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DatabaseError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Allocate the next surrogate id for `counter` inside the caller's transaction.
pub(super) fn next_id(txn: &WriteTransaction, counter: &str) -> Result<u64, DatabaseError> {
    let mut table = txn.open_table(LINK_META)?;
    let next = table.get(counter)?.map(|v| v.value()).unwrap_or(0) + 1;
    table.insert(counter, next)?;
    Ok(next)
}

/// Expiration index key. Zero-padded millis sort lexicographically in time order.
pub(super) fn expiry_key(expires_at: &DateTime<Utc>, token_id: u64) -> String {
    let ms = expires_at.timestamp_millis().max(0);
    format!("{ms:020}:{token_id:020}")
}

/// Extract the millisecond timestamp from an expiration index key
pub(super) fn expiry_key_ms(key: &str) -> Option<i64> {
    key.split(':').next()?.parse().ok()
}

/// Ordered key within one token's events
pub(super) fn token_event_key(token_id: u64, event_id: u64) -> String {
    format!("{token_id:020}:{event_id:020}")
}

/// Ordered key within one subject's events
pub(super) fn subject_event_key(subject: &str, created_at: &DateTime<Utc>, event_id: u64) -> String {
    let ms = created_at.timestamp_millis().max(0);
    format!("{subject}:{ms:020}:{event_id:020}")
}

/// Read a msgpack-encoded id list, treating a missing entry as empty.
pub(super) fn decode_ids(bytes: Option<&[u8]>) -> Result<Vec<u64>, DatabaseError> {
    match bytes {
        Some(b) => decode(b),
        None => Ok(Vec::new()),
    }
}
