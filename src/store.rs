//! Embedded transactional store backing every partition of the ad system.
//!
//! Redb gives us exactly the isolation the ledger needs: one writer at a time,
//! any number of MVCC readers, and crash-safe commits. Each partition of the
//! data model lives in its own table inside a single database file.
//!
//! # Tables
//! - `accounts`: account id -> [`AccountRecord`](crate::ledger::AccountRecord)
//! - `ledger`: (account id, txid) -> [`LedgerEntry`](crate::ledger::LedgerEntry)
//! - `creatives`: (owner, name) -> [`Creative`](crate::campaign::Creative)
//! - `spends`: (owner, creative) -> [`Spend`](crate::campaign::Spend)
//! - `spend_index`: `"owner:creative"` -> [`Spend`](crate::campaign::Spend)
//! - `account_overrides`: account id -> 0/1
//! - `spend_overrides`: `"owner:creative"` -> override record
//! - `metrics`: account id -> [`Metrics`](crate::scoreboard::Metrics)
//! - `rooms`: room name -> 1
//! - `meta`: counters (stimulus pool, transaction sequence)
//!
//! Record values are JSON so the file stays inspectable with generic redb
//! tooling.
//!
//! # Configuration Example
//! ```yaml
//! store:
//!   path: "/data/adbot.redb"
//! ```

use std::path::Path;
use std::sync::Arc;

use redb::backends::InMemoryBackend;
use redb::{
    Database, Key, ReadOnlyTable, ReadTransaction, ReadableDatabase, Table, TableDefinition,
    Value, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub(crate) const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");
pub(crate) const LEDGER: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("ledger");
pub(crate) const CREATIVES: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("creatives");
pub(crate) const SPENDS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("spends");
pub(crate) const SPEND_INDEX: TableDefinition<&str, &[u8]> = TableDefinition::new("spend_index");
pub(crate) const ACCOUNT_OVERRIDES: TableDefinition<&str, u8> =
    TableDefinition::new("account_overrides");
pub(crate) const SPEND_OVERRIDES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("spend_overrides");
pub(crate) const METRICS: TableDefinition<&str, &[u8]> = TableDefinition::new("metrics");
pub(crate) const ROOMS: TableDefinition<&str, u8> = TableDefinition::new("rooms");
pub(crate) const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Errors raised by the storage layer. Both variants propagate unchanged to
/// callers; nothing in the crate retries.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Backend(#[from] redb::Error),
    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

macro_rules! backend_error {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(err: $ty) -> Self {
                    StoreError::Backend(redb::Error::from(err))
                }
            }
        )+
    };
}

backend_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Handle to the database file. Cheap to clone; clones share the same
/// underlying database.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open or create a store at the given path and make sure every table
    /// exists, so read transactions never observe a missing partition.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Volatile store for tests and dry runs.
    pub fn in_memory() -> Result<Self, StoreError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, StoreError> {
        let txn = db.begin_write()?;
        {
            txn.open_table(ACCOUNTS)?;
            txn.open_table(LEDGER)?;
            txn.open_table(CREATIVES)?;
            txn.open_table(SPENDS)?;
            txn.open_table(SPEND_INDEX)?;
            txn.open_table(ACCOUNT_OVERRIDES)?;
            txn.open_table(SPEND_OVERRIDES)?;
            txn.open_table(METRICS)?;
            txn.open_table(ROOMS)?;
            txn.open_table(META)?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Run `f` against a consistent snapshot.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let txn = self.db.begin_read().map_err(StoreError::from)?;
        f(&txn)
    }

    /// Run `f` inside one write transaction. The transaction commits only if
    /// `f` returns `Ok`; on `Err` it is dropped, which aborts every write `f`
    /// made.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&WriteTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let txn = self.db.begin_write().map_err(StoreError::from)?;
        let out = f(&txn)?;
        txn.commit().map_err(StoreError::from)?;
        Ok(out)
    }
}

pub(crate) fn open_write<'txn, K: Key + 'static, V: Value + 'static>(
    txn: &'txn WriteTransaction,
    def: TableDefinition<K, V>,
) -> Result<Table<'txn, K, V>, StoreError> {
    Ok(txn.open_table(def)?)
}

pub(crate) fn open_read<K: Key + 'static, V: Value + 'static>(
    txn: &ReadTransaction,
    def: TableDefinition<K, V>,
) -> Result<ReadOnlyTable<K, V>, StoreError> {
    Ok(txn.open_table(def)?)
}

/// Drop every row of a table, leaving it empty but present.
pub(crate) fn clear_table<K: Key + 'static, V: Value + 'static>(
    txn: &WriteTransaction,
    def: TableDefinition<K, V>,
) -> Result<(), StoreError> {
    txn.delete_table(def)?;
    txn.open_table(def)?;
    Ok(())
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::ReadableTable;
    use tempfile::NamedTempFile;

    #[test]
    fn write_commits_on_ok() {
        let store = Store::in_memory().unwrap();
        store
            .write(|txn| {
                let mut rooms = open_write(txn, ROOMS)?;
                rooms.insert("lobby", 1u8)?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let found = store
            .read(|txn| {
                let rooms = open_read(txn, ROOMS)?;
                Ok::<_, StoreError>(rooms.get("lobby")?.is_some())
            })
            .unwrap();
        assert!(found);
    }

    #[test]
    fn write_aborts_on_err() {
        let store = Store::in_memory().unwrap();
        let res: Result<(), StoreError> = store.write(|txn| {
            let mut rooms = open_write(txn, ROOMS)?;
            rooms.insert("lobby", 1u8)?;
            Err(StoreError::Codec(
                serde_json::from_str::<u8>("not json").unwrap_err(),
            ))
        });
        assert!(res.is_err());

        let found = store
            .read(|txn| {
                let rooms = open_read(txn, ROOMS)?;
                Ok::<_, StoreError>(rooms.get("lobby")?.is_some())
            })
            .unwrap();
        assert!(!found, "aborted write must not be visible");
    }

    #[test]
    fn clear_table_keeps_table_readable() {
        let store = Store::in_memory().unwrap();
        store
            .write(|txn| {
                open_write(txn, ROOMS)?.insert("a", 1u8)?;
                clear_table(txn, ROOMS)
            })
            .unwrap();
        let count = store
            .read(|txn| {
                let rooms = open_read(txn, ROOMS)?;
                Ok::<_, StoreError>(rooms.iter()?.count())
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn on_disk_store_reopens() {
        let file = NamedTempFile::new().unwrap();
        {
            let store = Store::open(file.path()).unwrap();
            store
                .write(|txn| {
                    open_write(txn, META)?.insert("k", 7u64)?;
                    Ok::<_, StoreError>(())
                })
                .unwrap();
        }
        let store = Store::open(file.path()).unwrap();
        let value = store
            .read(|txn| {
                let meta = open_read(txn, META)?;
                Ok::<_, StoreError>(meta.get("k")?.map(|v| v.value()))
            })
            .unwrap();
        assert_eq!(value, Some(7));
    }
}
