//! Storage facade
//!
//! The only entry point callers use: `connect`, then `add`, `get_by_key`,
//! `delete_by_key` and `get_all_by_index` against the returned handle.
//! Nothing is cached here; every call goes straight to storage.

use serde_json::Value;

use tome_storage::transaction::{self, Add, DeleteByKey, GetAllByIndex, GetByKey};
use tome_storage::{
    ConnectionError, ConnectionHandle, PrimaryKey, Record, SchemaManager, StoreDefinition,
    TransactionError, TransactionMode,
};

use crate::config::Config;

pub struct Storage {
    schema: SchemaManager,
}

impl Storage {
    pub fn new(config: &Config) -> Self {
        tracing::debug!(
            data_dir = %config.data_dir.display(),
            busy_timeout_ms = config.busy_timeout_ms,
            "Storage initialized"
        );

        Self {
            schema: SchemaManager::new(&config.data_dir, config.busy_timeout()),
        }
    }

    /// Open `db_name`, creating `store_name` with one index per entry of
    /// `indexes` when `version` is ahead of the stored version.
    pub async fn connect<I, S>(
        &self,
        db_name: &str,
        store_name: &str,
        indexes: I,
        version: Option<u32>,
    ) -> Result<ConnectionHandle, ConnectionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = StoreDefinition::new(store_name).with_indexes(indexes);
        self.schema.open(db_name, store, version).await
    }

    /// Insert `record`, resolving with the primary key assigned to it.
    pub async fn add(
        &self,
        handle: &ConnectionHandle,
        store_name: &str,
        record: Record,
    ) -> Result<PrimaryKey, TransactionError> {
        transaction::run(handle, store_name, TransactionMode::ReadWrite, Add(record)).await
    }

    /// `Ok(None)` when no record has `key`.
    pub async fn get_by_key(
        &self,
        handle: &ConnectionHandle,
        store_name: &str,
        key: PrimaryKey,
    ) -> Result<Option<Record>, TransactionError> {
        transaction::run(handle, store_name, TransactionMode::ReadOnly, GetByKey(key)).await
    }

    pub async fn delete_by_key(
        &self,
        handle: &ConnectionHandle,
        store_name: &str,
        key: PrimaryKey,
    ) -> Result<(), TransactionError> {
        transaction::run(handle, store_name, TransactionMode::ReadWrite, DeleteByKey(key)).await
    }

    pub async fn get_all_by_index(
        &self,
        handle: &ConnectionHandle,
        store_name: &str,
        index: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<Record>, TransactionError> {
        let request = GetAllByIndex {
            index: index.to_string(),
            value: value.into(),
        };
        transaction::run(handle, store_name, TransactionMode::ReadOnly, request).await
    }

    pub fn close(&self, handle: ConnectionHandle) {
        handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tome_storage::ConnectionState;

    fn storage(dir: &TempDir) -> Storage {
        Storage::new(&Config::new(dir.path().to_path_buf()))
    }

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[tokio::test]
    async fn test_library_scenario() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let db = storage
            .connect("lib", "books", ["author"], Some(1))
            .await
            .unwrap();

        let key = storage
            .add(&db, "books", record(json!({"title": "A", "author": "X"})))
            .await
            .unwrap();
        assert_eq!(key, 1);

        let found = storage.get_by_key(&db, "books", 1).await.unwrap();
        assert_eq!(found, Some(record(json!({"id": 1, "title": "A", "author": "X"}))));

        storage.delete_by_key(&db, "books", 1).await.unwrap();
        assert_eq!(storage.get_by_key(&db, "books", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_adds() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let db = storage
            .connect("lib", "books", ["author"], Some(1))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            storage.add(&db, "books", record(json!({"title": "A", "author": "X"}))),
            storage.add(&db, "books", record(json!({"title": "B", "author": "Y"})))
        );
        let mut keys = vec![a.unwrap(), b.unwrap()];
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 2]);

        for key in keys {
            assert!(storage.get_by_key(&db, "books", key).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_version_raise_preserves_records() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let db = storage
            .connect("lib", "books", ["author"], Some(1))
            .await
            .unwrap();
        let key = storage
            .add(&db, "books", record(json!({"title": "A", "author": "X", "year": 1999})))
            .await
            .unwrap();
        storage.close(db);

        let db = storage
            .connect("lib", "books", ["author", "year"], Some(2))
            .await
            .unwrap();
        assert_eq!(db.version(), 2);

        let found = storage.get_by_key(&db, "books", key).await.unwrap().unwrap();
        assert_eq!(found.get("title"), Some(&json!("A")));

        // The new index covers records written before it existed
        let by_year = storage
            .get_all_by_index(&db, "books", "year", 1999)
            .await
            .unwrap();
        assert_eq!(by_year, vec![found]);
        storage.close(db);

        let db = storage
            .connect("lib", "shelves", Vec::<String>::new(), Some(3))
            .await
            .unwrap();
        assert_eq!(db.store_names(), vec!["books", "shelves"]);
        assert!(storage.get_by_key(&db, "books", key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_index_lookup() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let db = storage
            .connect("lib", "books", ["author"], None)
            .await
            .unwrap();

        for (title, author) in [("A", "X"), ("B", "Y"), ("C", "X")] {
            storage
                .add(&db, "books", record(json!({"title": title, "author": author})))
                .await
                .unwrap();
        }

        let by_x = storage
            .get_all_by_index(&db, "books", "author", "X")
            .await
            .unwrap();
        let keys: Vec<_> = by_x.iter().map(|r| r.key("id").unwrap().unwrap()).collect();
        assert_eq!(keys, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_errors_are_surfaced() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let db = storage
            .connect("lib", "books", ["author"], Some(2))
            .await
            .unwrap();

        assert!(matches!(
            storage.add(&db, "authors", Record::new()).await,
            Err(TransactionError::StoreNotFound(_))
        ));
        assert!(matches!(
            storage.connect("lib", "books", ["author"], Some(3)).await,
            Err(ConnectionError::Blocked { .. })
        ));

        storage.close(db);
        assert!(matches!(
            storage.connect("lib", "books", ["author"], Some(1)).await,
            Err(ConnectionError::VersionTooLow { .. })
        ));
    }

    #[tokio::test]
    async fn test_close() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let db = storage
            .connect("lib", "books", ["author"], None)
            .await
            .unwrap();
        assert_eq!(db.state(), ConnectionState::Open);
        db.close();
        assert_eq!(db.state(), ConnectionState::Closed);
        assert!(matches!(
            storage.get_by_key(&db, "books", 1).await,
            Err(TransactionError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_records_persist_across_storage_instances() {
        let dir = TempDir::new().unwrap();

        let key = {
            let storage = storage(&dir);
            let db = storage
                .connect("lib", "books", ["author"], Some(1))
                .await
                .unwrap();
            storage
                .add(&db, "books", record(json!({"title": "A", "author": "X"})))
                .await
                .unwrap()
        };

        let storage = storage(&dir);
        let db = storage.connect("lib", "books", ["author"], None).await.unwrap();
        let found = storage.get_by_key(&db, "books", key).await.unwrap();
        assert_eq!(found.and_then(|r| r.get("title").cloned()), Some(json!("A")));
    }
}
