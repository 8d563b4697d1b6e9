//! Storage error types

use thiserror::Error;

/// Failure to open or upgrade a database.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Invalid database or store name: {0:?}")]
    InvalidName(String),

    #[error("Invalid version {0}: versions start at 1")]
    InvalidVersion(u32),

    #[error("Requested version {requested} is lower than stored version {stored}")]
    VersionTooLow { requested: u32, stored: u32 },

    #[error("Upgrade of {name} to version {version} blocked by {open} open connection(s)")]
    Blocked {
        name: String,
        version: u32,
        open: usize,
    },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Open request aborted: {0}")]
    Aborted(String),
}

/// Failure of a single CRUD request. An absent key is not one of these.
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Object store not found: {0}")]
    StoreNotFound(String),

    #[error("Index {index} not found on store {store}")]
    IndexNotFound { store: String, index: String },

    #[error("Write request issued in a read-only transaction on {0}")]
    ReadOnly(String),

    #[error("Key {key} already exists in store {store}")]
    ConstraintViolation { store: String, key: i64 },

    #[error("Key generator of store {0} is exhausted")]
    KeyGeneratorExhausted(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Connection {0} is closed")]
    ConnectionClosed(String),

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request aborted: {0}")]
    Aborted(String),
}

/// Either kind of storage failure, for callers that do not branch on it.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}
