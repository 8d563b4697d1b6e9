//! Tome Core
//!
//! Public surface of the object store: the [`Storage`] facade, its
//! configuration and logging setup. Presentation code talks to this crate
//! only; everything below it lives in `tome-storage`.

mod config;
mod error;
mod facade;

pub use config::{Config, DATA_DIR_ENV};
pub use error::CoreError;
pub use facade::Storage;

pub use tome_storage::{
    ConnectionError, ConnectionHandle, ConnectionState, PrimaryKey, Record, Schema,
    StorageError, StoreDefinition, TransactionError, TransactionMode,
};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
