//! Tome Storage Layer
//!
//! Versioned, schema-carrying object stores on SQLite. Databases are opened
//! through the [`SchemaManager`], which runs the upgrade step when the
//! requested version is ahead of the stored one; every CRUD request then
//! runs in its own transaction through [`transaction::run`].

mod catalog;
mod connection;
mod error;
mod record;
mod request;
mod schema;
mod state;
mod store;
pub mod transaction;

pub use connection::ConnectionHandle;
pub use error::{ConnectionError, StorageError, TransactionError};
pub use record::{PrimaryKey, Record};
pub use request::{Abort, Completion, Request};
pub use schema::{upgrade, Schema, SchemaManager};
pub use state::ConnectionState;
pub use store::{StoreDefinition, DEFAULT_KEY_PATH};
pub use transaction::{StoreRequest, TransactionMode};
