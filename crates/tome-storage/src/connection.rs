//! Open database connections

use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use std::sync::Arc;

use crate::schema::Schema;
use crate::state::ConnectionState;
use crate::store::StoreDefinition;

pub(crate) struct ConnectionInner {
    pub(crate) name: String,
    pub(crate) schema: Schema,
    /// `None` once the handle has been closed
    pub(crate) conn: Mutex<Option<Connection>>,
    state: RwLock<ConnectionState>,
}

impl ConnectionInner {
    pub(crate) fn is_open(&self) -> bool {
        self.state.read().is_open()
    }

    fn close(&self) {
        let mut state = self.state.write();
        if !state.can_transition_to(ConnectionState::Closed) {
            return;
        }
        *state = ConnectionState::Closed;
        drop(state);

        self.conn.lock().take();
        tracing::info!(database = %self.name, version = self.schema.version, "Closed database");
    }
}

/// One open database. Owned by whoever called `connect`; closing it (or
/// dropping it) releases the underlying SQLite connection.
pub struct ConnectionHandle {
    inner: Arc<ConnectionInner>,
}

impl ConnectionHandle {
    pub(crate) fn new(name: String, schema: Schema, conn: Connection) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                name,
                schema,
                conn: Mutex::new(Some(conn)),
                state: RwLock::new(ConnectionState::Open),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<ConnectionInner> {
        &self.inner
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn version(&self) -> u32 {
        self.inner.schema.version
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    pub fn store_names(&self) -> Vec<&str> {
        self.inner.schema.stores.keys().map(String::as_str).collect()
    }

    pub fn store(&self, name: &str) -> Option<&StoreDefinition> {
        self.inner.schema.stores.get(name)
    }

    /// Move to `Closed`. Closing twice is a no-op.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("name", &self.inner.name)
            .field("version", &self.inner.schema.version)
            .field("state", &self.state())
            .finish()
    }
}
