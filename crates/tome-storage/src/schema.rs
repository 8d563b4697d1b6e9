//! Schema management
//!
//! Opens versioned databases and runs the upgrade step when the requested
//! version is ahead of the stored one. Upgrades are the only place stores
//! and indexes are ever created.

use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::catalog;
use crate::connection::{ConnectionHandle, ConnectionInner};
use crate::error::ConnectionError;
use crate::request;
use crate::state::ConnectionState;
use crate::store::{validate_name, StoreDefinition};

type Result<T> = std::result::Result<T, ConnectionError>;

/// Snapshot of a database's schema, taken when it was opened.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    pub version: u32,
    pub stores: BTreeMap<String, StoreDefinition>,
}

pub struct SchemaManager {
    data_dir: PathBuf,
    busy_timeout: Duration,
    /// One open/upgrade sequence in flight per database name
    open_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Handles handed out per database name, for upgrade blocking
    connections: Mutex<HashMap<String, Vec<Weak<ConnectionInner>>>>,
}

impl SchemaManager {
    pub fn new<P: AsRef<Path>>(data_dir: P, busy_timeout: Duration) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            busy_timeout,
            open_locks: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File backing the database called `name`.
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite3", file_stem(name)))
    }

    /// Open `db_name`, upgrading it to `version` first if that is ahead of
    /// the stored version. `None` keeps the stored version (1 for a new
    /// database).
    pub async fn open(
        &self,
        db_name: &str,
        store: StoreDefinition,
        version: Option<u32>,
    ) -> Result<ConnectionHandle> {
        validate_name(db_name)?;
        store.validate()?;
        if version == Some(0) {
            return Err(ConnectionError::InvalidVersion(0));
        }

        let lock = self.open_lock(db_name);
        let _guard = lock.lock().await;

        let plan = OpenPlan {
            name: db_name.to_string(),
            path: self.database_path(db_name),
            store,
            version,
            open_connections: self.live_connections(db_name),
            busy_timeout: self.busy_timeout,
        };

        let (conn, schema) = request::spawn("open", move || plan.run()).await?;
        let handle = ConnectionHandle::new(db_name.to_string(), schema, conn);

        self.connections
            .lock()
            .entry(db_name.to_string())
            .or_default()
            .push(Arc::downgrade(handle.inner()));

        Ok(handle)
    }

    fn open_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.open_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn live_connections(&self, name: &str) -> usize {
        let mut connections = self.connections.lock();
        let Some(handles) = connections.get_mut(name) else {
            return 0;
        };
        handles.retain(|weak| weak.upgrade().is_some_and(|inner| inner.is_open()));
        handles.len()
    }
}

/// Everything the blocking half of an open needs.
struct OpenPlan {
    name: String,
    path: PathBuf,
    store: StoreDefinition,
    version: Option<u32>,
    open_connections: usize,
    busy_timeout: Duration,
}

impl OpenPlan {
    fn run(self) -> Result<(Connection, Schema)> {
        let mut state = ConnectionState::Closed;
        let result = self.drive(&mut state);

        if let Err(e) = &result {
            advance(&self.name, &mut state, ConnectionState::Closed);
            tracing::error!(database = %self.name, error = %e, "Failed to open database");
        }
        result
    }

    fn drive(&self, state: &mut ConnectionState) -> Result<(Connection, Schema)> {
        advance(&self.name, state, ConnectionState::Opening);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.busy_timeout(self.busy_timeout)?;

        catalog::bootstrap(&conn)?;

        let stored = catalog::stored_version(&conn)?;
        let requested = self.version.unwrap_or(stored.max(1));

        if requested < stored {
            return Err(ConnectionError::VersionTooLow { requested, stored });
        }

        if requested > stored {
            if self.open_connections > 0 {
                return Err(ConnectionError::Blocked {
                    name: self.name.clone(),
                    version: requested,
                    open: self.open_connections,
                });
            }

            advance(&self.name, state, ConnectionState::UpgradeNeeded);
            advance(&self.name, state, ConnectionState::Upgrading);

            let tx = conn.transaction()?;
            upgrade(&tx, &self.store, stored, requested)?;
            catalog::set_version(&tx, requested)?;
            tx.commit()?;
        }

        let schema = Schema {
            version: requested,
            stores: catalog::load_stores(&conn)?,
        };

        advance(&self.name, state, ConnectionState::Open);
        tracing::info!(
            database = %self.name,
            version = requested,
            stores = schema.stores.len(),
            "Opened database"
        );

        Ok((conn, schema))
    }
}

/// Schema migration from `old_version` to `new_version`.
///
/// Creates the store when it is missing and adds any indexes it does not
/// have yet. Runs inside the upgrade transaction, so a failure leaves
/// neither the schema nor the stored version changed.
pub fn upgrade(
    conn: &Connection,
    store: &StoreDefinition,
    old_version: u32,
    new_version: u32,
) -> Result<()> {
    tracing::info!(
        store = %store.name,
        old_version,
        new_version,
        "Running upgrade"
    );

    if !catalog::store_exists(conn, &store.name)? {
        catalog::create_store(conn, store)?;
        tracing::info!(store = %store.name, key_path = %store.key_path, "Created object store");
    }

    for index in &store.indexes {
        if catalog::create_index(conn, &store.name, index)? {
            tracing::info!(store = %store.name, index = %index, "Created index");
        }
    }

    Ok(())
}

fn advance(name: &str, state: &mut ConnectionState, next: ConnectionState) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid connection transition {state} -> {next}"
    );
    tracing::debug!(database = %name, from = %state, to = %next, "Connection state");
    *state = next;
}

/// Database names are arbitrary strings; keep file names portable.
fn file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            stem.push(c);
        } else {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                stem.push_str(&format!("%{:02X}", b));
            }
        }
    }
    stem
}
