//! Internal catalog tables
//!
//! Every database file carries its own schema: the stored version, the
//! object stores with their key generators, and the declared indexes.
//! Records of all stores share one table keyed by `(store, id)`.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

use crate::error::ConnectionError;
use crate::store::StoreDefinition;

type Result<T> = std::result::Result<T, ConnectionError>;

/// Create the catalog tables if this file has never been opened.
pub fn bootstrap(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tome_version (
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tome_stores (
            name TEXT PRIMARY KEY,
            key_path TEXT NOT NULL,
            auto_increment INTEGER NOT NULL DEFAULT 1,
            next_key INTEGER DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tome_indexes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            store TEXT NOT NULL,
            name TEXT NOT NULL,
            key_path TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (store, name),
            FOREIGN KEY (store) REFERENCES tome_stores(name) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS tome_records (
            store TEXT NOT NULL,
            id INTEGER NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (store, id),
            FOREIGN KEY (store) REFERENCES tome_stores(name) ON DELETE CASCADE
        );
    "#,
    )?;
    Ok(())
}

/// Stored version, 0 for a database that has never completed an upgrade.
pub fn stored_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT version FROM tome_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(version.unwrap_or(0))
}

pub fn set_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute("DELETE FROM tome_version", [])?;
    conn.execute("INSERT INTO tome_version (version) VALUES (?1)", [version])?;
    Ok(())
}

pub fn store_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM tome_stores WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

pub fn create_store(conn: &Connection, store: &StoreDefinition) -> Result<()> {
    conn.execute(
        "INSERT INTO tome_stores (name, key_path, auto_increment, next_key, created_at)
         VALUES (?1, ?2, ?3, 1, ?4)",
        params![
            store.name,
            store.key_path,
            store.auto_increment,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Declare an index and build its SQLite expression index.
///
/// Returns `false` when the store already had an index of that name.
pub fn create_index(conn: &Connection, store: &str, field: &str) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO tome_indexes (store, name, key_path, created_at)
         VALUES (?1, ?2, ?2, ?3)",
        params![store, field, Utc::now().to_rfc3339()],
    )?;
    if inserted == 0 {
        return Ok(false);
    }

    let id = conn.last_insert_rowid();
    // `field` is a validated field path, so it is safe inside the literal
    conn.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS tome_idx_{id} ON tome_records (store, {})",
        extract_expr(field)
    ))?;
    Ok(true)
}

/// Read every store and its indexes.
pub fn load_stores(conn: &Connection) -> Result<BTreeMap<String, StoreDefinition>> {
    let mut stores = BTreeMap::new();

    let mut stmt = conn.prepare("SELECT name, key_path, auto_increment FROM tome_stores")?;
    let rows = stmt.query_map([], |row| {
        Ok(StoreDefinition {
            name: row.get(0)?,
            key_path: row.get(1)?,
            auto_increment: row.get(2)?,
            indexes: Default::default(),
        })
    })?;
    for store in rows {
        let store = store?;
        stores.insert(store.name.clone(), store);
    }

    let mut stmt = conn.prepare("SELECT store, name FROM tome_indexes")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for index in rows {
        let (store, name) = index?;
        if let Some(definition) = stores.get_mut(&store) {
            definition.indexes.insert(name);
        }
    }

    Ok(stores)
}

/// SQL expression reading `field` out of a stored record. Index lookups
/// must use the exact same text for SQLite to pick the expression index.
pub fn extract_expr(field: &str) -> String {
    format!("json_extract(value, '$.{field}')")
}

/// SQL expression naming the JSON type of `field` in a stored record.
pub fn type_expr(field: &str) -> String {
    format!("json_type(value, '$.{field}')")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        bootstrap(&conn).unwrap();
        conn
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let conn = conn();
        bootstrap(&conn).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_version_round_trip() {
        let conn = conn();
        set_version(&conn, 3).unwrap();
        set_version(&conn, 4).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), 4);
    }

    #[test]
    fn test_store_and_indexes() {
        let conn = conn();
        let books = StoreDefinition::new("books");
        create_store(&conn, &books).unwrap();
        assert!(store_exists(&conn, "books").unwrap());
        assert!(!store_exists(&conn, "authors").unwrap());

        assert!(create_index(&conn, "books", "author").unwrap());
        assert!(!create_index(&conn, "books", "author").unwrap());
        assert!(create_index(&conn, "books", "meta.isbn").unwrap());

        let stores = load_stores(&conn).unwrap();
        let loaded = &stores["books"];
        assert_eq!(loaded.key_path, "id");
        assert!(loaded.auto_increment);
        assert!(loaded.has_index("author"));
        assert!(loaded.has_index("meta.isbn"));

        let sqlite_indexes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'tome_idx_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(sqlite_indexes, 2);
    }
}
