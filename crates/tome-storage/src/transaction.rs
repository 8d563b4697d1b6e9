//! Transaction executor
//!
//! Each call to [`run`] opens one SQLite transaction scoped to one store,
//! issues exactly one request against it and resolves once the request has
//! committed or failed.

use rusqlite::{params, ErrorCode, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::{extract_expr, type_expr};
use crate::connection::ConnectionHandle;
use crate::error::TransactionError;
use crate::record::{PrimaryKey, Record};
use crate::request;
use crate::store::StoreDefinition;

type Result<T> = std::result::Result<T, TransactionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

impl TransactionMode {
    fn behavior(&self) -> TransactionBehavior {
        match self {
            TransactionMode::ReadOnly => TransactionBehavior::Deferred,
            TransactionMode::ReadWrite => TransactionBehavior::Immediate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionMode::ReadOnly => "readonly",
            TransactionMode::ReadWrite => "readwrite",
        }
    }
}

impl std::fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single request against one object store.
pub trait StoreRequest: Send + 'static {
    type Output: Send + 'static;

    /// Request name used in logs and abort errors
    const NAME: &'static str;
    /// Whether the request needs a read-write transaction
    const WRITES: bool;

    fn execute(
        self,
        tx: &rusqlite::Transaction<'_>,
        store: &StoreDefinition,
    ) -> Result<Self::Output>;
}

/// Insert a record, resolving with its primary key.
#[derive(Debug, Clone)]
pub struct Add(pub Record);

/// Fetch a record by primary key. An absent key resolves with `None`.
#[derive(Debug, Clone, Copy)]
pub struct GetByKey(pub PrimaryKey);

/// Remove a record by primary key. Removing an absent key succeeds.
#[derive(Debug, Clone, Copy)]
pub struct DeleteByKey(pub PrimaryKey);

/// Every record whose indexed field equals `value`, in key order.
#[derive(Debug, Clone)]
pub struct GetAllByIndex {
    pub index: String,
    pub value: Value,
}

impl StoreRequest for Add {
    type Output = PrimaryKey;
    const NAME: &'static str = "add";
    const WRITES: bool = true;

    fn execute(self, tx: &rusqlite::Transaction<'_>, store: &StoreDefinition) -> Result<PrimaryKey> {
        let mut record = self.0;
        // NULL once an explicit key has used up the key space
        let next_key: Option<PrimaryKey> = tx.query_row(
            "SELECT next_key FROM tome_stores WHERE name = ?1",
            [&store.name],
            |row| row.get(0),
        )?;

        let key = match record.key(&store.key_path)? {
            Some(key) => key,
            None if store.auto_increment => {
                let key = next_key
                    .ok_or_else(|| TransactionError::KeyGeneratorExhausted(store.name.clone()))?;
                record.insert(store.key_path.clone(), key);
                key
            }
            None => {
                return Err(TransactionError::InvalidRecord(format!(
                    "record has no {:?} and store {:?} does not generate keys",
                    store.key_path, store.name
                )))
            }
        };

        let value = serde_json::to_string(&record)?;
        match tx.execute(
            "INSERT INTO tome_records (store, id, value) VALUES (?1, ?2, ?3)",
            params![store.name, key, value],
        ) {
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(TransactionError::ConstraintViolation {
                    store: store.name.clone(),
                    key,
                });
            }
            other => other?,
        };

        // Explicit keys push the generator past them; keys are never reused
        if next_key.is_some_and(|next| key >= next) {
            tx.execute(
                "UPDATE tome_stores SET next_key = ?2 WHERE name = ?1",
                params![store.name, key.checked_add(1)],
            )?;
        }

        Ok(key)
    }
}

impl StoreRequest for GetByKey {
    type Output = Option<Record>;
    const NAME: &'static str = "get";
    const WRITES: bool = false;

    fn execute(self, tx: &rusqlite::Transaction<'_>, store: &StoreDefinition) -> Result<Option<Record>> {
        let value: Option<String> = tx
            .query_row(
                "SELECT value FROM tome_records WHERE store = ?1 AND id = ?2",
                params![store.name, self.0],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl StoreRequest for DeleteByKey {
    type Output = ();
    const NAME: &'static str = "delete";
    const WRITES: bool = true;

    fn execute(self, tx: &rusqlite::Transaction<'_>, store: &StoreDefinition) -> Result<()> {
        let removed = tx.execute(
            "DELETE FROM tome_records WHERE store = ?1 AND id = ?2",
            params![store.name, self.0],
        )?;
        tracing::debug!(store = %store.name, key = self.0, removed, "Deleted record");
        Ok(())
    }
}

impl StoreRequest for GetAllByIndex {
    type Output = Vec<Record>;
    const NAME: &'static str = "get_all_by_index";
    const WRITES: bool = false;

    fn execute(self, tx: &rusqlite::Transaction<'_>, store: &StoreDefinition) -> Result<Vec<Record>> {
        if !store.has_index(&self.index) {
            return Err(TransactionError::IndexNotFound {
                store: store.name.clone(),
                index: self.index,
            });
        }

        let mut stmt = tx.prepare(&index_query(&self.index, &self.value))?;
        let rows = stmt.query_map(params![store.name, sql_value(&self.value)?], |row| {
            row.get::<_, String>(0)
        })?;

        let mut records = Vec::new();
        for json in rows {
            records.push(serde_json::from_str(&json?)?);
        }
        Ok(records)
    }
}

/// Equality lookup over one index. `json_extract` flattens booleans to 0/1
/// and containers to text, so the JSON type is matched as well.
fn index_query(index: &str, value: &Value) -> String {
    let types = match value {
        Value::Null => "('null')",
        Value::Bool(true) => "('true')",
        Value::Bool(false) => "('false')",
        Value::Number(_) => "('integer', 'real')",
        Value::String(_) => "('text')",
        Value::Array(_) => "('array')",
        Value::Object(_) => "('object')",
    };
    format!(
        "SELECT value FROM tome_records WHERE store = ?1 AND {} = ?2 AND {} IN {} ORDER BY id",
        extract_expr(index),
        type_expr(index),
        types
    )
}

/// The SQL value `json_extract` yields for a JSON value.
fn sql_value(value: &Value) -> Result<rusqlite::types::Value> {
    use rusqlite::types::Value as Sql;

    Ok(match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => Sql::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Sql::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => Sql::Text(serde_json::to_string(value)?),
    })
}

/// Run `request` in its own transaction on `store_name`.
pub async fn run<R: StoreRequest>(
    handle: &ConnectionHandle,
    store_name: &str,
    mode: TransactionMode,
    request: R,
) -> Result<R::Output> {
    let inner = handle.inner().clone();
    if !inner.is_open() {
        return Err(TransactionError::ConnectionClosed(inner.name.clone()));
    }
    let store = handle
        .store(store_name)
        .cloned()
        .ok_or_else(|| TransactionError::StoreNotFound(store_name.to_string()))?;
    if R::WRITES && mode == TransactionMode::ReadOnly {
        return Err(TransactionError::ReadOnly(store.name));
    }

    let id = Uuid::new_v4();
    let result = request::spawn::<_, TransactionError, _>(R::NAME, move || {
        let span = tracing::debug_span!(
            "transaction",
            %id,
            database = %inner.name,
            store = %store.name,
            %mode,
            request = R::NAME
        );
        let _enter = span.enter();

        let mut guard = inner.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| TransactionError::ConnectionClosed(inner.name.clone()))?;

        let tx = conn.transaction_with_behavior(mode.behavior())?;
        let output = request.execute(&tx, &store)?;
        tx.commit()?;

        tracing::debug!("Committed transaction");
        Ok(output)
    })
    .await;

    if let Err(e) = &result {
        tracing::warn!(
            %id,
            database = %handle.name(),
            store = %store_name,
            request = R::NAME,
            error = %e,
            "Transaction failed"
        );
    }
    result
}
