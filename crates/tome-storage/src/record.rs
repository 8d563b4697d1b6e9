//! Record values stored in an object store

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TransactionError;

/// Auto-assigned primary key of a record within one store.
pub type PrimaryKey = i64;

/// A structured value held by a store. Always a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a record from any serializable value that encodes as an object.
    pub fn from_typed<T: Serialize>(value: &T) -> Result<Self, TransactionError> {
        Self::try_from(serde_json::to_value(value)?)
    }

    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, TransactionError> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Look up a field. Dotted paths descend into nested objects.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = self.0.get(segments.next()?)?;
        segments.try_fold(first, |value, segment| value.as_object()?.get(segment))
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// The caller-supplied or store-assigned key held in `key_path`.
    ///
    /// `Ok(None)` when the field is absent; an error when it holds anything
    /// other than a positive integer.
    pub fn key(&self, key_path: &str) -> Result<Option<PrimaryKey>, TransactionError> {
        match self.0.get(key_path) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => match value.as_i64() {
                Some(key) if key > 0 => Ok(Some(key)),
                _ => Err(TransactionError::InvalidRecord(format!(
                    "primary key field {key_path:?} must be a positive integer, got {value}"
                ))),
            },
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl TryFrom<Value> for Record {
    type Error = TransactionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(TransactionError::InvalidRecord(format!(
                "expected an object, got {other}"
            ))),
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
