//! Object store definitions
//!
//! A store has one auto-incrementing primary key (`id`) and zero or more
//! secondary indexes, each named after the field it indexes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::ConnectionError;

pub const DEFAULT_KEY_PATH: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDefinition {
    pub name: String,
    pub key_path: String,
    pub auto_increment: bool,
    pub indexes: BTreeSet<String>,
}

impl StoreDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: DEFAULT_KEY_PATH.to_string(),
            auto_increment: true,
            indexes: BTreeSet::new(),
        }
    }

    pub fn with_indexes<I, S>(mut self, indexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.extend(indexes.into_iter().map(Into::into));
        self
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains(name)
    }

    /// Check every name that ends up inside generated SQL.
    pub fn validate(&self) -> Result<(), ConnectionError> {
        validate_name(&self.name)?;
        for index in &self.indexes {
            if !is_field_path(index) {
                return Err(ConnectionError::InvalidSchema(format!(
                    "index {index:?} on store {:?} is not a field path",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), ConnectionError> {
    if name.trim().is_empty() || name.chars().any(char::is_control) {
        return Err(ConnectionError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Dotted path of `[A-Za-z0-9_$]` segments, safe to splice into a JSON path.
pub(crate) fn is_field_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}
