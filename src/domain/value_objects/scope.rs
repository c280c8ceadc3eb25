use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKey {
    One(String),
    Many(Vec<String>),
}

/// Parent identifier partitioning a collection: post id, conversation id, or a set of user ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    column: String,
    key: ScopeKey,
}

impl Scope {
    pub fn new(column: impl Into<String>, key: impl Into<String>) -> Result<Self, String> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err("Scope key cannot be empty".to_string());
        }
        Ok(Self {
            column: column.into(),
            key: ScopeKey::One(key),
        })
    }

    pub fn any_of<I, S>(column: impl Into<String>, keys: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut collected: Vec<String> = Vec::new();
        for key in keys {
            let key = key.into();
            if key.trim().is_empty() {
                return Err("Scope key cannot be empty".to_string());
            }
            if !collected.contains(&key) {
                collected.push(key);
            }
        }
        if collected.is_empty() {
            return Err("Scope requires at least one key".to_string());
        }
        Ok(Self {
            column: column.into(),
            key: ScopeKey::Many(collected),
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn key(&self) -> &ScopeKey {
        &self.key
    }

    /// The single parent key, if this scope has exactly one.
    pub fn single_key(&self) -> Option<&str> {
        match &self.key {
            ScopeKey::One(key) => Some(key.as_str()),
            ScopeKey::Many(_) => None,
        }
    }

    pub fn matches(&self, parent_key: &str) -> bool {
        match &self.key {
            ScopeKey::One(key) => key == parent_key,
            ScopeKey::Many(keys) => keys.iter().any(|key| key == parent_key),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            ScopeKey::One(key) => write!(f, "{}={}", self.column, key),
            ScopeKey::Many(keys) => write!(f, "{}=[{}]", self.column, keys.join(",")),
        }
    }
}
