use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TEMP_ID_PREFIX: &str = "temp-";

/// Server-issued id, or a local `temp-<millis>-<random>` id before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn temporary() -> Self {
        let millis = Utc::now().timestamp_millis();
        let suffix: u32 = rand::random();
        Self(format!("{TEMP_ID_PREFIX}{millis}-{suffix:08x}"))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Item ID cannot be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_ids_are_marked_and_distinct() {
        let a = ItemId::temporary();
        let b = ItemId::temporary();
        assert!(a.is_temporary());
        assert!(a.as_str().starts_with("temp-"));
        assert_ne!(a, b);
    }

    #[test]
    fn server_ids_are_not_temporary() {
        let id = ItemId::new("c1").unwrap();
        assert!(!id.is_temporary());
        assert!(ItemId::new("  ").is_err());
    }
}
