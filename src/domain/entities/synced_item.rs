use crate::domain::value_objects::ItemId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Payload carried by a [`SyncedItem`].
pub trait SyncPayload: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Content key used to match a pushed row against a pending local insert.
    fn fingerprint(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncedItem<P> {
    pub id: ItemId,
    pub parent_key: String,
    pub payload: P,
    pub created_at: DateTime<Utc>,
    pub is_optimistic: bool,
}

impl<P> SyncedItem<P> {
    pub fn confirmed(
        id: ItemId,
        parent_key: impl Into<String>,
        payload: P,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            parent_key: parent_key.into(),
            payload,
            created_at,
            is_optimistic: false,
        }
    }

    pub fn optimistic(parent_key: impl Into<String>, payload: P, created_at: DateTime<Utc>) -> Self {
        Self {
            id: ItemId::temporary(),
            parent_key: parent_key.into(),
            payload,
            created_at,
            is_optimistic: true,
        }
    }

    pub fn created_at_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    pub fn map_payload<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut P),
    {
        f(&mut self.payload);
        self
    }
}
