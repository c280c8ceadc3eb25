use super::row::{required_datetime, required_id, required_str, timestamp_value};
use crate::application::ports::Row;
use crate::domain::entities::{Presence, PresenceStatus, SyncedItem};
use crate::shared::error::AppError;
use serde_json::Value;

pub fn decode_presence(row: &Row) -> Result<SyncedItem<Presence>, AppError> {
    let user_id = required_str(row, "user_id")?;
    let raw_status = required_str(row, "status")?;
    let status = raw_status
        .parse::<PresenceStatus>()
        .map_err(|_| AppError::Deserialization(format!("unknown presence status `{raw_status}`")))?;
    let last_seen = required_datetime(row, "last_seen")?;
    Ok(SyncedItem::confirmed(
        required_id(row, "user_id")?,
        user_id.clone(),
        Presence {
            user_id,
            status,
            last_seen,
        },
        last_seen,
    ))
}

pub fn encode_presence(presence: &Presence) -> Row {
    let mut row = Row::new();
    row.insert("user_id".into(), Value::String(presence.user_id.clone()));
    row.insert(
        "status".into(),
        Value::String(presence.status.as_str().to_string()),
    );
    row.insert("last_seen".into(), timestamp_value(&presence.last_seen));
    row
}
