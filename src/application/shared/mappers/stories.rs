use super::row::{optional_str, optional_u32, required_datetime, required_str, timestamp_value};
use crate::application::ports::Row;
use crate::domain::entities::{MediaType, Story};
use crate::shared::error::AppError;
use serde_json::{json, Value};

pub fn decode_story(row: &Row) -> Result<Story, AppError> {
    let raw_media_type = required_str(row, "media_type")?;
    let media_type = raw_media_type
        .parse::<MediaType>()
        .map_err(|_| AppError::Deserialization(format!("unknown media_type `{raw_media_type}`")))?;
    Ok(Story {
        id: required_str(row, "id")?,
        author_id: required_str(row, "user_id")?,
        media_url: required_str(row, "media_url")?,
        media_path: required_str(row, "media_path")?,
        media_type,
        thumbnail_url: optional_str(row, "thumbnail_url"),
        thumbnail_path: optional_str(row, "thumbnail_path"),
        caption: optional_str(row, "caption"),
        duration_secs: optional_u32(row, "duration"),
        created_at: required_datetime(row, "created_at")?,
        expires_at: required_datetime(row, "expires_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct StoryRowDraft<'a> {
    pub author_id: &'a str,
    pub media_url: &'a str,
    pub media_path: &'a str,
    pub media_type: MediaType,
    pub thumbnail_url: Option<&'a str>,
    pub thumbnail_path: Option<&'a str>,
    pub caption: Option<&'a str>,
    pub duration_secs: Option<u32>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

pub fn encode_story(draft: &StoryRowDraft<'_>) -> Row {
    let mut row = Row::new();
    row.insert("user_id".into(), json!(draft.author_id));
    row.insert("media_url".into(), json!(draft.media_url));
    row.insert("media_path".into(), json!(draft.media_path));
    row.insert("media_type".into(), json!(draft.media_type.as_str()));
    row.insert(
        "thumbnail_url".into(),
        draft.thumbnail_url.map_or(Value::Null, |v| json!(v)),
    );
    row.insert(
        "thumbnail_path".into(),
        draft.thumbnail_path.map_or(Value::Null, |v| json!(v)),
    );
    row.insert("caption".into(), draft.caption.map_or(Value::Null, |v| json!(v)));
    row.insert(
        "duration".into(),
        draft.duration_secs.map_or(Value::Null, |v| json!(v)),
    );
    row.insert("expires_at".into(), timestamp_value(&draft.expires_at));
    row
}
