use super::profiles::decode_embedded_profile;
use super::row::{required_datetime, required_id, required_str};
use crate::application::ports::Row;
use crate::domain::entities::{Comment, SyncedItem};
use crate::shared::error::AppError;
use serde_json::Value;

pub fn decode_comment(row: &Row) -> Result<SyncedItem<Comment>, AppError> {
    let post_id = required_str(row, "post_id")?;
    let comment = Comment {
        post_id: post_id.clone(),
        author_id: required_str(row, "user_id")?,
        content: required_str(row, "content")?,
        author: decode_embedded_profile(row, "author"),
    };
    Ok(SyncedItem::confirmed(
        required_id(row, "id")?,
        post_id,
        comment,
        required_datetime(row, "created_at")?,
    ))
}

pub fn encode_comment(comment: &Comment) -> Row {
    let mut row = Row::new();
    row.insert("post_id".into(), Value::String(comment.post_id.clone()));
    row.insert("user_id".into(), Value::String(comment.author_id.clone()));
    row.insert("content".into(), Value::String(comment.content.clone()));
    row
}
