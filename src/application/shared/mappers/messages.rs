use super::profiles::decode_embedded_profile;
use super::row::{optional_datetime, optional_str, required_datetime, required_id, required_str, timestamp_value};
use crate::application::ports::Row;
use crate::domain::entities::{Message, MessageBody, MessageType, SyncedItem};
use crate::shared::error::AppError;
use serde_json::Value;

pub fn decode_message(row: &Row) -> Result<SyncedItem<Message>, AppError> {
    let conversation_id = required_str(row, "conversation_id")?;
    let message_type = optional_str(row, "message_type")
        .map(|raw| {
            raw.parse::<MessageType>()
                .map_err(|_| AppError::Deserialization(format!("unknown message_type `{raw}`")))
        })
        .transpose()?
        .unwrap_or(MessageType::Text);
    let content = required_str(row, "content")?;
    let body = match message_type {
        MessageType::Text => MessageBody::Text { text: content },
        MessageType::Image => MessageBody::Image {
            url: content,
            caption: optional_str(row, "caption"),
        },
    };
    let message = Message {
        conversation_id: conversation_id.clone(),
        sender_id: required_str(row, "sender_id")?,
        body,
        read_at: optional_datetime(row, "read_at"),
        sender: decode_embedded_profile(row, "sender"),
    };
    Ok(SyncedItem::confirmed(
        required_id(row, "id")?,
        conversation_id,
        message,
        required_datetime(row, "created_at")?,
    ))
}

pub fn encode_message(message: &Message) -> Row {
    let mut row = Row::new();
    row.insert(
        "conversation_id".into(),
        Value::String(message.conversation_id.clone()),
    );
    row.insert("sender_id".into(), Value::String(message.sender_id.clone()));
    row.insert(
        "message_type".into(),
        Value::String(message.body.message_type().as_str().to_string()),
    );
    row.insert(
        "content".into(),
        Value::String(message.body.content().to_string()),
    );
    if let MessageBody::Image {
        caption: Some(caption),
        ..
    } = &message.body
    {
        row.insert("caption".into(), Value::String(caption.clone()));
    }
    row
}

pub fn encode_read_receipt(read_at: &chrono::DateTime<chrono::Utc>) -> Row {
    let mut row = Row::new();
    row.insert("read_at".into(), timestamp_value(read_at));
    row
}
