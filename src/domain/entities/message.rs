use super::{Profile, SyncPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
        }
    }
}

impl FromStr for MessageType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Text { text: String },
    Image { url: String, caption: Option<String> },
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Text { .. } => MessageType::Text,
            MessageBody::Image { .. } => MessageType::Image,
        }
    }

    /// Value stored in the `content` column.
    pub fn content(&self) -> &str {
        match self {
            MessageBody::Text { text } => text,
            MessageBody::Image { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub conversation_id: String,
    pub sender_id: String,
    pub body: MessageBody,
    pub read_at: Option<DateTime<Utc>>,
    pub sender: Option<Profile>,
}

impl Message {
    pub fn text(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            body: MessageBody::Text { text: text.into() },
            read_at: None,
            sender: None,
        }
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Object name at the end of an image URL, shared by the pending and stored URLs.
fn image_object_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

impl SyncPayload for Message {
    fn fingerprint(&self) -> Option<String> {
        let key = match &self.body {
            MessageBody::Text { text } => text.clone(),
            MessageBody::Image { url, caption } => format!(
                "{}\u{1f}{}",
                image_object_name(url),
                caption.as_deref().unwrap_or_default()
            ),
        };
        Some(format!(
            "{}\u{1f}{}\u{1f}{}",
            self.sender_id,
            self.body.message_type().as_str(),
            key
        ))
    }
}
