use crate::application::ports::{ObjectStorage, RemoteDataGateway, Row, UploadProgress};
use crate::application::shared::mappers::{decode_message, encode_message, encode_read_receipt};
use crate::application::sync::{
    ProfileDirectory, ResourceKind, ResourceOptions, ResourceState, SyncedResource,
};
use crate::domain::entities::{Message, MessageBody, Profile, SyncedItem};
use crate::domain::value_objects::{ItemId, Scope};
use crate::shared::error::AppError;
use crate::shared::validation::{check_text, ValidationErrors, ValidationFailureKind};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

pub const MAX_MESSAGE_LENGTH: usize = 2000;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const PENDING_URL_SCHEME: &str = "pending://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePatch {
    pub read_at: DateTime<Utc>,
}

pub struct MessageKind;

impl ResourceKind for MessageKind {
    type Payload = Message;
    type Patch = MessagePatch;

    const TABLE: &'static str = "messages";
    const SCOPE_COLUMN: &'static str = "conversation_id";
    const SELECT: &'static str = "*, sender:profiles!sender_id(*)";

    fn parent_key(payload: &Message) -> &str {
        &payload.conversation_id
    }

    fn encode(payload: &Message) -> Row {
        encode_message(payload)
    }

    fn encode_patch(patch: &MessagePatch) -> Row {
        encode_read_receipt(&patch.read_at)
    }

    fn decode(row: &Row) -> Result<SyncedItem<Message>, AppError> {
        decode_message(row)
    }

    fn validate(mut payload: Message) -> Result<Message, AppError> {
        let mut errors = ValidationErrors::new();
        if payload.sender_id.trim().is_empty() {
            errors.push(
                "sender_id",
                ValidationFailureKind::Required,
                "Sign in to send messages",
            );
        }
        match &mut payload.body {
            MessageBody::Text { text } => {
                if let Some(trimmed) = check_text(&mut errors, "text", text, 1, MAX_MESSAGE_LENGTH)
                {
                    *text = trimmed;
                }
            }
            MessageBody::Image { url, caption } => {
                if url.trim().is_empty() {
                    errors.push("image", ValidationFailureKind::Required, "Image is required");
                }
                if let Some(raw) = caption.take() {
                    if raw.trim().is_empty() {
                        *caption = None;
                    } else {
                        *caption = check_text(&mut errors, "caption", &raw, 1, MAX_MESSAGE_LENGTH);
                    }
                }
            }
        }
        errors.into_result()?;
        Ok(payload)
    }

    fn author_to_resolve(payload: &Message) -> Option<&str> {
        payload
            .sender
            .is_none()
            .then_some(payload.sender_id.as_str())
    }

    fn attach_author(payload: &mut Message, profile: Profile) {
        payload.sender = Some(profile);
    }
}

/// 会話単位のメッセージ一覧と送信操作
pub struct Conversation {
    conversation_id: String,
    resource: SyncedResource<MessageKind>,
    storage: Arc<dyn ObjectStorage>,
    image_bucket: String,
}

impl Conversation {
    pub async fn open(
        remote: Arc<dyn RemoteDataGateway>,
        storage: Arc<dyn ObjectStorage>,
        profiles: Arc<ProfileDirectory>,
        conversation_id: &str,
        image_bucket: impl Into<String>,
        options: ResourceOptions,
    ) -> Result<Self, AppError> {
        let scope = Scope::new(MessageKind::SCOPE_COLUMN, conversation_id).map_err(|message| {
            AppError::validation("conversation_id", ValidationFailureKind::Required, message)
        })?;
        let resource = SyncedResource::open(remote, profiles, scope, options).await;
        Ok(Self {
            conversation_id: conversation_id.to_string(),
            resource,
            storage,
            image_bucket: image_bucket.into(),
        })
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn state(&self) -> ResourceState<Message> {
        self.resource.state()
    }

    pub fn watch(&self) -> watch::Receiver<ResourceState<Message>> {
        self.resource.watch()
    }

    pub fn resource(&self) -> &SyncedResource<MessageKind> {
        &self.resource
    }

    pub async fn send_text(&self, sender_id: &str, text: &str) -> Result<SyncedItem<Message>, AppError> {
        let message = Message::text(self.conversation_id.as_str(), sender_id, text);
        self.resource.create(message).await
    }

    /// Uploads the image, then inserts the row. The uploaded blob is removed
    /// again when the insert fails.
    pub async fn send_image(
        &self,
        sender_id: &str,
        data: Bytes,
        content_type: &str,
        caption: Option<&str>,
        progress: Option<UploadProgress>,
    ) -> Result<SyncedItem<Message>, AppError> {
        let extension = image_extension(content_type).ok_or_else(|| {
            AppError::validation(
                "image",
                ValidationFailureKind::UnsupportedMedia,
                format!("{content_type} is not a supported image type"),
            )
        })?;
        if data.is_empty() {
            return Err(AppError::validation(
                "image",
                ValidationFailureKind::Required,
                "Image is required",
            ));
        }
        if data.len() > MAX_IMAGE_BYTES {
            return Err(AppError::validation(
                "image",
                ValidationFailureKind::ContentTooLarge,
                format!("Images must be at most {} MiB", MAX_IMAGE_BYTES / (1024 * 1024)),
            ));
        }

        let path = format!(
            "{}/{}.{extension}",
            self.conversation_id,
            uuid::Uuid::new_v4()
        );
        let pending = MessageKind::validate(Message {
            conversation_id: self.conversation_id.clone(),
            sender_id: sender_id.to_string(),
            body: MessageBody::Image {
                url: format!("{PENDING_URL_SCHEME}{path}"),
                caption: caption.map(str::to_string),
            },
            read_at: None,
            sender: None,
        })?;

        let storage = Arc::clone(&self.storage);
        let bucket = self.image_bucket.clone();
        let scope = self.resource.scope().clone();
        let content_type = content_type.to_string();
        let draft = pending.clone();

        self.resource
            .create_via(pending, move |gateway| async move {
                let stored = storage
                    .upload(&bucket, &path, data, &content_type, progress)
                    .await?;
                let mut message = draft;
                if let MessageBody::Image { url, .. } = &mut message.body {
                    *url = stored.public_url.clone();
                }
                match gateway.create(&scope, &message).await {
                    Ok(item) => Ok(item),
                    Err(err) => {
                        tracing::warn!(path = %stored.path, error = %err, "message insert failed, removing uploaded image");
                        if let Err(cleanup) = storage.remove(&bucket, &[stored.path.clone()]).await {
                            tracing::error!(path = %stored.path, error = %cleanup, "orphaned message image");
                        }
                        Err(err)
                    }
                }
            })
            .await
    }

    pub async fn mark_read(&self, id: &ItemId) -> Result<SyncedItem<Message>, AppError> {
        self.resource
            .update(
                id,
                MessagePatch {
                    read_at: Utc::now(),
                },
            )
            .await
    }

    /// Confirmed messages from other participants not yet read.
    pub fn unread_count(&self, reader_id: &str) -> usize {
        self.state()
            .items
            .iter()
            .filter(|item| {
                !item.is_optimistic
                    && item.payload.sender_id != reader_id
                    && !item.payload.is_read()
            })
            .count()
    }

    pub async fn close(&self) {
        self.resource.close().await;
    }
}

fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
