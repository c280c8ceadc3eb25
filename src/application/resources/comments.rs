use crate::application::ports::{RemoteDataGateway, Row};
use crate::application::shared::mappers::{decode_comment, encode_comment};
use crate::application::sync::{
    DeleteRequest, ProfileDirectory, ResourceKind, ResourceOptions, ResourceState, SyncedResource,
};
use crate::domain::entities::{Comment, Profile, SyncedItem};
use crate::domain::value_objects::{ItemId, Scope};
use crate::shared::error::AppError;
use crate::shared::validation::{check_text, ValidationErrors, ValidationFailureKind};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

pub const MAX_COMMENT_LENGTH: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPatch {
    pub content: String,
}

pub struct CommentKind;

impl ResourceKind for CommentKind {
    type Payload = Comment;
    type Patch = CommentPatch;

    const TABLE: &'static str = "post_comments";
    const SCOPE_COLUMN: &'static str = "post_id";
    const SELECT: &'static str = "*, author:profiles!user_id(*)";

    fn parent_key(payload: &Comment) -> &str {
        &payload.post_id
    }

    fn encode(payload: &Comment) -> Row {
        encode_comment(payload)
    }

    fn encode_patch(patch: &CommentPatch) -> Row {
        let mut row = Row::new();
        row.insert("content".into(), Value::String(patch.content.clone()));
        row
    }

    fn decode(row: &Row) -> Result<SyncedItem<Comment>, AppError> {
        decode_comment(row)
    }

    fn validate(mut payload: Comment) -> Result<Comment, AppError> {
        let mut errors = ValidationErrors::new();
        if payload.author_id.trim().is_empty() {
            errors.push(
                "author_id",
                ValidationFailureKind::Required,
                "Sign in to comment",
            );
        }
        if let Some(content) =
            check_text(&mut errors, "content", &payload.content, 1, MAX_COMMENT_LENGTH)
        {
            payload.content = content;
        }
        errors.into_result()?;
        Ok(payload)
    }

    fn author_to_resolve(payload: &Comment) -> Option<&str> {
        payload
            .author
            .is_none()
            .then_some(payload.author_id.as_str())
    }

    fn attach_author(payload: &mut Comment, profile: Profile) {
        payload.author = Some(profile);
    }
}

/// 投稿ごとのコメント一覧
pub struct CommentThread {
    post_id: String,
    resource: SyncedResource<CommentKind>,
}

impl CommentThread {
    pub async fn open(
        remote: Arc<dyn RemoteDataGateway>,
        profiles: Arc<ProfileDirectory>,
        post_id: &str,
        options: ResourceOptions,
    ) -> Result<Self, AppError> {
        let scope = Scope::new(CommentKind::SCOPE_COLUMN, post_id).map_err(|message| {
            AppError::validation("post_id", ValidationFailureKind::Required, message)
        })?;
        let resource = SyncedResource::open(remote, profiles, scope, options).await;
        Ok(Self {
            post_id: post_id.to_string(),
            resource,
        })
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn state(&self) -> ResourceState<Comment> {
        self.resource.state()
    }

    pub fn watch(&self) -> watch::Receiver<ResourceState<Comment>> {
        self.resource.watch()
    }

    pub async fn add(&self, author_id: &str, content: &str) -> Result<SyncedItem<Comment>, AppError> {
        let comment = Comment::new(self.post_id.as_str(), author_id, content);
        self.resource.create(comment).await
    }

    pub async fn edit(&self, id: &ItemId, content: &str) -> Result<SyncedItem<Comment>, AppError> {
        let mut errors = ValidationErrors::new();
        let content = check_text(&mut errors, "content", content, 1, MAX_COMMENT_LENGTH);
        errors.into_result()?;
        let content = content.unwrap_or_default();
        self.resource.update(id, CommentPatch { content }).await
    }

    pub async fn request_delete(
        &self,
        id: &ItemId,
    ) -> Result<DeleteRequest<'_, CommentKind>, AppError> {
        self.resource.request_delete(id).await
    }

    pub fn resource(&self) -> &SyncedResource<CommentKind> {
        &self.resource
    }

    pub async fn close(&self) {
        self.resource.close().await;
    }
}
