use crate::application::ports::{Filter, ObjectStorage, RemoteDataGateway, RowQuery, UploadProgress};
use crate::application::shared::bounded;
use crate::application::shared::mappers::row::format_timestamp;
use crate::application::shared::mappers::{decode_story, encode_story, StoryRowDraft};
use crate::domain::entities::{MediaType, Story};
use crate::shared::error::AppError;
use crate::shared::validation::{check_text, ValidationErrors, ValidationFailureKind};
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

const STORIES_TABLE: &str = "stories";
pub const STORY_LIFETIME_HOURS: i64 = 24;
pub const MAX_VIDEO_SECONDS: u32 = 60;
pub const MAX_MEDIA_BYTES: usize = 50 * 1024 * 1024;
pub const MAX_CAPTION_LENGTH: usize = 500;

#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub data: Bytes,
    pub content_type: String,
}

/// 撮影済みストーリーの投稿内容
#[derive(Debug, Clone)]
pub struct StoryDraft {
    pub author_id: String,
    pub media: MediaUpload,
    pub thumbnail: Option<MediaUpload>,
    pub caption: Option<String>,
    pub duration_secs: Option<u32>,
}

pub struct StoryService {
    remote: Arc<dyn RemoteDataGateway>,
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    timeout: Duration,
}

impl StoryService {
    pub fn new(
        remote: Arc<dyn RemoteDataGateway>,
        storage: Arc<dyn ObjectStorage>,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            remote,
            storage,
            bucket: bucket.into(),
            timeout,
        }
    }

    /// Uploads media (and thumbnail), then inserts the row. Blobs uploaded
    /// before a failure are deleted again.
    pub async fn publish(
        &self,
        draft: StoryDraft,
        progress: Option<UploadProgress>,
    ) -> Result<Story, AppError> {
        let (media_type, caption) = validate_draft(&draft)?;
        let story_key = uuid::Uuid::new_v4();
        let media_path = format!(
            "{}/{story_key}.{}",
            draft.author_id,
            extension(&draft.media.content_type)
        );

        let media = self
            .storage
            .upload(
                &self.bucket,
                &media_path,
                draft.media.data.clone(),
                &draft.media.content_type,
                progress,
            )
            .await?;
        let mut uploaded = vec![media.path.clone()];

        let thumbnail = match &draft.thumbnail {
            Some(thumbnail) => {
                let path = format!(
                    "{}/{story_key}-thumb.{}",
                    draft.author_id,
                    extension(&thumbnail.content_type)
                );
                match self
                    .storage
                    .upload(
                        &self.bucket,
                        &path,
                        thumbnail.data.clone(),
                        &thumbnail.content_type,
                        None,
                    )
                    .await
                {
                    Ok(stored) => {
                        uploaded.push(stored.path.clone());
                        Some(stored)
                    }
                    Err(err) => {
                        self.discard(&uploaded).await;
                        return Err(err);
                    }
                }
            }
            None => None,
        };

        let row = encode_story(&StoryRowDraft {
            author_id: &draft.author_id,
            media_url: &media.public_url,
            media_path: &media.path,
            media_type,
            thumbnail_url: thumbnail.as_ref().map(|t| t.public_url.as_str()),
            thumbnail_path: thumbnail.as_ref().map(|t| t.path.as_str()),
            caption: caption.as_deref(),
            duration_secs: draft.duration_secs,
            expires_at: Utc::now() + ChronoDuration::hours(STORY_LIFETIME_HOURS),
        });

        let inserted = bounded(
            self.timeout,
            STORIES_TABLE,
            self.remote.create(STORIES_TABLE, row),
        )
        .await
        .and_then(|row| decode_story(&row));
        match inserted {
            Ok(story) => {
                tracing::info!(story_id = %story.id, author_id = %story.author_id, "story published");
                Ok(story)
            }
            Err(err) => {
                tracing::warn!(error = %err, "story insert failed, removing uploaded media");
                self.discard(&uploaded).await;
                Err(err)
            }
        }
    }

    /// Unexpired stories, newest first.
    pub async fn list_active(&self) -> Result<Vec<Story>, AppError> {
        let now = Utc::now();
        let query = RowQuery::table(STORIES_TABLE)
            .filter(Filter::Gt("expires_at".into(), format_timestamp(&now)))
            .order_by("created_at", false);
        let rows = bounded(self.timeout, STORIES_TABLE, self.remote.list(&query)).await?;
        Ok(rows
            .iter()
            .filter_map(|row| match decode_story(row) {
                Ok(story) => Some(story),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping undecodable story row");
                    None
                }
            })
            .filter(|story| story.is_active_at(now))
            .collect())
    }

    /// Removes the row, then its blobs. Blob failures are logged only.
    pub async fn delete(&self, story_id: &str) -> Result<(), AppError> {
        let query = RowQuery::table(STORIES_TABLE)
            .filter(Filter::eq("id", story_id))
            .limit(1);
        let rows = bounded(self.timeout, STORIES_TABLE, self.remote.list(&query)).await?;
        let story = rows
            .first()
            .ok_or_else(|| AppError::NotFound(format!("story {story_id}")))
            .and_then(decode_story)?;

        bounded(
            self.timeout,
            STORIES_TABLE,
            self.remote.remove(STORIES_TABLE, &Filter::eq("id", story_id)),
        )
        .await?;

        let mut paths = vec![story.media_path.clone()];
        paths.extend(story.thumbnail_path.clone());
        self.discard(&paths).await;
        Ok(())
    }

    async fn discard(&self, paths: &[String]) {
        if paths.is_empty() {
            return;
        }
        if let Err(err) = self.storage.remove(&self.bucket, paths).await {
            tracing::error!(?paths, error = %err, "failed to remove story media");
        }
    }
}

fn validate_draft(draft: &StoryDraft) -> Result<(MediaType, Option<String>), AppError> {
    let mut errors = ValidationErrors::new();
    if draft.author_id.trim().is_empty() {
        errors.push(
            "author_id",
            ValidationFailureKind::Required,
            "Sign in to post a story",
        );
    }

    let media_type = MediaType::from_content_type(&draft.media.content_type);
    match media_type {
        None => errors.push(
            "media",
            ValidationFailureKind::UnsupportedMedia,
            format!("{} is not an image or video", draft.media.content_type),
        ),
        Some(_) if draft.media.data.is_empty() => {
            errors.push("media", ValidationFailureKind::Required, "Media is required")
        }
        Some(_) if draft.media.data.len() > MAX_MEDIA_BYTES => errors.push(
            "media",
            ValidationFailureKind::ContentTooLarge,
            format!("Media must be at most {} MiB", MAX_MEDIA_BYTES / (1024 * 1024)),
        ),
        Some(_) => {}
    }
    if media_type == Some(MediaType::Video)
        && draft.duration_secs.is_some_and(|secs| secs > MAX_VIDEO_SECONDS)
    {
        errors.push(
            "duration_secs",
            ValidationFailureKind::ContentTooLarge,
            format!("Videos must be at most {MAX_VIDEO_SECONDS} seconds"),
        );
    }
    if let Some(thumbnail) = &draft.thumbnail {
        if MediaType::from_content_type(&thumbnail.content_type) != Some(MediaType::Image) {
            errors.push(
                "thumbnail",
                ValidationFailureKind::UnsupportedMedia,
                "Thumbnails must be images",
            );
        }
    }

    let caption = match draft.caption.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            check_text(&mut errors, "caption", raw, 1, MAX_CAPTION_LENGTH)
        }
        _ => None,
    };

    errors.into_result()?;
    match media_type {
        Some(media_type) => Ok((media_type, caption)),
        None => Err(AppError::Internal("media type vanished after validation".into())),
    }
}

fn extension(content_type: &str) -> String {
    let subtype = content_type
        .split(';')
        .next()
        .and_then(|essence| essence.split('/').nth(1))
        .unwrap_or("bin")
        .trim()
        .to_ascii_lowercase();
    match subtype.as_str() {
        "jpeg" => "jpg".to_string(),
        "quicktime" => "mov".to_string(),
        other if !other.is_empty() && other.chars().all(|c| c.is_ascii_alphanumeric()) => {
            other.to_string()
        }
        _ => "bin".to_string(),
    }
}
