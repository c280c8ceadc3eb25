mod common;

use bytes::Bytes;
use common::{app, row};
use creatorspace_lib::application::services::{MediaUpload, StoryDraft};
use creatorspace_lib::domain::entities::MediaType;
use creatorspace_lib::infrastructure::memory::FaultPoint;
use creatorspace_lib::AppError;
use serde_json::json;

const BUCKET: &str = "stories";

fn video_draft(duration_secs: u32) -> StoryDraft {
    StoryDraft {
        author_id: "u1".into(),
        media: MediaUpload {
            data: Bytes::from_static(b"\x00\x00\x00\x18ftypmp42"),
            content_type: "video/mp4".into(),
        },
        thumbnail: Some(MediaUpload {
            data: Bytes::from_static(b"\xff\xd8\xff"),
            content_type: "image/jpeg".into(),
        }),
        caption: Some("  golden hour ".into()),
        duration_secs: Some(duration_secs),
    }
}

#[tokio::test]
async fn publish_list_and_delete() {
    let (state, backend) = app().await;

    let story = state.stories.publish(video_draft(15), None).await.unwrap();
    assert_eq!(story.media_type, MediaType::Video);
    assert_eq!(story.caption.as_deref(), Some("golden hour"));
    assert_eq!(backend.object_paths(BUCKET).await.len(), 2);

    // an expired story stays hidden
    backend
        .seed(
            "stories",
            [row(json!({
                "id": "old",
                "user_id": "u2",
                "media_url": "memory://stories/u2/old.jpg",
                "media_path": "u2/old.jpg",
                "media_type": "image",
                "created_at": "2020-01-01T00:00:00Z",
                "expires_at": "2020-01-02T00:00:00Z",
            }))],
        )
        .await;
    let active = state.stories.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, story.id);

    state.stories.delete(&story.id).await.unwrap();
    assert!(state.stories.list_active().await.unwrap().is_empty());
    assert!(backend.object_paths(BUCKET).await.is_empty());
}

#[tokio::test]
async fn failed_insert_removes_uploaded_media() {
    let (state, backend) = app().await;
    backend
        .fail_next(FaultPoint::Create, AppError::remote_status(500, "insert failed"))
        .await;

    assert!(state.stories.publish(video_draft(15), None).await.is_err());
    assert!(backend.object_paths(BUCKET).await.is_empty());
    assert!(backend.rows("stories").await.is_empty());
}

#[tokio::test]
async fn long_video_is_rejected_before_upload() {
    let (state, backend) = app().await;

    let err = state.stories.publish(video_draft(61), None).await.unwrap_err();
    assert!(err.is_validation());
    assert!(backend.object_paths(BUCKET).await.is_empty());
}
