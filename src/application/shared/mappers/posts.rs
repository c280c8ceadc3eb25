use super::profiles::decode_embedded_profile;
use super::row::{optional_str, optional_u64, required_datetime, required_str};
use crate::application::ports::Row;
use crate::domain::entities::{MediaType, Post};
use crate::shared::error::AppError;

pub fn decode_post(row: &Row) -> Result<Post, AppError> {
    let media_type = optional_str(row, "media_type")
        .map(|raw| {
            raw.parse::<MediaType>()
                .map_err(|_| AppError::Deserialization(format!("unknown media_type `{raw}`")))
        })
        .transpose()?
        .unwrap_or(MediaType::Image);
    Ok(Post {
        id: required_str(row, "id")?,
        author_id: required_str(row, "user_id")?,
        caption: optional_str(row, "caption"),
        media_url: required_str(row, "media_url")?,
        media_type,
        like_count: optional_u64(row, "likes_count"),
        comment_count: optional_u64(row, "comments_count"),
        created_at: required_datetime(row, "created_at")?,
        author: decode_embedded_profile(row, "author"),
    })
}
