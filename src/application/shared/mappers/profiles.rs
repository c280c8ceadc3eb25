use super::row::{optional_str, optional_u64, required_str};
use crate::application::ports::Row;
use crate::domain::entities::Profile;
use crate::shared::error::AppError;

pub fn decode_profile(row: &Row) -> Result<Profile, AppError> {
    Ok(Profile {
        id: required_str(row, "id")?,
        username: required_str(row, "username")?,
        display_name: optional_str(row, "display_name"),
        avatar_url: optional_str(row, "avatar_url"),
        bio: optional_str(row, "bio"),
        followers_count: optional_u64(row, "followers_count"),
    })
}

/// 結合済みプロフィールが壊れていても本体の行は捨てない
pub fn decode_embedded_profile(row: &Row, key: &str) -> Option<Profile> {
    super::row::nested_row(row, key).and_then(|nested| decode_profile(nested).ok())
}
