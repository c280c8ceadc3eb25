use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let lowered = content_type.trim().to_ascii_lowercase();
        if lowered.starts_with("image/") {
            Some(MediaType::Image)
        } else if lowered.starts_with("video/") {
            Some(MediaType::Video)
        } else {
            None
        }
    }
}

impl FromStr for MediaType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub author_id: String,
    pub media_url: String,
    pub media_path: String,
    pub media_type: MediaType,
    pub thumbnail_url: Option<String>,
    pub thumbnail_path: Option<String>,
    pub caption: Option<String>,
    pub duration_secs: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Story {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
