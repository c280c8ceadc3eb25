use super::{Profile, SyncPayload};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub author: Option<Profile>,
}

impl Comment {
    pub fn new(
        post_id: impl Into<String>,
        author_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            post_id: post_id.into(),
            author_id: author_id.into(),
            content: content.into(),
            author: None,
        }
    }
}

impl SyncPayload for Comment {
    fn fingerprint(&self) -> Option<String> {
        Some(format!("{}\u{1f}{}", self.author_id, self.content))
    }
}
