use crate::application::ports::{Filter, RemoteDataGateway, RowQuery};
use crate::application::shared::bounded;
use crate::application::shared::mappers::decode_post;
use crate::application::shared::mappers::row::format_timestamp;
use crate::domain::entities::Post;
use crate::shared::error::AppError;
use chrono::{DateTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const POSTS_TABLE: &str = "posts";
const POSTS_SELECT: &str = "*, author:profiles!user_id(*)";
pub const MAX_PAGE_SIZE: usize = 50;
/// Extra rows fetched to cover posts sharing the cursor's millisecond.
const TIE_SLACK: usize = 16;

/// `"<created_at_millis>:<id>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCursor {
    pub created_at: i64,
    pub post_id: String,
}

impl FeedCursor {
    pub fn parse(cursor: &str) -> Option<Self> {
        let mut parts = cursor.splitn(2, ':');
        let created_at = parts.next()?.parse().ok()?;
        let post_id = parts.next()?.to_string();
        if post_id.is_empty() {
            return None;
        }
        Some(Self {
            created_at,
            post_id,
        })
    }

    pub fn for_post(post: &Post) -> Self {
        Self {
            created_at: post.created_at.timestamp_millis(),
            post_id: post.id.clone(),
        }
    }

    /// 新しい順で、このカーソルより後ろに来る投稿か
    fn precedes(&self, post: &Post) -> bool {
        match post.created_at.timestamp_millis().cmp(&self.created_at) {
            Ordering::Less => true,
            Ordering::Equal => post.id.as_str() < self.post_id.as_str(),
            Ordering::Greater => false,
        }
    }

    fn upper_bound(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at.saturating_add(1))
            .single()
    }
}

impl fmt::Display for FeedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.created_at, self.post_id)
    }
}

#[derive(Debug, Clone)]
pub struct FeedPage {
    pub items: Vec<Post>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

pub struct FeedService {
    remote: Arc<dyn RemoteDataGateway>,
    timeout: Duration,
}

impl FeedService {
    pub fn new(remote: Arc<dyn RemoteDataGateway>, timeout: Duration) -> Self {
        Self { remote, timeout }
    }

    /// Newest posts first. An unparsable cursor starts from the top.
    pub async fn page(&self, cursor: Option<&str>, limit: usize) -> Result<FeedPage, AppError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let cursor = match cursor {
            Some(raw) => {
                let parsed = FeedCursor::parse(raw);
                if parsed.is_none() {
                    tracing::warn!(cursor = raw, "ignoring malformed feed cursor");
                }
                parsed
            }
            None => None,
        };

        let mut query = RowQuery::table(POSTS_TABLE)
            .select(POSTS_SELECT)
            .order_by("created_at", false)
            .order_by("id", false)
            .limit(limit + 1 + if cursor.is_some() { TIE_SLACK } else { 0 });
        if let Some(bound) = cursor.as_ref().and_then(FeedCursor::upper_bound) {
            query = query.filter(Filter::Lt("created_at".into(), format_timestamp(&bound)));
        }

        let rows = bounded(self.timeout, POSTS_TABLE, self.remote.list(&query)).await?;
        let mut items: Vec<Post> = rows
            .iter()
            .filter_map(|row| match decode_post(row) {
                Ok(post) => Some(post),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping undecodable post row");
                    None
                }
            })
            .filter(|post| cursor.as_ref().map_or(true, |c| c.precedes(post)))
            .collect();

        let has_more = items.len() > limit;
        items.truncate(limit);
        let next_cursor = if has_more {
            items.last().map(|post| FeedCursor::for_post(post).to_string())
        } else {
            None
        };
        tracing::debug!(count = items.len(), has_more, "loaded feed page");
        Ok(FeedPage {
            items,
            next_cursor,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::shared::tests::{row, MockRemote};
    use serde_json::json;

    fn post_row(id: &str, created_at: &str) -> crate::application::ports::Row {
        row(json!({
            "id": id,
            "user_id": "u1",
            "media_url": format!("https://cdn.example.com/{id}.jpg"),
            "created_at": created_at,
            "likes_count": 3,
            "author": {"id": "u1", "username": "ada"},
        }))
    }

    #[test]
    fn cursor_parses_and_formats() {
        let cursor = FeedCursor::parse("1714557600000:p1").unwrap();
        assert_eq!(cursor.created_at, 1_714_557_600_000);
        assert_eq!(cursor.post_id, "p1");
        assert_eq!(cursor.to_string(), "1714557600000:p1");
        assert!(FeedCursor::parse("abc:p1").is_none());
        assert!(FeedCursor::parse("1714557600000:").is_none());
        assert!(FeedCursor::parse("1714557600000").is_none());
    }

    #[tokio::test]
    async fn first_page_reports_more() {
        let mut remote = MockRemote::new();
        remote
            .expect_list()
            .withf(|query| {
                query.table == "posts" && query.filters.is_empty() && query.limit == Some(3)
            })
            .returning(|_| {
                Ok(vec![
                    post_row("p3", "2024-05-01T10:03:00Z"),
                    post_row("p2", "2024-05-01T10:02:00Z"),
                    post_row("p1", "2024-05-01T10:01:00Z"),
                ])
            });
        let service = FeedService::new(Arc::new(remote), Duration::from_secs(5));

        let page = service.page(None, 2).await.unwrap();
        assert!(page.has_more);
        assert_eq!(
            page.items.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["p3", "p2"]
        );
        assert_eq!(page.items[0].author.as_ref().map(|a| a.username.as_str()), Some("ada"));
        let next = FeedCursor::parse(page.next_cursor.as_deref().unwrap()).unwrap();
        assert_eq!(next.post_id, "p2");
    }

    #[tokio::test]
    async fn next_page_skips_ties_at_the_cursor() {
        let mut remote = MockRemote::new();
        remote
            .expect_list()
            .withf(|query| {
                matches!(
                    query.filters.as_slice(),
                    [Filter::Lt(column, _)] if column == "created_at"
                )
            })
            .returning(|_| {
                Ok(vec![
                    post_row("pc", "2024-05-01T10:02:00Z"),
                    post_row("pb", "2024-05-01T10:02:00Z"),
                    post_row("pa", "2024-05-01T10:02:00Z"),
                    post_row("p1", "2024-05-01T10:01:00Z"),
                ])
            });
        let service = FeedService::new(Arc::new(remote), Duration::from_secs(5));
        let cursor = FeedCursor {
            created_at: Utc
                .with_ymd_and_hms(2024, 5, 1, 10, 2, 0)
                .unwrap()
                .timestamp_millis(),
            post_id: "pb".into(),
        };

        let page = service.page(Some(&cursor.to_string()), 10).await.unwrap();
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
        assert_eq!(
            page.items.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            vec!["pa", "p1"]
        );
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let mut remote = MockRemote::new();
        remote
            .expect_list()
            .withf(|query| query.limit == Some(MAX_PAGE_SIZE + 1))
            .times(1)
            .returning(|_| Ok(vec![]));
        remote
            .expect_list()
            .withf(|query| query.limit == Some(2))
            .times(1)
            .returning(|_| Ok(vec![]));
        let service = FeedService::new(Arc::new(remote), Duration::from_secs(5));

        assert!(service.page(None, 500).await.unwrap().items.is_empty());
        assert!(service.page(Some("garbage"), 0).await.unwrap().items.is_empty());
    }
}
