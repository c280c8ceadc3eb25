use crate::application::ports::{RemoteDataGateway, RowQuery};
use crate::application::shared::bounded;
use crate::application::shared::mappers::{decode_post, decode_profile};
use crate::domain::entities::{Post, Profile};
use crate::infrastructure::cache::TtlCache;
use crate::shared::error::AppError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const SNAPSHOT_KEY: &str = "discovery";
pub const TOP_CREATORS_LIMIT: usize = 10;
pub const TRENDING_POSTS_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoverySnapshot {
    pub top_creators: Vec<Profile>,
    pub trending_posts: Vec<Post>,
}

/// 発見タブ用のスナップショット。TTL内はキャッシュから返す。
pub struct DiscoveryService {
    remote: Arc<dyn RemoteDataGateway>,
    cache: TtlCache<DiscoverySnapshot>,
    timeout: Duration,
}

impl DiscoveryService {
    pub fn new(remote: Arc<dyn RemoteDataGateway>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            remote,
            cache: TtlCache::new(ttl),
            timeout,
        }
    }

    pub async fn snapshot(&self) -> Result<DiscoverySnapshot, AppError> {
        if let Some(cached) = self.cache.get(SNAPSHOT_KEY).await {
            tracing::debug!("discovery served from cache");
            return Ok(cached);
        }
        let snapshot = self.fetch().await?;
        self.cache.set(SNAPSHOT_KEY, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Drops the cached snapshot and fetches a fresh one.
    pub async fn refresh(&self) -> Result<DiscoverySnapshot, AppError> {
        self.cache.invalidate(SNAPSHOT_KEY).await;
        self.snapshot().await
    }

    async fn fetch(&self) -> Result<DiscoverySnapshot, AppError> {
        let creators_query = RowQuery::table("profiles")
            .order_by("followers_count", false)
            .limit(TOP_CREATORS_LIMIT);
        let posts_query = RowQuery::table("posts")
            .select("*, author:profiles!user_id(*)")
            .order_by("likes_count", false)
            .order_by("created_at", false)
            .limit(TRENDING_POSTS_LIMIT);

        let (creators, posts) = tokio::try_join!(
            bounded(self.timeout, "profiles", self.remote.list(&creators_query)),
            bounded(self.timeout, "posts", self.remote.list(&posts_query)),
        )?;

        let top_creators = creators
            .iter()
            .filter_map(|row| decode_profile(row).ok())
            .collect::<Vec<_>>();
        let trending_posts = posts
            .iter()
            .filter_map(|row| decode_post(row).ok())
            .collect::<Vec<_>>();
        tracing::info!(
            creators = top_creators.len(),
            posts = trending_posts.len(),
            "discovery snapshot fetched"
        );
        Ok(DiscoverySnapshot {
            top_creators,
            trending_posts,
        })
    }
}
