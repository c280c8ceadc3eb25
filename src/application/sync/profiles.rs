use crate::application::ports::{Filter, RemoteDataGateway, RowQuery};
use crate::application::shared::mappers::decode_profile;
use crate::domain::entities::Profile;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

const PROFILES_TABLE: &str = "profiles";
const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(512) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// 変更フィードに含まれない投稿者プロフィールを補完する
pub struct ProfileDirectory {
    remote: Arc<dyn RemoteDataGateway>,
    cache: Mutex<LruCache<String, Profile>>,
}

impl ProfileDirectory {
    pub fn new(remote: Arc<dyn RemoteDataGateway>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            remote,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached lookup. Failures are logged and yield `None`; a missing author
    /// never blocks the row it belongs to.
    pub async fn resolve(&self, profile_id: &str) -> Option<Profile> {
        if let Some(profile) = self.cache.lock().await.get(profile_id) {
            return Some(profile.clone());
        }

        let query = RowQuery::table(PROFILES_TABLE)
            .filter(Filter::eq("id", profile_id))
            .limit(1);
        let rows = match self.remote.list(&query).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(profile_id, error = %err, "profile lookup failed");
                return None;
            }
        };
        let profile = match rows.first().map(decode_profile) {
            Some(Ok(profile)) => profile,
            Some(Err(err)) => {
                tracing::warn!(profile_id, error = %err, "profile row could not be decoded");
                return None;
            }
            None => return None,
        };

        self.prime(profile.clone()).await;
        Some(profile)
    }

    pub async fn prime(&self, profile: Profile) {
        self.cache.lock().await.put(profile.id.clone(), profile);
    }

    pub async fn invalidate(&self, profile_id: &str) {
        self.cache.lock().await.pop(profile_id);
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::shared::tests::{row, MockRemote};
    use crate::shared::error::AppError;
    use serde_json::json;

    #[tokio::test]
    async fn resolve_hits_backend_once() {
        let mut remote = MockRemote::new();
        remote
            .expect_list()
            .withf(|query| {
                query.table == "profiles" && query.filters == vec![Filter::eq("id", "u1")]
            })
            .times(1)
            .returning(|_| Ok(vec![row(json!({"id": "u1", "username": "ada"}))]));

        let directory = ProfileDirectory::new(Arc::new(remote), 8);
        assert_eq!(directory.resolve("u1").await.unwrap().username, "ada");
        assert_eq!(directory.resolve("u1").await.unwrap().username, "ada");
        assert_eq!(directory.cached_len().await, 1);
    }

    #[tokio::test]
    async fn resolve_swallows_backend_errors() {
        let mut remote = MockRemote::new();
        remote
            .expect_list()
            .returning(|_| Err(AppError::Internal("down".into())));

        let directory = ProfileDirectory::new(Arc::new(remote), 0);
        assert!(directory.resolve("u1").await.is_none());
        assert_eq!(directory.cached_len().await, 0);
    }
}
