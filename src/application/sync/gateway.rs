use super::kind::ResourceKind;
use super::profiles::ProfileDirectory;
use crate::application::ports::{
    ChangeFilter, Filter, RemoteDataGateway, Row, RowQuery, Subscription,
};
use crate::application::shared::bounded;
use crate::domain::entities::SyncedItem;
use crate::domain::value_objects::{ItemId, Scope, ScopeKey};
use crate::shared::error::AppError;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// 型付きのリソース単位ゲートウェイ。すべての呼び出しはタイムアウト付き。
pub struct ResourceGateway<K: ResourceKind> {
    remote: Arc<dyn RemoteDataGateway>,
    profiles: Arc<ProfileDirectory>,
    timeout: Duration,
    page_size: usize,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> Clone for ResourceGateway<K> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            profiles: Arc::clone(&self.profiles),
            timeout: self.timeout,
            page_size: self.page_size,
            _kind: PhantomData,
        }
    }
}

impl<K: ResourceKind> ResourceGateway<K> {
    pub fn new(
        remote: Arc<dyn RemoteDataGateway>,
        profiles: Arc<ProfileDirectory>,
        timeout: Duration,
    ) -> Self {
        Self {
            remote,
            profiles,
            timeout,
            page_size: 200,
            _kind: PhantomData,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn scope_filter(scope: &Scope) -> Filter {
        match scope.key() {
            ScopeKey::One(key) => Filter::Eq(scope.column().to_string(), key.clone()),
            ScopeKey::Many(keys) => Filter::In(scope.column().to_string(), keys.clone()),
        }
    }

    /// Current rows for `scope`, oldest first. Undecodable rows are skipped.
    pub async fn list(&self, scope: &Scope) -> Result<Vec<SyncedItem<K::Payload>>, AppError> {
        let query = RowQuery::table(K::TABLE)
            .select(K::SELECT)
            .filter(Self::scope_filter(scope))
            .order_by(K::ORDER_COLUMN, true)
            .limit(self.page_size);
        let rows = self.bounded(self.remote.list(&query)).await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            match K::decode(row) {
                Ok(item) => items.push(self.normalize(item).await),
                Err(err) => {
                    tracing::warn!(table = K::TABLE, scope = %scope, error = %err, "skipping undecodable row");
                }
            }
        }
        Ok(items)
    }

    pub async fn create(
        &self,
        scope: &Scope,
        payload: &K::Payload,
    ) -> Result<SyncedItem<K::Payload>, AppError> {
        Self::ensure_in_scope(scope, K::parent_key(payload))?;
        let row = self.bounded(self.remote.create(K::TABLE, K::encode(payload))).await?;
        self.decode_normalized(&row).await
    }

    pub async fn update(
        &self,
        scope: &Scope,
        id: &ItemId,
        patch: &K::Patch,
    ) -> Result<SyncedItem<K::Payload>, AppError> {
        tracing::debug!(table = K::TABLE, scope = %scope, id = %id, "updating row");
        let target = Filter::eq(K::ID_COLUMN, id.as_str());
        let row = self
            .bounded(self.remote.update(K::TABLE, &target, K::encode_patch(patch)))
            .await?;
        self.decode_normalized(&row).await
    }

    pub async fn upsert(
        &self,
        scope: &Scope,
        payload: &K::Payload,
    ) -> Result<SyncedItem<K::Payload>, AppError> {
        Self::ensure_in_scope(scope, K::parent_key(payload))?;
        let row = self
            .bounded(self.remote.upsert(K::TABLE, K::encode(payload), K::ID_COLUMN))
            .await?;
        self.decode_normalized(&row).await
    }

    pub async fn remove(&self, scope: &Scope, id: &ItemId) -> Result<(), AppError> {
        tracing::debug!(table = K::TABLE, scope = %scope, id = %id, "removing row");
        let target = Filter::eq(K::ID_COLUMN, id.as_str());
        self.bounded(self.remote.remove(K::TABLE, &target)).await
    }

    pub async fn subscribe(&self, scope: &Scope) -> Result<Subscription, AppError> {
        let filter = ChangeFilter {
            table: K::TABLE.to_string(),
            filter: Some(Self::scope_filter(scope)),
        };
        self.bounded(self.remote.subscribe_change_feed(filter)).await
    }

    /// Fills in the joined author the change feed leaves out. The lookup is
    /// bounded by the mutation timeout; on expiry the item goes on without it.
    pub async fn normalize(&self, mut item: SyncedItem<K::Payload>) -> SyncedItem<K::Payload> {
        let Some(author_id) = K::author_to_resolve(&item.payload).map(str::to_string) else {
            return item;
        };
        match tokio::time::timeout(self.timeout, self.profiles.resolve(&author_id)).await {
            Ok(Some(profile)) => K::attach_author(&mut item.payload, profile),
            Ok(None) => {}
            Err(_) => {
                tracing::warn!(
                    table = K::TABLE,
                    author_id = %author_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "author lookup timed out"
                );
            }
        }
        item
    }

    pub async fn decode_normalized(&self, row: &Row) -> Result<SyncedItem<K::Payload>, AppError> {
        let item = K::decode(row)?;
        Ok(self.normalize(item).await)
    }

    fn ensure_in_scope(scope: &Scope, parent_key: &str) -> Result<(), AppError> {
        if scope.matches(parent_key) {
            Ok(())
        } else {
            Err(AppError::Internal(format!(
                "{parent_key} is outside of scope {scope}"
            )))
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        bounded(self.timeout, K::TABLE, call).await
    }
}
