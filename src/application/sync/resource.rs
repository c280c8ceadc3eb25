use super::collection::DedupPolicy;
use super::gateway::ResourceGateway;
use super::kind::ResourceKind;
use super::listener::{ChangeFeedListener, ListenerHandle, ListenerState, ReconnectPolicy};
use super::profiles::ProfileDirectory;
use super::store::{ResourceState, ResourceStore};
use crate::application::ports::RemoteDataGateway;
use crate::domain::entities::SyncedItem;
use crate::domain::value_objects::{ItemId, Scope};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOptions {
    pub dedup: DedupPolicy,
    pub reconnect: ReconnectPolicy,
    pub mutation_timeout: Duration,
    pub page_size: usize,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ResourceOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            dedup: DedupPolicy::from_config(&config.sync),
            reconnect: ReconnectPolicy::from_config(&config.realtime.reconnect),
            mutation_timeout: config.mutation_timeout(),
            page_size: config.sync.initial_page_size as usize,
        }
    }
}

/// 楽観的更新とリアルタイム反映をまとめた機能単位
/// (投稿のコメント、会話のメッセージ、ユーザー群のプレゼンス)。
pub struct SyncedResource<K: ResourceKind> {
    scope: Scope,
    gateway: ResourceGateway<K>,
    store: Arc<ResourceStore<K::Payload>>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl<K: ResourceKind> SyncedResource<K> {
    /// Loads the initial snapshot, then starts the change feed listener.
    /// Load and subscription failures are recorded in the state, not returned.
    pub async fn open(
        remote: Arc<dyn RemoteDataGateway>,
        profiles: Arc<ProfileDirectory>,
        scope: Scope,
        options: ResourceOptions,
    ) -> Self {
        let gateway = ResourceGateway::<K>::new(remote, profiles, options.mutation_timeout)
            .with_page_size(options.page_size);
        let store = Arc::new(ResourceStore::new(options.dedup));
        let resource = Self {
            scope: scope.clone(),
            gateway: gateway.clone(),
            store: Arc::clone(&store),
            listener: Mutex::new(None),
        };

        if let Err(err) = resource.refresh().await {
            tracing::warn!(table = K::TABLE, scope = %scope, error = %err, "initial load failed");
        }

        let listener = ChangeFeedListener::new(gateway, store, scope, options.reconnect);
        let handle = listener.start().await;
        *resource.listener.lock().await = Some(handle);
        resource
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn gateway(&self) -> &ResourceGateway<K> {
        &self.gateway
    }

    pub fn state(&self) -> ResourceState<K::Payload> {
        self.store.state()
    }

    pub fn watch(&self) -> watch::Receiver<ResourceState<K::Payload>> {
        self.store.subscribe()
    }

    pub async fn listener_state(&self) -> ListenerState {
        match self.listener.lock().await.as_ref() {
            Some(handle) => handle.state(),
            None if self.store.is_torn_down() => ListenerState::Unsubscribed,
            None => ListenerState::Idle,
        }
    }

    pub async fn get(&self, id: &ItemId) -> Option<SyncedItem<K::Payload>> {
        self.store
            .read(|collection| collection.get(id).cloned())
            .await
    }

    /// Replaces confirmed items with a fresh listing.
    pub async fn refresh(&self) -> Result<(), AppError> {
        self.store.set_loading(true);
        let result = self.gateway.list(&self.scope).await;
        self.store.set_loading(false);
        match result {
            Ok(items) => {
                tracing::debug!(table = K::TABLE, scope = %self.scope, count = items.len(), "snapshot loaded");
                self.store
                    .mutate(|collection| collection.apply_snapshot(items))
                    .await;
                self.store.clear_error();
                Ok(())
            }
            Err(err) => {
                self.store.record_error(err.clone());
                Err(err)
            }
        }
    }

    pub async fn create(&self, payload: K::Payload) -> Result<SyncedItem<K::Payload>, AppError> {
        let payload = K::validate(payload)?;
        let scope = self.scope.clone();
        let sent = payload.clone();
        self.create_via(payload, move |gateway| async move {
            gateway.create(&scope, &sent).await
        })
        .await
    }

    /// Optimistic insert of `pending`, then `commit` does the remote work.
    /// Rolled back and recorded on failure.
    pub async fn create_via<F, Fut>(
        &self,
        pending: K::Payload,
        commit: F,
    ) -> Result<SyncedItem<K::Payload>, AppError>
    where
        F: FnOnce(ResourceGateway<K>) -> Fut,
        Fut: Future<Output = Result<SyncedItem<K::Payload>, AppError>>,
    {
        let parent_key = K::parent_key(&pending).to_string();
        if !self.scope.matches(&parent_key) {
            return Err(AppError::Internal(format!(
                "{parent_key} is outside of scope {}",
                self.scope
            )));
        }
        self.store.clear_error();

        let temp_id = self
            .store
            .mutate(|collection| collection.insert_optimistic(parent_key, pending))
            .await
            .ok_or_else(Self::closed)?;

        match commit(self.gateway.clone()).await {
            Ok(item) => {
                let confirmed = item.clone();
                self.store
                    .mutate(|collection| collection.reconcile(&temp_id, confirmed))
                    .await;
                Ok(item)
            }
            Err(err) => {
                tracing::warn!(table = K::TABLE, temp_id = %temp_id, error = %err, "create failed, rolling back");
                self.store
                    .mutate(|collection| collection.rollback(&temp_id))
                    .await;
                self.store.record_error(err.clone());
                Err(err)
            }
        }
    }

    pub async fn update(
        &self,
        id: &ItemId,
        patch: K::Patch,
    ) -> Result<SyncedItem<K::Payload>, AppError> {
        self.ensure_open()?;
        self.store.clear_error();
        let result = self.gateway.update(&self.scope, id, &patch).await;
        self.apply_confirmed(result).await
    }

    /// Insert-or-replace keyed on the id column. Not optimistic.
    pub async fn upsert(&self, payload: K::Payload) -> Result<SyncedItem<K::Payload>, AppError> {
        let payload = K::validate(payload)?;
        self.ensure_open()?;
        self.store.clear_error();
        let result = self.gateway.upsert(&self.scope, &payload).await;
        self.apply_confirmed(result).await
    }

    /// Deletion needs an explicit [`DeleteRequest::confirm`].
    pub async fn request_delete(&self, id: &ItemId) -> Result<DeleteRequest<'_, K>, AppError> {
        self.ensure_open()?;
        match self.get(id).await {
            Some(item) if item.is_optimistic => Err(AppError::Internal(format!(
                "{id} is still pending and cannot be deleted"
            ))),
            Some(_) => Ok(DeleteRequest {
                resource: self,
                id: id.clone(),
            }),
            None => Err(AppError::NotFound(format!("{} {id}", K::TABLE))),
        }
    }

    pub fn clear_error(&self) {
        self.store.clear_error();
    }

    /// Stops the listener and tears the store down. Later results are discarded.
    pub async fn close(&self) {
        self.store.tear_down();
        let handle = self.listener.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
        tracing::debug!(table = K::TABLE, scope = %self.scope, "resource closed");
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_torn_down()
    }

    async fn apply_confirmed(
        &self,
        result: Result<SyncedItem<K::Payload>, AppError>,
    ) -> Result<SyncedItem<K::Payload>, AppError> {
        match result {
            Ok(item) => {
                let applied = item.clone();
                self.store
                    .mutate(|collection| collection.apply_remote_upsert(applied))
                    .await;
                Ok(item)
            }
            Err(err) => {
                self.store.record_error(err.clone());
                Err(err)
            }
        }
    }

    async fn remove_confirmed(&self, id: &ItemId) -> Result<(), AppError> {
        self.ensure_open()?;
        self.store.clear_error();
        match self.gateway.remove(&self.scope, id).await {
            Ok(()) => {
                self.store
                    .mutate(|collection| collection.apply_remote_delete(id))
                    .await;
                Ok(())
            }
            Err(err) => {
                self.store.record_error(err.clone());
                Err(err)
            }
        }
    }

    fn ensure_open(&self) -> Result<(), AppError> {
        if self.store.is_torn_down() {
            Err(Self::closed())
        } else {
            Ok(())
        }
    }

    fn closed() -> AppError {
        AppError::Internal(format!("{} resource is closed", K::TABLE))
    }
}

/// 削除の確認待ち。`confirm` されるまでリモートには何も送らない。
#[must_use = "a delete request does nothing until confirmed"]
pub struct DeleteRequest<'a, K: ResourceKind> {
    resource: &'a SyncedResource<K>,
    id: ItemId,
}

impl<K: ResourceKind> DeleteRequest<'_, K> {
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub async fn confirm(self) -> Result<(), AppError> {
        self.resource.remove_confirmed(&self.id).await
    }

    pub fn cancel(self) {
        tracing::debug!(table = K::TABLE, id = %self.id, "delete cancelled");
    }
}
