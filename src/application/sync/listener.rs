use super::gateway::ResourceGateway;
use super::kind::ResourceKind;
use super::store::ResourceStore;
use crate::application::ports::remote_gateway::value_as_text;
use crate::application::ports::{ChangeEvent, ChangeKind, Subscription};
use crate::domain::value_objects::{ItemId, Scope};
use crate::shared::config::ReconnectConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Subscribing,
    Active,
    Reconnecting { attempt: u32 },
    /// Feed lost and not recovered; items stay as last seen.
    Stale,
    Unsubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            enabled: config.enabled,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            max_attempts: config.max_attempts,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// 指数バックオフ。`attempt` は 1 始まり。
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }

    fn allows(&self, attempt: u32) -> bool {
        self.enabled && attempt <= self.max_attempts
    }
}

/// Applies pushed row changes for one scope to a store.
pub struct ChangeFeedListener<K: ResourceKind> {
    gateway: ResourceGateway<K>,
    store: Arc<ResourceStore<K::Payload>>,
    scope: Scope,
    policy: ReconnectPolicy,
    state: watch::Sender<ListenerState>,
}

impl<K: ResourceKind> ChangeFeedListener<K> {
    pub fn new(
        gateway: ResourceGateway<K>,
        store: Arc<ResourceStore<K::Payload>>,
        scope: Scope,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Idle);
        Self {
            gateway,
            store,
            scope,
            policy,
            state,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state.borrow().clone()
    }

    /// Subscribes and spawns the event loop. A failed first subscription is
    /// handled like a dropped feed.
    pub async fn start(self) -> ListenerHandle {
        self.state.send_replace(ListenerState::Subscribing);
        let subscription = match self.gateway.subscribe(&self.scope).await {
            Ok(subscription) => {
                tracing::info!(table = K::TABLE, scope = %self.scope, id = subscription.id(), "change feed subscribed");
                self.state.send_replace(ListenerState::Active);
                Some(subscription)
            }
            Err(err) => {
                tracing::warn!(table = K::TABLE, scope = %self.scope, error = %err, "change feed subscription failed");
                None
            }
        };

        let state = self.state.subscribe();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(subscription, stop_rx));
        ListenerHandle {
            state,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Returns whether the store changed.
    pub async fn apply_event(&self, event: ChangeEvent) -> bool {
        if event.table != K::TABLE {
            return false;
        }
        match event.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                let Some(row) = event.new.as_ref() else {
                    return false;
                };
                let item = match K::decode(row) {
                    Ok(item) => item,
                    Err(err) => {
                        tracing::warn!(table = K::TABLE, error = %err, "dropping malformed change event");
                        return false;
                    }
                };
                if !self.scope.matches(&item.parent_key) {
                    tracing::trace!(table = K::TABLE, parent_key = %item.parent_key, "change outside scope");
                    return false;
                }
                let item = self.gateway.normalize(item).await;
                self.store
                    .mutate(|collection| collection.apply_remote_upsert(item))
                    .await
                    .is_some()
            }
            ChangeKind::Delete => {
                let id = event
                    .old
                    .as_ref()
                    .and_then(|row| row.get(K::ID_COLUMN))
                    .and_then(value_as_text)
                    .and_then(|id| ItemId::new(id).ok());
                let Some(id) = id else {
                    return false;
                };
                self.store
                    .mutate(|collection| collection.apply_remote_delete(&id))
                    .await
                    .unwrap_or(false)
            }
        }
    }

    async fn run(self, mut subscription: Option<Subscription>, mut stop: oneshot::Receiver<()>) {
        let mut attempt = 0u32;
        loop {
            if let Some(active) = subscription.as_mut() {
                let next = tokio::select! {
                    _ = &mut stop => None,
                    event = active.next_event() => Some(event),
                };
                match next {
                    None => break,
                    Some(Some(event)) => {
                        if self.store.is_torn_down() {
                            break;
                        }
                        let applied = tokio::select! {
                            _ = &mut stop => false,
                            _ = self.apply_event(event) => true,
                        };
                        if !applied {
                            break;
                        }
                        continue;
                    }
                    Some(None) => {
                        tracing::warn!(table = K::TABLE, scope = %self.scope, "change feed ended");
                        subscription = None;
                    }
                }
            }

            attempt += 1;
            if !self.policy.allows(attempt) {
                self.park_stale().await;
                let _ = (&mut stop).await;
                break;
            }

            self.state
                .send_replace(ListenerState::Reconnecting { attempt });
            let delay = self.policy.backoff_for(attempt);
            tokio::select! {
                _ = &mut stop => break,
                _ = tokio::time::sleep(delay) => {}
            }

            match self.gateway.subscribe(&self.scope).await {
                Ok(resubscribed) => {
                    tracing::info!(table = K::TABLE, scope = %self.scope, attempt, "change feed resubscribed");
                    self.resync().await;
                    self.state.send_replace(ListenerState::Active);
                    subscription = Some(resubscribed);
                    attempt = 0;
                }
                Err(err) => {
                    tracing::warn!(table = K::TABLE, scope = %self.scope, attempt, error = %err, "resubscribe failed");
                }
            }
        }

        drop(subscription);
        self.state.send_replace(ListenerState::Unsubscribed);
        tracing::debug!(table = K::TABLE, scope = %self.scope, "change feed listener stopped");
    }

    async fn resync(&self) {
        match self.gateway.list(&self.scope).await {
            Ok(items) => {
                self.store
                    .mutate(|collection| collection.apply_snapshot(items))
                    .await;
            }
            Err(err) => {
                tracing::warn!(table = K::TABLE, scope = %self.scope, error = %err, "resync after reconnect failed");
            }
        }
    }

    async fn park_stale(&self) {
        tracing::warn!(table = K::TABLE, scope = %self.scope, "change feed is stale");
        self.state.send_replace(ListenerState::Stale);
        self.store.record_error(AppError::Subscription(format!(
            "change feed for {} ({}) was lost",
            K::TABLE,
            self.scope
        )));
    }
}

/// Stops the listener when dropped.
pub struct ListenerHandle {
    state: watch::Receiver<ListenerState>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn state(&self) -> ListenerState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ListenerState> {
        self.state.clone()
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "change feed listener task failed");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[cfg(test)]
mod tests;
