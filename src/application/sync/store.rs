use super::collection::{DedupPolicy, OptimisticCollection};
use crate::domain::entities::{SyncPayload, SyncedItem};
use crate::shared::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{watch, RwLock};

/// UI に渡す読み取り専用のスナップショット
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<P> {
    pub items: Vec<SyncedItem<P>>,
    pub loading: bool,
    pub error: Option<AppError>,
}

impl<P> Default for ResourceState<P> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            error: None,
        }
    }
}

/// Owns one collection and publishes a snapshot after every mutation.
/// Once torn down, all writes are discarded.
pub struct ResourceStore<P> {
    collection: RwLock<OptimisticCollection<P>>,
    state: watch::Sender<ResourceState<P>>,
    torn_down: AtomicBool,
}

impl<P: SyncPayload> ResourceStore<P> {
    pub fn new(dedup: DedupPolicy) -> Self {
        let (state, _) = watch::channel(ResourceState::default());
        Self {
            collection: RwLock::new(OptimisticCollection::new(dedup)),
            state,
            torn_down: AtomicBool::new(false),
        }
    }

    pub async fn mutate<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut OptimisticCollection<P>) -> R,
    {
        if self.is_torn_down() {
            return None;
        }
        let mut collection = self.collection.write().await;
        if self.is_torn_down() {
            return None;
        }
        let result = f(&mut collection);
        let items = collection.items();
        self.state.send_modify(|state| state.items = items);
        Some(result)
    }

    pub async fn read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&OptimisticCollection<P>) -> R,
    {
        let collection = self.collection.read().await;
        f(&collection)
    }

    pub fn set_loading(&self, loading: bool) {
        if self.is_torn_down() {
            return;
        }
        self.state.send_if_modified(|state| {
            let changed = state.loading != loading;
            state.loading = loading;
            changed
        });
    }

    pub fn record_error(&self, error: AppError) {
        if self.is_torn_down() {
            return;
        }
        self.state.send_modify(|state| state.error = Some(error));
    }

    pub fn clear_error(&self) {
        if self.is_torn_down() {
            return;
        }
        self.state.send_if_modified(|state| state.error.take().is_some());
    }

    pub fn tear_down(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState<P>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ResourceState<P> {
        self.state.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Comment;
    use crate::domain::value_objects::ItemId;
    use chrono::Utc;

    fn comment_item(id: &str) -> SyncedItem<Comment> {
        SyncedItem::confirmed(
            ItemId::new(id).unwrap(),
            "P1",
            Comment::new("P1", "u1", "hello"),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn mutations_publish_snapshots() {
        let store = ResourceStore::new(DedupPolicy::ExactId);
        let mut rx = store.subscribe();

        store
            .mutate(|collection| collection.apply_remote_upsert(comment_item("c1")))
            .await;

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().items.len(), 1);
    }

    #[tokio::test]
    async fn torn_down_store_discards_writes() {
        let store = ResourceStore::new(DedupPolicy::ExactId);
        store.tear_down();

        let applied = store
            .mutate(|collection| collection.apply_remote_upsert(comment_item("c1")))
            .await;
        store.record_error(AppError::Internal("late".into()));

        assert!(applied.is_none());
        let state = store.state();
        assert!(state.items.is_empty());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn error_can_be_recorded_and_cleared() {
        let store: ResourceStore<Comment> = ResourceStore::new(DedupPolicy::ExactId);
        store.record_error(AppError::Internal("boom".into()));
        assert!(store.state().error.is_some());
        store.clear_error();
        assert!(store.state().error.is_none());
    }
}
