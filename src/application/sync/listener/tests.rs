use super::*;
use crate::application::ports::{RemoteDataGateway, Row};
use crate::application::resources::presence::PresenceKind;
use crate::application::shared::tests::{manual_subscription, row, MockRemote};
use crate::application::sync::{DedupPolicy, ProfileDirectory};
use crate::domain::entities::{Presence, PresenceStatus};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;

fn presence_row(user_id: &str, status: &str) -> Row {
    row(json!({"user_id": user_id, "status": status, "last_seen": "2024-05-01T10:00:00Z"}))
}

fn upsert_event(user_id: &str, status: &str) -> ChangeEvent {
    ChangeEvent {
        kind: ChangeKind::Insert,
        table: "user_presence".into(),
        new: Some(presence_row(user_id, status)),
        old: None,
        commit_timestamp: None,
    }
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        enabled: true,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(1),
        max_attempts: 3,
    }
}

struct Fixture {
    listener: ChangeFeedListener<PresenceKind>,
    store: Arc<ResourceStore<Presence>>,
}

fn fixture(remote: MockRemote, policy: ReconnectPolicy) -> Fixture {
    let remote: Arc<dyn RemoteDataGateway> = Arc::new(remote);
    let profiles = Arc::new(ProfileDirectory::new(Arc::clone(&remote), 4));
    let gateway = ResourceGateway::<PresenceKind>::new(remote, profiles, Duration::from_secs(5));
    let store = Arc::new(ResourceStore::new(DedupPolicy::ExactId));
    let scope = Scope::any_of("user_id", ["u1", "u2"]).unwrap();
    let listener = ChangeFeedListener::new(gateway, Arc::clone(&store), scope, policy);
    Fixture { listener, store }
}

/// Hands out queued subscriptions in order; errors once the queue is empty.
fn queued_subscriptions(remote: &mut MockRemote, subscriptions: Vec<Result<Subscription, AppError>>) {
    let queue = StdMutex::new(subscriptions.into_iter().collect::<VecDeque<_>>());
    remote.expect_subscribe_change_feed().returning(move |_| {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Subscription("no more feeds".into())))
    });
}

#[test]
fn backoff_doubles_up_to_the_cap() {
    let policy = ReconnectPolicy {
        enabled: true,
        initial_backoff: Duration::from_millis(500),
        max_backoff: Duration::from_secs(3),
        max_attempts: 5,
    };
    assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
    assert_eq!(policy.backoff_for(2), Duration::from_secs(1));
    assert_eq!(policy.backoff_for(3), Duration::from_secs(2));
    assert_eq!(policy.backoff_for(4), Duration::from_secs(3));
    assert_eq!(policy.backoff_for(40), Duration::from_secs(3));
    assert!(policy.allows(5));
    assert!(!policy.allows(6));
    assert!(!ReconnectPolicy::disabled().allows(1));
}

#[tokio::test]
async fn apply_event_respects_table_and_scope() {
    let Fixture { listener, store } = fixture(MockRemote::new(), fast_policy());

    assert!(listener.apply_event(upsert_event("u1", "online")).await);
    assert!(!listener.apply_event(upsert_event("stranger", "online")).await);

    let mut other_table = upsert_event("u2", "online");
    other_table.table = "messages".into();
    assert!(!listener.apply_event(other_table).await);

    let mut malformed = upsert_event("u2", "online");
    malformed.new = Some(row(json!({"user_id": "u2", "status": "dancing"})));
    assert!(!listener.apply_event(malformed).await);

    let items = store.state().items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].payload.status, PresenceStatus::Online);
}

#[tokio::test]
async fn delete_event_removes_by_id_column() {
    let Fixture { listener, store } = fixture(MockRemote::new(), fast_policy());
    listener.apply_event(upsert_event("u1", "online")).await;

    let delete = ChangeEvent {
        kind: ChangeKind::Delete,
        table: "user_presence".into(),
        new: None,
        old: Some(row(json!({"user_id": "u1"}))),
        commit_timestamp: None,
    };
    assert!(listener.apply_event(delete.clone()).await);
    assert!(store.state().items.is_empty());
    // already gone
    assert!(!listener.apply_event(delete).await);
}

#[tokio::test]
async fn events_after_teardown_are_ignored() {
    let Fixture { listener, store } = fixture(MockRemote::new(), fast_policy());
    store.tear_down();
    assert!(!listener.apply_event(upsert_event("u1", "online")).await);
    assert!(store.state().items.is_empty());
}

#[tokio::test]
async fn pushed_events_reach_the_store() {
    let (feed, subscription) = manual_subscription("sub-1");
    let mut remote = MockRemote::new();
    queued_subscriptions(&mut remote, vec![Ok(subscription)]);
    let Fixture { listener, store } = fixture(remote, fast_policy());

    let handle = listener.start().await;
    assert_eq!(handle.state(), ListenerState::Active);

    let mut state = store.subscribe();
    feed.send(upsert_event("u2", "away")).unwrap();
    state.wait_for(|s| s.items.len() == 1).await.unwrap();

    let mut listener_state = handle.watch();
    handle.stop().await;
    assert_eq!(*listener_state.borrow_and_update(), ListenerState::Unsubscribed);
}

#[tokio::test(start_paused = true)]
async fn dropped_feed_resubscribes_and_resyncs() {
    let (feed, first) = manual_subscription("sub-1");
    let (_feed_two, second) = manual_subscription("sub-2");
    let mut remote = MockRemote::new();
    queued_subscriptions(&mut remote, vec![Ok(first), Ok(second)]);
    remote
        .expect_list()
        .withf(|query| query.table == "user_presence")
        .times(1)
        .returning(|_| Ok(vec![presence_row("u1", "online"), presence_row("u2", "away")]));
    let Fixture { listener, store } = fixture(remote, fast_policy());

    let handle = listener.start().await;
    let mut listener_state = handle.watch();
    let mut state = store.subscribe();

    drop(feed);
    state.wait_for(|s| s.items.len() == 2).await.unwrap();
    listener_state
        .wait_for(|s| *s == ListenerState::Active)
        .await
        .unwrap();
    assert!(store.state().error.is_none());

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_first_subscription_is_retried() {
    let (_feed, subscription) = manual_subscription("sub-2");
    let mut remote = MockRemote::new();
    queued_subscriptions(
        &mut remote,
        vec![Err(AppError::Subscription("join rejected".into())), Ok(subscription)],
    );
    remote.expect_list().returning(|_| Ok(vec![]));
    let Fixture { listener, .. } = fixture(remote, fast_policy());

    let handle = listener.start().await;
    assert_eq!(handle.state(), ListenerState::Subscribing);
    let mut listener_state = handle.watch();
    listener_state
        .wait_for(|s| *s == ListenerState::Active)
        .await
        .unwrap();
    handle.stop().await;
}

#[tokio::test]
async fn disabled_reconnect_goes_stale_and_records_error() {
    let (feed, subscription) = manual_subscription("sub-1");
    let mut remote = MockRemote::new();
    queued_subscriptions(&mut remote, vec![Ok(subscription)]);
    let Fixture { listener, store } = fixture(remote, ReconnectPolicy::disabled());

    let handle = listener.start().await;
    let mut state = store.subscribe();
    drop(feed);

    state.wait_for(|s| s.error.is_some()).await.unwrap();
    assert!(matches!(store.state().error, Some(AppError::Subscription(_))));
    assert_eq!(handle.state(), ListenerState::Stale);

    let mut listener_state = handle.watch();
    handle.stop().await;
    assert_eq!(*listener_state.borrow_and_update(), ListenerState::Unsubscribed);
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_go_stale() {
    let (feed, subscription) = manual_subscription("sub-1");
    let mut remote = MockRemote::new();
    queued_subscriptions(&mut remote, vec![Ok(subscription)]);
    let Fixture { listener, store } = fixture(remote, fast_policy());

    let handle = listener.start().await;
    let mut listener_state = handle.watch();
    drop(feed);

    listener_state
        .wait_for(|s| *s == ListenerState::Stale)
        .await
        .unwrap();
    assert!(matches!(store.state().error, Some(AppError::Subscription(_))));
    handle.stop().await;
}
