use crate::domain::entities::{SyncPayload, SyncedItem};
use crate::domain::value_objects::ItemId;
use crate::shared::config::{DedupMode, SyncConfig};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;

/// 受信した行と未確定のローカル挿入をどう突き合わせるか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// id の完全一致のみ。確定前の一時的な重複は許容する。
    #[default]
    ExactId,
    /// 同じ親・同じ内容で `window` 内に作成された楽観的アイテムを置き換える。
    Heuristic { window: Duration },
}

impl DedupPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        match config.dedup_mode {
            DedupMode::ExactId => DedupPolicy::ExactId,
            DedupMode::Heuristic => DedupPolicy::Heuristic {
                window: Duration::from_secs(config.dedup_window_secs),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// A pending optimistic item was taken over by the pushed row.
    SupersededOptimistic,
}

#[derive(Debug, Clone, PartialEq)]
struct Entry<P> {
    item: SyncedItem<P>,
    seq: u64,
}

/// Ordered by `created_at`, ties broken by insertion order.
#[derive(Debug, Clone)]
pub struct OptimisticCollection<P> {
    entries: Vec<Entry<P>>,
    next_seq: u64,
    dedup: DedupPolicy,
}

impl<P> PartialEq for OptimisticCollection<P>
where
    P: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<P: SyncPayload> Default for OptimisticCollection<P> {
    fn default() -> Self {
        Self::new(DedupPolicy::default())
    }
}

impl<P: SyncPayload> OptimisticCollection<P> {
    pub fn new(dedup: DedupPolicy) -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
            dedup,
        }
    }

    pub fn dedup_policy(&self) -> DedupPolicy {
        self.dedup
    }

    pub fn insert_optimistic(&mut self, parent_key: impl Into<String>, payload: P) -> ItemId {
        self.insert_optimistic_at(parent_key, payload, Utc::now())
    }

    pub fn insert_optimistic_at(
        &mut self,
        parent_key: impl Into<String>,
        payload: P,
        created_at: DateTime<Utc>,
    ) -> ItemId {
        let item = SyncedItem::optimistic(parent_key, payload, created_at);
        let id = item.id.clone();
        let seq = self.take_seq();
        self.place(Entry { item, seq });
        id
    }

    /// 一時 id のアイテムをサーバー確定版に置き換える。一時 id が無ければ何もしない。
    pub fn reconcile(&mut self, temp_id: &ItemId, server_item: SyncedItem<P>) -> bool {
        let Some(temp_index) = self.position(temp_id) else {
            tracing::debug!(temp_id = %temp_id, "reconcile skipped, temporary item already gone");
            return false;
        };
        let temp = self.entries.remove(temp_index);
        let mut server_item = server_item;
        server_item.is_optimistic = false;

        match self.position(&server_item.id) {
            Some(existing) => {
                // the change feed delivered the row first; keep its slot
                let seq = self.entries.remove(existing).seq;
                self.place(Entry {
                    item: server_item,
                    seq,
                });
            }
            None => self.place(Entry {
                item: server_item,
                seq: temp.seq,
            }),
        }
        true
    }

    /// 楽観的アイテムのみ取り除く。確定済みのアイテムには触れない。
    pub fn rollback(&mut self, temp_id: &ItemId) -> bool {
        match self.position(temp_id) {
            Some(index) if self.entries[index].item.is_optimistic => {
                self.entries.remove(index);
                true
            }
            _ => false,
        }
    }

    pub fn apply_remote_upsert(&mut self, item: SyncedItem<P>) -> UpsertOutcome {
        let mut item = item;
        item.is_optimistic = false;

        if let Some(index) = self.position(&item.id) {
            let seq = self.entries.remove(index).seq;
            self.place(Entry { item, seq });
            return UpsertOutcome::Replaced;
        }

        if let Some(index) = self.find_superseded(&item) {
            let pending = self.entries.remove(index);
            tracing::debug!(
                temp_id = %pending.item.id,
                server_id = %item.id,
                "pushed row supersedes optimistic item"
            );
            self.place(Entry {
                item,
                seq: pending.seq,
            });
            return UpsertOutcome::SupersededOptimistic;
        }

        let seq = self.take_seq();
        self.place(Entry { item, seq });
        UpsertOutcome::Inserted
    }

    pub fn apply_remote_delete(&mut self, id: &ItemId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Replaces confirmed state with `items`; pending optimistic items survive.
    pub fn apply_snapshot(&mut self, items: Vec<SyncedItem<P>>) {
        let incoming: HashSet<ItemId> = items.iter().map(|item| item.id.clone()).collect();
        self.entries
            .retain(|entry| entry.item.is_optimistic || incoming.contains(&entry.item.id));
        for item in items {
            self.apply_remote_upsert(item);
        }
    }

    pub fn items(&self) -> Vec<SyncedItem<P>> {
        self.entries.iter().map(|entry| entry.item.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncedItem<P>> {
        self.entries.iter().map(|entry| &entry.item)
    }

    pub fn get(&self, id: &ItemId) -> Option<&SyncedItem<P>> {
        self.entries
            .iter()
            .find(|entry| &entry.item.id == id)
            .map(|entry| &entry.item)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.item.is_optimistic)
            .count()
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn position(&self, id: &ItemId) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.item.id == id)
    }

    fn place(&mut self, entry: Entry<P>) {
        let key = (entry.item.created_at, entry.seq);
        let index = self
            .entries
            .partition_point(|existing| (existing.item.created_at, existing.seq) < key);
        self.entries.insert(index, entry);
    }

    fn find_superseded(&self, pushed: &SyncedItem<P>) -> Option<usize> {
        let DedupPolicy::Heuristic { window } = self.dedup else {
            return None;
        };
        let fingerprint = pushed.payload.fingerprint()?;
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);

        self.entries.iter().position(|entry| {
            let candidate = &entry.item;
            candidate.is_optimistic
                && candidate.parent_key == pushed.parent_key
                && (candidate.created_at_millis() - pushed.created_at_millis()).abs() <= window_ms
                && candidate.payload.fingerprint().as_deref() == Some(fingerprint.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note(String);

    impl SyncPayload for Note {
        fn fingerprint(&self) -> Option<String> {
            Some(self.0.clone())
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn confirmed(id: &str, text: &str, secs: i64) -> SyncedItem<Note> {
        SyncedItem::confirmed(ItemId::new(id).unwrap(), "P1", Note(text.into()), at(secs))
    }

    fn ids(collection: &OptimisticCollection<Note>) -> Vec<String> {
        collection.iter().map(|item| item.id.to_string()).collect()
    }

    #[test]
    fn optimistic_then_confirm_keeps_one_item() {
        let mut collection = OptimisticCollection::default();
        let temp = collection.insert_optimistic_at("P1", Note("hi".into()), at(0));
        assert_eq!(collection.len(), 1);
        assert!(collection.get(&temp).unwrap().is_optimistic);

        assert!(collection.reconcile(&temp, confirmed("c1", "hi", 0)));

        assert_eq!(ids(&collection), vec!["c1"]);
        assert!(!collection.iter().next().unwrap().is_optimistic);
        assert!(!collection.contains(&temp));
    }

    #[test]
    fn rollback_restores_prior_state() {
        let mut collection = OptimisticCollection::default();
        collection.apply_remote_upsert(confirmed("c1", "a", 0));
        let before = collection.clone();

        let temp = collection.insert_optimistic_at("P1", Note("b".into()), at(1));
        assert!(collection.rollback(&temp));
        assert_eq!(collection, before);
    }

    #[test]
    fn rollback_never_removes_confirmed_items() {
        let mut collection = OptimisticCollection::default();
        collection.apply_remote_upsert(confirmed("c1", "a", 0));
        assert!(!collection.rollback(&ItemId::new("c1").unwrap()));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn remote_upsert_is_idempotent() {
        let mut collection = OptimisticCollection::default();
        assert_eq!(
            collection.apply_remote_upsert(confirmed("c1", "a", 0)),
            UpsertOutcome::Inserted
        );
        let once = collection.clone();
        assert_eq!(
            collection.apply_remote_upsert(confirmed("c1", "a", 0)),
            UpsertOutcome::Replaced
        );
        assert_eq!(collection, once);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut collection = OptimisticCollection::default();
        collection.apply_remote_upsert(confirmed("b", "x", 5));
        collection.apply_remote_upsert(confirmed("a", "y", 5));
        collection.apply_remote_upsert(confirmed("early", "z", 1));
        assert_eq!(ids(&collection), vec!["early", "b", "a"]);
    }

    #[test]
    fn update_keeps_tie_position() {
        let mut collection = OptimisticCollection::default();
        collection.apply_remote_upsert(confirmed("a", "x", 5));
        collection.apply_remote_upsert(confirmed("b", "y", 5));
        collection.apply_remote_upsert(confirmed("a", "edited", 5));
        assert_eq!(ids(&collection), vec!["a", "b"]);
        assert_eq!(collection.iter().next().unwrap().payload, Note("edited".into()));
    }

    #[test]
    fn delete_of_absent_id_is_noop() {
        let mut collection = OptimisticCollection::default();
        collection.apply_remote_upsert(confirmed("c1", "a", 0));
        let before = collection.clone();
        assert!(!collection.apply_remote_delete(&ItemId::new("nope").unwrap()));
        assert_eq!(collection, before);
        assert!(collection.apply_remote_delete(&ItemId::new("c1").unwrap()));
        assert!(collection.is_empty());
    }

    #[test]
    fn exact_id_policy_tolerates_transient_duplicate() {
        let mut collection = OptimisticCollection::new(DedupPolicy::ExactId);
        let temp = collection.insert_optimistic_at("P1", Note("hi".into()), at(0));
        collection.apply_remote_upsert(confirmed("c1", "hi", 0));
        assert_eq!(collection.len(), 2);

        assert!(collection.reconcile(&temp, confirmed("c1", "hi", 0)));
        assert_eq!(ids(&collection), vec!["c1"]);
    }

    #[test]
    fn push_during_pending_send_orders_by_created_at() {
        let mut collection = OptimisticCollection::default();
        let temp = collection.insert_optimistic_at("P1", Note("mine".into()), at(2));
        collection.apply_remote_upsert(confirmed("theirs", "other", 1));
        assert!(collection.reconcile(&temp, confirmed("c9", "mine", 3)));
        assert_eq!(ids(&collection), vec!["theirs", "c9"]);
    }

    #[test]
    fn heuristic_policy_supersedes_matching_optimistic_item() {
        let mut collection = OptimisticCollection::new(DedupPolicy::Heuristic {
            window: Duration::from_secs(10),
        });
        let temp = collection.insert_optimistic_at("P1", Note("hi".into()), at(0));
        assert_eq!(
            collection.apply_remote_upsert(confirmed("c1", "hi", 2)),
            UpsertOutcome::SupersededOptimistic
        );
        assert_eq!(ids(&collection), vec!["c1"]);

        assert!(!collection.reconcile(&temp, confirmed("c1", "hi", 2)));
        assert_eq!(ids(&collection), vec!["c1"]);
    }

    #[test]
    fn heuristic_policy_ignores_rows_outside_window_or_scope() {
        let mut collection = OptimisticCollection::new(DedupPolicy::Heuristic {
            window: Duration::from_secs(10),
        });
        collection.insert_optimistic_at("P1", Note("hi".into()), at(0));
        collection.apply_remote_upsert(confirmed("late", "hi", 60));
        let other_scope =
            SyncedItem::confirmed(ItemId::new("elsewhere").unwrap(), "P2", Note("hi".into()), at(0));
        collection.apply_remote_upsert(other_scope);
        assert_eq!(collection.len(), 3);
        assert_eq!(collection.pending_count(), 1);
    }

    #[test]
    fn snapshot_drops_missing_confirmed_and_keeps_pending() {
        let mut collection = OptimisticCollection::default();
        collection.apply_remote_upsert(confirmed("gone", "a", 0));
        collection.apply_remote_upsert(confirmed("kept", "b", 1));
        let temp = collection.insert_optimistic_at("P1", Note("c".into()), at(2));

        collection.apply_snapshot(vec![confirmed("kept", "b2", 1), confirmed("new", "d", 3)]);

        assert_eq!(
            ids(&collection),
            vec!["kept".to_string(), temp.to_string(), "new".to_string()]
        );
        assert_eq!(
            collection.get(&ItemId::new("kept").unwrap()).unwrap().payload,
            Note("b2".into())
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Optimistic(i64),
        Upsert(u8, i64),
        Delete(u8),
        RollbackFirstPending,
        ReconcileFirstPending(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0i64..20).prop_map(Op::Optimistic),
            (0u8..8, 0i64..20).prop_map(|(id, secs)| Op::Upsert(id, secs)),
            (0u8..8).prop_map(Op::Delete),
            Just(Op::RollbackFirstPending),
            (0u8..8).prop_map(Op::ReconcileFirstPending),
        ]
    }

    fn first_pending(collection: &OptimisticCollection<Note>) -> Option<ItemId> {
        collection
            .iter()
            .find(|item| item.is_optimistic)
            .map(|item| item.id.clone())
    }

    fn apply(collection: &mut OptimisticCollection<Note>, op: &Op) {
        match op {
            Op::Optimistic(secs) => {
                collection.insert_optimistic_at("P1", Note("n".into()), at(*secs));
            }
            Op::Upsert(id, secs) => {
                collection.apply_remote_upsert(confirmed(&format!("s{id}"), "n", *secs));
            }
            Op::Delete(id) => {
                collection.apply_remote_delete(&ItemId::new(format!("s{id}")).unwrap());
            }
            Op::RollbackFirstPending => {
                if let Some(id) = first_pending(collection) {
                    collection.rollback(&id);
                }
            }
            Op::ReconcileFirstPending(server) => {
                if let Some(id) = first_pending(collection) {
                    let secs = collection.get(&id).map(|i| i.created_at.timestamp()).unwrap();
                    let item = SyncedItem::confirmed(
                        ItemId::new(format!("s{server}")).unwrap(),
                        "P1",
                        Note("n".into()),
                        Utc.timestamp_opt(secs, 0).unwrap(),
                    );
                    collection.reconcile(&id, item);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn ordering_and_unique_ids_hold(ops in proptest::collection::vec(op_strategy(), 0..40)) {
            let mut collection = OptimisticCollection::default();
            for op in &ops {
                apply(&mut collection, op);
                let items = collection.items();
                prop_assert!(items.windows(2).all(|w| w[0].created_at <= w[1].created_at));
                let unique: HashSet<_> = items.iter().map(|item| item.id.clone()).collect();
                prop_assert_eq!(unique.len(), items.len());
            }
        }

        #[test]
        fn rollback_after_any_history_restores_state(
            ops in proptest::collection::vec(op_strategy(), 0..30),
            secs in 0i64..20,
        ) {
            let mut collection = OptimisticCollection::default();
            for op in &ops {
                apply(&mut collection, op);
            }
            let before = collection.clone();
            let temp = collection.insert_optimistic_at("P1", Note("x".into()), at(secs));
            prop_assert!(collection.rollback(&temp));
            prop_assert_eq!(collection, before);
        }
    }
}
