//! Live list behavior against a real SQLite store.
//!
//! Covers snapshot loading, change-event reconciliation, optimistic removal
//! with rollback, stale-result discarding, and the `run` driver loop.

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;
use tokio::sync::{Notify, oneshot};

use together_core::actions::{add_wish, complete_wish, set_priority};
use together_core::db::SqliteStore;
use together_core::error::TogetherError;
use together_core::filter::WishScope;
use together_core::model::user::NewUser;
use together_core::model::vote::NewVote;
use together_core::model::wish::{Category, CategoryFilter, NewWish, Wish, WishPatch, WishRow};
use together_core::model::{GroupId, UserId, WishId};
use together_core::store::{
    ChangeEvent, JoinSpec, ProfileStore, StoreError, Subscription, WishQuery, WishStore,
};
use together_core::sync::{Applied, IgnoreReason, LiveWishList};

struct Couple {
    store: Rc<SqliteStore>,
    ana: UserId,
    ben: UserId,
    group: GroupId,
}

async fn couple_on(store: SqliteStore) -> Couple {
    let store = Rc::new(store);
    let ana = store
        .create_user(NewUser {
            email: "ana@example.com".into(),
            display_name: "Ana".into(),
        })
        .await
        .expect("ana")
        .id;
    let ben = store
        .create_user(NewUser {
            email: "ben@example.com".into(),
            display_name: "Ben".into(),
        })
        .await
        .expect("ben")
        .id;
    let group = GroupId::for_pair(&ana, &ben);
    store.link_group(&ana, &ben, &group).await.expect("link");
    Couple {
        store,
        ana,
        ben,
        group,
    }
}

async fn couple() -> Couple {
    couple_on(SqliteStore::in_memory().expect("store")).await
}

impl Couple {
    fn scope(&self) -> WishScope {
        WishScope::new(self.group.clone(), CategoryFilter::All, false)
    }

    fn live(&self) -> LiveWishList {
        LiveWishList::new(self.store.clone(), self.scope())
    }

    async fn add(&self, title: &str, category: Category) -> WishRow {
        add_wish(
            self.store.as_ref(),
            NewWish {
                group_id: self.group.clone(),
                category,
                title: title.into(),
                description: None,
                image_url: None,
                source_url: None,
                created_by: self.ana.clone(),
            },
        )
        .await
        .expect("add wish")
    }
}

fn titles(wishes: &[Wish]) -> Vec<String> {
    wishes.iter().map(|w| w.row.title.clone()).collect()
}

fn drain(sub: &mut Subscription<ChangeEvent>) -> Vec<ChangeEvent> {
    std::iter::from_fn(|| sub.try_recv()).collect()
}

/// Store wrapper that counts snapshot queries and can hold them at a gate.
/// The first point lookup can also be held after it has read its row, so
/// its answer is in transit while later writes land.
struct InstrumentedStore {
    inner: Rc<SqliteStore>,
    queries: Cell<usize>,
    gate: Option<Rc<Notify>>,
    lookups: Cell<usize>,
    lookup_gate: Cell<Option<Rc<Notify>>>,
}

impl InstrumentedStore {
    fn new(inner: Rc<SqliteStore>) -> Self {
        Self {
            inner,
            queries: Cell::new(0),
            gate: None,
            lookups: Cell::new(0),
            lookup_gate: Cell::new(None),
        }
    }

    fn holding_first_lookup(inner: Rc<SqliteStore>, gate: Rc<Notify>) -> Self {
        Self {
            lookup_gate: Cell::new(Some(gate)),
            ..Self::new(inner)
        }
    }
}

async fn until_lookup_started(store: &InstrumentedStore) {
    while store.lookups.get() == 0 {
        tokio::task::yield_now().await;
    }
}

#[async_trait(?Send)]
impl WishStore for InstrumentedStore {
    async fn query_wishes(
        &self,
        query: &WishQuery,
        join: JoinSpec,
    ) -> Result<Vec<Wish>, StoreError> {
        self.queries.set(self.queries.get() + 1);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.inner.query_wishes(query, join).await
    }

    async fn wish_by_id(&self, id: &WishId, join: JoinSpec) -> Result<Option<Wish>, StoreError> {
        self.lookups.set(self.lookups.get() + 1);
        let found = self.inner.wish_by_id(id, join).await;
        if let Some(gate) = self.lookup_gate.take() {
            gate.notified().await;
        }
        found
    }

    async fn insert_wish(&self, wish: NewWish) -> Result<WishRow, StoreError> {
        self.inner.insert_wish(wish).await
    }

    async fn update_wish(&self, id: &WishId, patch: &WishPatch) -> Result<WishRow, StoreError> {
        self.inner.update_wish(id, patch).await
    }

    async fn delete_wish(&self, id: &WishId) -> Result<(), StoreError> {
        self.inner.delete_wish(id).await
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<(), StoreError> {
        self.inner.insert_vote(vote).await
    }

    fn subscribe_wishes(&self, group_id: &GroupId) -> Subscription<ChangeEvent> {
        self.inner.subscribe_wishes(group_id)
    }
}

#[tokio::test]
async fn vote_updates_rank_a_wish_to_the_top() {
    let c = couple().await;
    let first = c.add("Lisbon", Category::Places).await;
    c.add("Ramen", Category::Restaurants).await;
    c.add("Dune", Category::Movies).await;

    let list = c.live();
    list.refresh().await.expect("refresh");
    assert_eq!(titles(&list.wishes()), ["Dune", "Ramen", "Lisbon"]);

    let mut sub = c.store.subscribe_wishes(&c.group);
    set_priority(c.store.as_ref(), &first.id, &c.ana, 5)
        .await
        .expect("ana votes");
    set_priority(c.store.as_ref(), &first.id, &c.ben, 3)
        .await
        .expect("ben votes");

    for event in drain(&mut sub) {
        assert_eq!(list.apply_event(event).await, Applied::Updated);
    }

    let wishes = list.wishes();
    assert_eq!(titles(&wishes), ["Lisbon", "Dune", "Ramen"]);
    assert_eq!(wishes[0].average_priority(), Some(4.0));
    assert_eq!(list.view().wishes, wishes);
}

#[tokio::test]
async fn duplicate_insert_is_ignored() {
    let c = couple().await;
    let list = c.live();
    list.refresh().await.expect("refresh");

    let mut sub = c.store.subscribe_wishes(&c.group);
    c.add("Catan", Category::Games).await;
    let events = drain(&mut sub);
    assert_eq!(events.len(), 1);

    assert_eq!(list.apply_event(events[0].clone()).await, Applied::Inserted);
    assert_eq!(
        list.apply_event(events[0].clone()).await,
        Applied::Ignored(IgnoreReason::AlreadyPresent)
    );
    assert_eq!(list.wishes().len(), 1);
    let creator = list.wishes()[0].creator.clone().expect("creator joined");
    assert_eq!(creator.display_name, "Ana");
}

#[tokio::test]
async fn insert_outside_category_is_not_added() {
    let c = couple().await;
    let list = LiveWishList::new(
        c.store.clone(),
        WishScope::new(c.group.clone(), CategoryFilter::Only(Category::Movies), false),
    );
    list.refresh().await.expect("refresh");

    let mut sub = c.store.subscribe_wishes(&c.group);
    c.add("Hades", Category::Games).await;
    for event in drain(&mut sub) {
        assert_eq!(
            list.apply_event(event).await,
            Applied::Ignored(IgnoreReason::NotInScope)
        );
    }
    assert!(list.wishes().is_empty());
}

#[tokio::test]
async fn completing_removes_from_open_list() {
    let c = couple().await;
    let row = c.add("Picnic", Category::Events).await;
    let list = c.live();
    list.refresh().await.expect("refresh");
    assert_eq!(list.wishes().len(), 1);

    let mut sub = c.store.subscribe_wishes(&c.group);
    complete_wish(c.store.as_ref(), &row.id).await.expect("complete");
    for event in drain(&mut sub) {
        assert_eq!(list.apply_event(event).await, Applied::Removed);
    }
    assert!(list.get(&row.id).is_none());

    let done = LiveWishList::new(
        c.store.clone(),
        WishScope::new(c.group.clone(), CategoryFilter::All, true),
    );
    done.refresh().await.expect("refresh done list");
    assert_eq!(titles(&done.wishes()), ["Picnic"]);
}

#[tokio::test]
async fn tombstone_suppresses_late_insert_until_delete() {
    let c = couple().await;
    let list = c.live();
    list.refresh().await.expect("refresh");

    let mut sub = c.store.subscribe_wishes(&c.group);
    let row = c.add("Zoo", Category::Places).await;

    list.delete_wish(&row.id).await.expect("delete");
    assert!(list.is_tombstoned(&row.id));

    let events = drain(&mut sub);
    assert_eq!(events.len(), 2);
    assert_eq!(
        list.apply_event(events[0].clone()).await,
        Applied::Ignored(IgnoreReason::Tombstoned)
    );
    assert!(list.wishes().is_empty());

    list.apply_event(events[1].clone()).await;
    assert!(!list.is_tombstoned(&row.id));
    assert!(list.wishes().is_empty());
}

#[tokio::test]
async fn failed_delete_restores_wish_in_place() {
    let c = couple().await;
    c.add("one", Category::Places).await;
    let middle = c.add("two", Category::Places).await;
    c.add("three", Category::Places).await;

    let list = c.live();
    list.refresh().await.expect("refresh");
    let before = titles(&list.wishes());

    c.store.set_offline(true);
    let result = list.delete_wish(&middle.id).await;
    assert!(matches!(result, Err(TogetherError::WriteFailed(_))));
    assert_eq!(titles(&list.wishes()), before);
    assert!(!list.is_tombstoned(&middle.id));
}

#[tokio::test]
async fn optimistic_removal_is_visible_before_commit() {
    let c = couple().await;
    let row = c.add("Tapas", Category::Restaurants).await;
    let list = c.live();
    list.refresh().await.expect("refresh");

    let ticket = list.remove_wish(&row.id);
    assert!(list.wishes().is_empty());
    assert!(list.view().wishes.is_empty());

    list.commit_removal(ticket).await.expect("commit");
    assert!(c.store.wish_by_id(&row.id, JoinSpec::Reduced).await.expect("query").is_none());
}

#[tokio::test]
async fn degraded_schema_loads_through_reduced_join() {
    let c = couple_on(SqliteStore::in_memory_at_version(1).expect("v1 store")).await;
    c.add("Louvre", Category::Places).await;

    let list = c.live();
    list.refresh().await.expect("reduced join succeeds");
    let wishes = list.wishes();
    assert_eq!(titles(&wishes), ["Louvre"]);
    assert!(wishes[0].priority_votes.is_empty());
    let creator = wishes[0].creator.as_ref().expect("creator joined");
    assert_eq!(creator.display_name, "Ana");
    assert!(list.view().error.is_none());

    let mut sub = c.store.subscribe_wishes(&c.group);
    c.add("Orsay", Category::Places).await;
    for event in drain(&mut sub) {
        assert_eq!(list.apply_event(event).await, Applied::Inserted);
    }
    assert_eq!(titles(&list.wishes()), ["Orsay", "Louvre"]);
}

#[tokio::test]
async fn unlinked_scope_never_queries_the_store() {
    let c = couple().await;
    c.add("hidden", Category::Places).await;
    let store = Rc::new(InstrumentedStore::new(c.store.clone()));

    let list = LiveWishList::new(store.clone(), WishScope::default());
    list.refresh().await.expect("empty load");

    assert_eq!(store.queries.get(), 0);
    let view = list.view();
    assert!(view.wishes.is_empty());
    assert!(!view.loading);
    assert!(view.error.is_none());
}

#[tokio::test]
async fn offline_snapshot_surfaces_fetch_failed() {
    let c = couple().await;
    c.add("Sushi", Category::Restaurants).await;
    let list = c.live();
    list.refresh().await.expect("refresh");
    assert_eq!(list.wishes().len(), 1);

    c.store.set_offline(true);
    let result = list.refresh().await;
    assert!(matches!(result, Err(TogetherError::FetchFailed(_))));

    let view = list.view();
    assert!(view.wishes.is_empty());
    assert!(!view.loading);
    assert!(view.error.is_some_and(|e| e.contains("offline")));
}

#[tokio::test]
async fn insert_enrichment_failure_drops_event() {
    let c = couple().await;
    let list = c.live();
    list.refresh().await.expect("refresh");

    let mut sub = c.store.subscribe_wishes(&c.group);
    c.add("Tetris", Category::Games).await;
    c.store.set_offline(true);
    for event in drain(&mut sub) {
        assert_eq!(
            list.apply_event(event).await,
            Applied::Ignored(IgnoreReason::FetchFailed)
        );
    }
    assert!(list.wishes().is_empty());
}

#[tokio::test]
async fn snapshot_resolving_after_scope_change_is_discarded() {
    let c = couple().await;
    c.add("Rome", Category::Places).await;

    let gate = Rc::new(Notify::new());
    let store = Rc::new(InstrumentedStore {
        gate: Some(gate.clone()),
        ..InstrumentedStore::new(c.store.clone())
    });
    let list = LiveWishList::new(store.clone(), c.scope());

    let switch = async {
        tokio::task::yield_now().await;
        list.set_scope(WishScope::new(
            c.group.clone(),
            CategoryFilter::Only(Category::Movies),
            false,
        ));
        gate.notify_one();
    };
    let (result, ()) = tokio::join!(list.refresh(), switch);

    result.expect("stale result is not an error");
    assert_eq!(store.queries.get(), 1);
    assert_eq!(list.generation(), 1);
    assert!(list.wishes().is_empty());
    assert!(list.view().loading);
}

#[tokio::test]
async fn run_loads_then_follows_the_feed() {
    let c = couple().await;
    c.add("Kyoto", Category::Places).await;
    let list = c.live();
    let mut views = list.watch();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async {
        views
            .wait_for(|v| !v.loading && v.wishes.len() == 1)
            .await
            .expect("initial load");
        assert_eq!(c.store.wish_subscriber_count(&c.group), 1);

        c.add("Osaka", Category::Places).await;
        views
            .wait_for(|v| v.wishes.len() == 2)
            .await
            .expect("insert applied");
        stop_tx.send(()).expect("runner alive");
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };
    tokio::join!(list.run(shutdown), driver);

    assert_eq!(titles(&list.wishes()), ["Osaka", "Kyoto"]);
    assert_eq!(c.store.wish_subscriber_count(&c.group), 0);
}

#[tokio::test]
async fn run_resubscribes_on_scope_change() {
    let c = couple().await;
    c.add("Arrival", Category::Movies).await;
    c.add("Madrid", Category::Places).await;
    let list = c.live();
    let mut views = list.watch();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async {
        views
            .wait_for(|v| !v.loading && v.wishes.len() == 2)
            .await
            .expect("initial load");

        list.set_scope(WishScope::new(
            c.group.clone(),
            CategoryFilter::Only(Category::Movies),
            false,
        ));
        views
            .wait_for(|v| !v.loading && v.scope.category != CategoryFilter::All)
            .await
            .expect("reloaded");
        assert_eq!(c.store.wish_subscriber_count(&c.group), 1);
        stop_tx.send(()).expect("runner alive");
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };
    tokio::join!(list.run(shutdown), driver);

    assert_eq!(titles(&list.wishes()), ["Arrival"]);
}

#[tokio::test]
async fn delete_during_insert_enrichment_keeps_wish_out() {
    let c = couple().await;
    let gate = Rc::new(Notify::new());
    let store = Rc::new(InstrumentedStore::holding_first_lookup(
        c.store.clone(),
        gate.clone(),
    ));
    let list = LiveWishList::new(store.clone(), c.scope());
    list.refresh().await.expect("refresh");

    let mut sub = c.store.subscribe_wishes(&c.group);
    let row = c.add("Lisbon", Category::Places).await;
    let insert = drain(&mut sub).remove(0);

    let partner = async {
        until_lookup_started(&store).await;
        c.store.delete_wish(&row.id).await.expect("delete");
        let mut applied = Vec::new();
        for event in drain(&mut sub) {
            applied.push(list.apply_event(event).await);
        }
        gate.notify_one();
        applied
    };
    let (inserted, deleted) = tokio::join!(list.apply_event(insert), partner);

    assert_eq!(deleted, [Applied::Ignored(IgnoreReason::Absent)]);
    assert_eq!(inserted, Applied::Ignored(IgnoreReason::Superseded));
    assert!(list.wishes().is_empty());
    assert!(c.store.wish_by_id(&row.id, JoinSpec::Reduced).await.expect("query").is_none());
}

#[tokio::test]
async fn update_during_insert_enrichment_refetches() {
    let c = couple().await;
    let gate = Rc::new(Notify::new());
    let store = Rc::new(InstrumentedStore::holding_first_lookup(
        c.store.clone(),
        gate.clone(),
    ));
    let list = LiveWishList::new(store.clone(), c.scope());
    list.refresh().await.expect("refresh");

    let mut sub = c.store.subscribe_wishes(&c.group);
    let row = c.add("Lisbon", Category::Places).await;
    let insert = drain(&mut sub).remove(0);

    let partner = async {
        until_lookup_started(&store).await;
        complete_wish(c.store.as_ref(), &row.id).await.expect("complete");
        for event in drain(&mut sub) {
            assert_eq!(
                list.apply_event(event).await,
                Applied::Ignored(IgnoreReason::Absent)
            );
        }
        gate.notify_one();
    };
    let (inserted, ()) = tokio::join!(list.apply_event(insert), partner);

    assert_eq!(inserted, Applied::Ignored(IgnoreReason::NotInScope));
    assert_eq!(store.lookups.get(), 2);
    assert!(list.wishes().is_empty());
}

#[tokio::test]
async fn insert_resolving_after_scope_change_is_discarded() {
    let c = couple().await;
    let gate = Rc::new(Notify::new());
    let store = Rc::new(InstrumentedStore::holding_first_lookup(
        c.store.clone(),
        gate.clone(),
    ));
    let list = LiveWishList::new(store.clone(), c.scope());
    list.refresh().await.expect("refresh");

    let mut sub = c.store.subscribe_wishes(&c.group);
    c.add("Barcelona", Category::Places).await;
    let insert = drain(&mut sub).remove(0);

    let switch = async {
        until_lookup_started(&store).await;
        list.set_scope(WishScope::new(
            c.group.clone(),
            CategoryFilter::Only(Category::Places),
            false,
        ));
        gate.notify_one();
    };
    let (applied, ()) = tokio::join!(list.apply_event(insert), switch);

    assert_eq!(applied, Applied::Ignored(IgnoreReason::Stale));
    assert_eq!(list.generation(), 1);
    assert!(list.wishes().is_empty());
    assert!(list.view().wishes.is_empty());
}
