//! [`LiveWishList`]: a [`WishList`] kept current from a store subscription.
//!
//! The list owns its scope, collection, and tombstones. Scope changes bump a
//! generation counter; any load or enrichment fetch that resolves under an
//! older generation is discarded. Consumers observe the list through a
//! `watch` channel of [`WishListView`].
//!
//! An INSERT enrichment is tracked until it resolves. A DELETE for the row
//! arriving meanwhile drops the fetched result; an UPDATE makes it refetch.
//! Events for one row therefore take effect in feed order even when several
//! are in flight.
//!
//! No `RefCell` borrow is held across an `.await`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::reconcile::{Applied, IgnoreReason, Removed, WishList};
use super::snapshot::{load_snapshot, with_join_fallback};
use crate::error::TogetherError;
use crate::filter::WishScope;
use crate::model::WishId;
use crate::model::wish::Wish;
use crate::store::{ChangeEvent, Subscription, WishStore};

/// Snapshot of a list as seen by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WishListView {
    pub scope: WishScope,
    pub wishes: Vec<Wish>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Handle for an optimistic removal awaiting its store delete.
#[derive(Debug)]
#[must_use = "commit the removal or the wish stays hidden until a DELETE arrives"]
pub struct RemovalTicket {
    id: WishId,
    removed: Option<Removed>,
}

impl RemovalTicket {
    #[must_use]
    pub const fn id(&self) -> &WishId {
        &self.id
    }
}

/// What happened to a row while its INSERT enrichment was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingInsert {
    Fetching,
    Changed,
    Deleted,
}

#[derive(Debug)]
struct LiveState {
    list: WishList,
    generation: u64,
    loading: bool,
    error: Option<String>,
    pending_inserts: HashMap<WishId, PendingInsert>,
}

impl LiveState {
    /// Note a later event for a row whose INSERT is still being enriched.
    fn supersede_pending(&mut self, id: &WishId, mark: PendingInsert) {
        if let Some(pending) = self
            .pending_inserts
            .get_mut(id)
            .filter(|pending| **pending != PendingInsert::Deleted)
        {
            *pending = mark;
        }
    }
}

/// Clears a pending INSERT marker when its enrichment future is dropped
/// before finishing, as `run` does on shutdown.
struct PendingGuard<'a> {
    state: &'a RefCell<LiveState>,
    id: WishId,
    generation: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut()
            && state.generation == self.generation
        {
            state.pending_inserts.remove(&self.id);
        }
    }
}

pub struct LiveWishList {
    store: Rc<dyn WishStore>,
    state: RefCell<LiveState>,
    scope_tx: watch::Sender<WishScope>,
    view_tx: watch::Sender<WishListView>,
}

impl std::fmt::Debug for LiveWishList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveWishList")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl LiveWishList {
    /// Create an empty list for `scope`. Call [`LiveWishList::refresh`] or
    /// [`LiveWishList::run`] to populate it.
    #[must_use]
    pub fn new(store: Rc<dyn WishStore>, scope: WishScope) -> Self {
        let (scope_tx, _) = watch::channel(scope.clone());
        let (view_tx, _) = watch::channel(WishListView {
            scope: scope.clone(),
            ..WishListView::default()
        });
        Self {
            store,
            state: RefCell::new(LiveState {
                list: WishList::new(scope),
                generation: 0,
                loading: false,
                error: None,
                pending_inserts: HashMap::new(),
            }),
            scope_tx,
            view_tx,
        }
    }

    #[must_use]
    pub fn scope(&self) -> WishScope {
        self.state.borrow().list.scope().clone()
    }

    /// Current scope generation. Increments on every scope change.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Switch to a new scope. Entries are dropped immediately; a running
    /// [`LiveWishList::run`] loop resubscribes and reloads.
    pub fn set_scope(&self, scope: WishScope) {
        {
            let mut state = self.state.borrow_mut();
            if state.list.scope() == &scope {
                return;
            }
            state.generation += 1;
            state.list.set_scope(scope.clone());
            state.loading = scope.is_available();
            state.error = None;
            state.pending_inserts.clear();
            info!(
                channel = %scope.channel_name(),
                generation = state.generation,
                "scope changed"
            );
        }
        self.scope_tx.send_replace(scope);
        self.publish();
    }

    #[must_use]
    pub fn wishes(&self) -> Vec<Wish> {
        self.state.borrow().list.wishes().to_vec()
    }

    #[must_use]
    pub fn get(&self, id: &WishId) -> Option<Wish> {
        self.state.borrow().list.get(id).cloned()
    }

    #[must_use]
    pub fn is_tombstoned(&self, id: &WishId) -> bool {
        self.state.borrow().list.tombstones().contains(id)
    }

    /// Tombstoned ids, sorted.
    #[must_use]
    pub fn tombstoned_ids(&self) -> Vec<WishId> {
        let state = self.state.borrow();
        let mut ids: Vec<WishId> = state.list.tombstones().iter().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn view(&self) -> WishListView {
        self.view_tx.borrow().clone()
    }

    /// Receiver that observes every published view.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<WishListView> {
        self.view_tx.subscribe()
    }

    fn publish(&self) {
        let view = {
            let state = self.state.borrow();
            WishListView {
                scope: state.list.scope().clone(),
                wishes: state.list.wishes().to_vec(),
                loading: state.loading,
                error: state.error.clone(),
            }
        };
        self.view_tx.send_replace(view);
    }

    /// Reload the snapshot for the current scope.
    ///
    /// On failure the list is emptied, the view carries the error text, and
    /// the error is returned. A result that arrives after a scope change is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns [`TogetherError::FetchFailed`] when both join attempts fail.
    pub async fn refresh(&self) -> Result<(), TogetherError> {
        let (scope, generation) = {
            let mut state = self.state.borrow_mut();
            state.loading = state.list.scope().is_available();
            (state.list.scope().clone(), state.generation)
        };
        self.publish();

        let result = load_snapshot(self.store.as_ref(), &scope).await;

        let outcome = {
            let mut state = self.state.borrow_mut();
            if state.generation != generation {
                debug!(generation, current = state.generation, "discarding stale snapshot");
                return Ok(());
            }
            state.loading = false;
            match result {
                Ok(snapshot) => {
                    state.error = None;
                    state.list.replace_snapshot(snapshot.wishes);
                    Ok(())
                }
                Err(error) => {
                    warn!(channel = %scope.channel_name(), error = %error, "snapshot load failed");
                    state.error = Some(error.to_string());
                    state.list.replace_snapshot(Vec::new());
                    Err(error)
                }
            }
        };
        self.publish();
        outcome
    }

    /// Apply one change event. INSERTs are enriched with a store fetch
    /// (reduced join on failure) before being applied.
    pub async fn apply_event(&self, event: ChangeEvent) -> Applied {
        let applied = match event {
            ChangeEvent::Insert(row) => self.apply_insert(row.id).await,
            ChangeEvent::Update(update) => {
                let mut state = self.state.borrow_mut();
                state.supersede_pending(&update.row.id, PendingInsert::Changed);
                state.list.apply_update(update)
            }
            ChangeEvent::Delete(id) => {
                let mut state = self.state.borrow_mut();
                state.supersede_pending(&id, PendingInsert::Deleted);
                state.list.apply_delete(&id)
            }
        };
        if applied.changed() {
            self.publish();
        }
        applied
    }

    async fn apply_insert(&self, id: WishId) -> Applied {
        let generation = {
            let mut state = self.state.borrow_mut();
            if state.list.tombstones().contains(&id) {
                return Applied::Ignored(IgnoreReason::Tombstoned);
            }
            if !state.list.wants_insert(&id) || state.pending_inserts.contains_key(&id) {
                return Applied::Ignored(IgnoreReason::AlreadyPresent);
            }
            state
                .pending_inserts
                .insert(id.clone(), PendingInsert::Fetching);
            state.generation
        };
        let _pending = PendingGuard {
            state: &self.state,
            id: id.clone(),
            generation,
        };

        let store = self.store.as_ref();
        loop {
            let id_ref = &id;
            let fetched = with_join_fallback(move |join| store.wish_by_id(id_ref, join)).await;

            let mut state = self.state.borrow_mut();
            if state.generation != generation {
                debug!(wish_id = %id, "discarding insert fetched under old scope");
                return Applied::Ignored(IgnoreReason::Stale);
            }
            match state.pending_inserts.remove(&id) {
                Some(PendingInsert::Deleted) => {
                    debug!(wish_id = %id, "row deleted while its insert was enriched");
                    return Applied::Ignored(IgnoreReason::Superseded);
                }
                Some(PendingInsert::Changed) => {
                    debug!(wish_id = %id, "row changed while its insert was enriched; refetching");
                    state
                        .pending_inserts
                        .insert(id.clone(), PendingInsert::Fetching);
                    continue;
                }
                Some(PendingInsert::Fetching) | None => {}
            }
            return match fetched {
                Ok((Some(wish), _)) => state.list.apply_insert(wish),
                Ok((None, _)) => {
                    debug!(wish_id = %id, "inserted wish no longer exists");
                    Applied::Ignored(IgnoreReason::Absent)
                }
                Err(error) => {
                    warn!(wish_id = %id, error = %error, "dropping insert event; enrichment failed");
                    Applied::Ignored(IgnoreReason::FetchFailed)
                }
            };
        }
    }

    /// Hide `id` immediately and tombstone it. Pair with
    /// [`LiveWishList::commit_removal`].
    pub fn remove_wish(&self, id: &WishId) -> RemovalTicket {
        let removed = self.state.borrow_mut().list.remove_optimistic(id);
        debug!(wish_id = %id, present = removed.is_some(), "optimistic removal");
        self.publish();
        RemovalTicket {
            id: id.clone(),
            removed,
        }
    }

    /// Issue the store delete for an optimistic removal. On failure the
    /// removal is rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`TogetherError::WriteFailed`] when the store rejects the
    /// delete.
    pub async fn commit_removal(&self, ticket: RemovalTicket) -> Result<(), TogetherError> {
        let RemovalTicket { id, removed } = ticket;
        match self.store.delete_wish(&id).await {
            Ok(()) => Ok(()),
            Err(error) => {
                warn!(wish_id = %id, error = %error, "delete failed; restoring wish");
                self.state.borrow_mut().list.restore(&id, removed);
                self.publish();
                Err(TogetherError::WriteFailed(error))
            }
        }
    }

    /// Optimistically remove `id` and delete it from the store.
    ///
    /// # Errors
    ///
    /// Returns [`TogetherError::WriteFailed`] when the store rejects the
    /// delete; the wish is restored.
    pub async fn delete_wish(&self, id: &WishId) -> Result<(), TogetherError> {
        let ticket = self.remove_wish(id);
        self.commit_removal(ticket).await
    }

    /// Keep the list live until `shutdown` resolves.
    ///
    /// For each scope: subscribe first, then load the snapshot, then apply
    /// events as they arrive. Several INSERT enrichments may be in flight at
    /// once. A scope change drops the subscription and any in-flight work and
    /// starts over.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut scope_rx = self.scope_tx.subscribe();

        'scopes: loop {
            let scope = scope_rx.borrow_and_update().clone();
            let mut subscription = scope
                .group_id
                .as_ref()
                .map(|group| self.store.subscribe_wishes(group));
            debug!(channel = %scope.channel_name(), "subscribed");

            let mut in_flight = FuturesUnordered::new();
            if let Err(error) = self.refresh().await {
                debug!(error = %error, "initial load failed; staying subscribed");
            }

            loop {
                tokio::select! {
                    () = &mut shutdown => break 'scopes,
                    changed = scope_rx.changed() => {
                        if changed.is_err() {
                            break 'scopes;
                        }
                        continue 'scopes;
                    }
                    event = next_event(&mut subscription) => match event {
                        Some(event) => in_flight.push(self.apply_event(event)),
                        None => {
                            debug!("change feed closed");
                            subscription = None;
                        }
                    },
                    Some(applied) = in_flight.next(), if !in_flight.is_empty() => {
                        debug!(?applied, "event handled");
                    }
                }
            }
        }
    }
}

async fn next_event(subscription: &mut Option<Subscription<ChangeEvent>>) -> Option<ChangeEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
