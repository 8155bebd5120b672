//! Store wrapper whose point lookups can stay in transit for a few rounds.
//!
//! A held lookup reads its row first and answers later, so the answer may be
//! stale by the time the list sees it. This is what a slow round trip to the
//! hosted store looks like to a device: later change events for the same row
//! can arrive while an INSERT enrichment is still outstanding.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use tokio::sync::watch;
use together_core::db::SqliteStore;
use together_core::model::vote::NewVote;
use together_core::model::wish::{NewWish, Wish, WishPatch, WishRow};
use together_core::model::{GroupId, WishId};
use together_core::store::{ChangeEvent, JoinSpec, StoreError, Subscription, WishQuery, WishStore};

use crate::rng::SimRng;

#[derive(Debug)]
pub struct LaggedStore {
    inner: Rc<SqliteStore>,
    rng: RefCell<SimRng>,
    lag_percent: u8,
    max_lag_rounds: u8,
    clock: watch::Sender<u64>,
    held: Cell<usize>,
}

impl LaggedStore {
    #[must_use]
    pub fn new(inner: Rc<SqliteStore>, seed: u64, lag_percent: u8, max_lag_rounds: u8) -> Self {
        let (clock, _) = watch::channel(0);
        Self {
            inner,
            rng: RefCell::new(SimRng::new(seed.rotate_left(17))),
            lag_percent,
            max_lag_rounds,
            clock,
            held: Cell::new(0),
        }
    }

    /// Answer every lookup held until `round` or earlier.
    pub fn advance_to(&self, round: u64) {
        self.clock.send_replace(round);
    }

    /// Answer every held lookup and stop holding new ones.
    pub fn release_all(&self) {
        self.clock.send_replace(u64::MAX);
    }

    /// Lookups held for at least one round so far.
    #[must_use]
    pub fn held(&self) -> usize {
        self.held.get()
    }

    fn draw_lag(&self) -> u64 {
        if self.max_lag_rounds == 0 {
            return 0;
        }
        let mut rng = self.rng.borrow_mut();
        if rng.chance(self.lag_percent) {
            1 + rng.below(u64::from(self.max_lag_rounds))
        } else {
            0
        }
    }
}

#[async_trait(?Send)]
impl WishStore for LaggedStore {
    async fn query_wishes(
        &self,
        query: &WishQuery,
        join: JoinSpec,
    ) -> Result<Vec<Wish>, StoreError> {
        self.inner.query_wishes(query, join).await
    }

    async fn wish_by_id(&self, id: &WishId, join: JoinSpec) -> Result<Option<Wish>, StoreError> {
        let found = self.inner.wish_by_id(id, join).await;
        let lag = self.draw_lag();
        let now = *self.clock.borrow();
        let release = now.saturating_add(lag);
        if release > now {
            self.held.set(self.held.get() + 1);
            let mut clock = self.clock.subscribe();
            let _ = clock.wait_for(|round| *round >= release).await;
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
