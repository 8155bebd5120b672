//! Pure list state: apply snapshots and change events under a scope.
//!
//! Invariants held after every operation:
//! - no two entries share an id
//! - every entry is admitted by the scope
//! - no entry is tombstoned
//! - entries are in [`sort_wishes`] order

use tracing::debug;

use crate::filter::WishScope;
use crate::model::WishId;
use crate::model::wish::Wish;
use crate::priority::sort_wishes;
use crate::store::WishUpdate;
use crate::tombstone::Tombstones;

/// Why an event left the list unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Tombstoned,
    AlreadyPresent,
    NotInScope,
    Absent,
    /// Enrichment fetch failed; the event was dropped.
    FetchFailed,
    /// The scope changed while the event was being handled.
    Stale,
    /// The row was deleted while its INSERT was being enriched.
    Superseded,
}

/// Outcome of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Removed,
    Ignored(IgnoreReason),
}

impl Applied {
    #[must_use]
    pub const fn changed(self) -> bool {
        !matches!(self, Self::Ignored(_))
    }
}

/// An entry taken out by an optimistic removal, kept for rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub wish: Wish,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WishList {
    scope: WishScope,
    wishes: Vec<Wish>,
    tombstones: Tombstones,
}

impl WishList {
    #[must_use]
    pub fn new(scope: WishScope) -> Self {
        Self {
            scope,
            wishes: Vec::new(),
            tombstones: Tombstones::new(),
        }
    }

    #[must_use]
    pub const fn scope(&self) -> &WishScope {
        &self.scope
    }

    /// Switch scope and drop every entry. Tombstones are kept.
    pub fn set_scope(&mut self, scope: WishScope) {
        self.scope = scope;
        self.wishes.clear();
    }

    #[must_use]
    pub fn wishes(&self) -> &[Wish] {
        &self.wishes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.wishes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wishes.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &WishId) -> Option<&Wish> {
        self.wishes.iter().find(|w| w.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: &WishId) -> bool {
        self.position(id).is_some()
    }

    #[must_use]
    pub const fn tombstones(&self) -> &Tombstones {
        &self.tombstones
    }

    fn position(&self, id: &WishId) -> Option<usize> {
        self.wishes.iter().position(|w| w.id() == id)
    }

    fn resort(&mut self) {
        self.wishes = sort_wishes(std::mem::take(&mut self.wishes));
    }

    /// Replace every entry with a freshly loaded collection, minus
    /// tombstoned and out-of-scope rows.
    pub fn replace_snapshot(&mut self, wishes: Vec<Wish>) {
        let mut seen = std::collections::HashSet::new();
        self.wishes = wishes
            .into_iter()
            .filter(|w| {
                !self.tombstones.contains(w.id())
                    && self.scope.admits(w)
                    && seen.insert(w.id().clone())
            })
            .collect();
        self.resort();
    }

    /// Whether an INSERT for `id` is worth enriching.
    #[must_use]
    pub fn wants_insert(&self, id: &WishId) -> bool {
        !self.tombstones.contains(id) && !self.contains(id)
    }

    /// Apply an enriched INSERT. Idempotent: a second delivery of the same
    /// row is ignored.
    pub fn apply_insert(&mut self, wish: Wish) -> Applied {
        let id = wish.id().clone();
        if self.tombstones.contains(&id) {
            return Applied::Ignored(IgnoreReason::Tombstoned);
        }
        if self.contains(&id) {
            return Applied::Ignored(IgnoreReason::AlreadyPresent);
        }
        if !self.scope.admits(&wish) {
            return Applied::Ignored(IgnoreReason::NotInScope);
        }
        self.wishes.insert(0, wish);
        self.resort();
        debug!(wish_id = %id, "inserted wish");
        Applied::Inserted
    }

    /// Merge an UPDATE onto the present entry, then keep or drop it by the
    /// scope. Updates for absent or tombstoned ids are ignored.
    pub fn apply_update(&mut self, update: WishUpdate) -> Applied {
        let id = update.row.id.clone();
        if self.tombstones.contains(&id) {
            return Applied::Ignored(IgnoreReason::Tombstoned);
        }
        let Some(index) = self.position(&id) else {
            return Applied::Ignored(IgnoreReason::Absent);
        };

        let entry = &mut self.wishes[index];
        entry.merge_row(update.row);
        if let Some(votes) = update.priority_votes {
            entry.priority_votes = votes;
        }

        if self.scope.admits(&self.wishes[index]) {
            self.resort();
            debug!(wish_id = %id, "updated wish");
            Applied::Updated
        } else {
            self.wishes.remove(index);
            debug!(wish_id = %id, "update moved wish out of scope");
            Applied::Removed
        }
    }

    /// Apply a DELETE: drop the entry and clear its tombstone.
    pub fn apply_delete(&mut self, id: &WishId) -> Applied {
        let was_tombstoned = self.tombstones.remove(id);
        match self.position(id) {
            Some(index) => {
                self.wishes.remove(index);
                debug!(wish_id = %id, "deleted wish");
                Applied::Removed
            }
            None => {
                debug!(wish_id = %id, was_tombstoned, "delete for absent wish");
                Applied::Ignored(IgnoreReason::Absent)
            }
        }
    }

    /// Tombstone `id` and take its entry out, if present.
    pub fn remove_optimistic(&mut self, id: &WishId) -> Option<Removed> {
        self.tombstones.add(id.clone());
        let index = self.position(id)?;
        let wish = self.wishes.remove(index);
        Some(Removed { wish, index })
    }

    /// Undo [`WishList::remove_optimistic`]: clear the tombstone and put the
    /// entry back near where it was, if it still belongs in the scope.
    pub fn restore(&mut self, id: &WishId, removed: Option<Removed>) {
        self.tombstones.remove(id);
        let Some(Removed { wish, index }) = removed else {
            return;
        };
        if self.contains(id) || !self.scope.admits(&wish) {
            return;
        }
        let index = index.min(self.wishes.len());
        self.wishes.insert(index, wish);
        self.resort();
    }
}
