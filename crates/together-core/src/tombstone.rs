//! Ids removed locally whose DELETE has not arrived yet.

use std::collections::HashSet;

use crate::model::WishId;

/// Ids removed locally whose deletion has not been confirmed.
///
/// A tombstoned id is never re-admitted by a snapshot, INSERT, or UPDATE.
/// Entries are cleared by a DELETE event for the id, by rolling back a
/// failed delete, or by dropping the owning list. There is no expiry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tombstones {
    ids: HashSet<WishId>,
}

impl Tombstones {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the id was not already tombstoned.
    pub fn add(&mut self, id: WishId) -> bool {
        self.ids.insert(id)
    }

    /// Returns true if the id was tombstoned.
    pub fn remove(&mut self, id: &WishId) -> bool {
        self.ids.remove(id)
    }

    #[must_use]
    pub fn contains(&self, id: &WishId) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WishId> {
        self.ids.iter()
    }
}
