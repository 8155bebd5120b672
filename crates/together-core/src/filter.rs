//! The active list scope and its membership predicate.

use serde::{Deserialize, Serialize};

use crate::model::GroupId;
use crate::model::wish::{CategoryFilter, Wish, WishRow};

/// Which wishes a list holds: one group, a category (or all), and one
/// done-state.
///
/// With no group the scope is *unavailable*: the list stays empty and the
/// store is never queried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WishScope {
    pub group_id: Option<GroupId>,
    pub category: CategoryFilter,
    pub done: bool,
}

impl WishScope {
    #[must_use]
    pub const fn new(group_id: GroupId, category: CategoryFilter, done: bool) -> Self {
        Self {
            group_id: Some(group_id),
            category,
            done,
        }
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.group_id.is_some()
    }

    /// Whether a stored row belongs in this scope.
    #[must_use]
    pub fn admits_row(&self, row: &WishRow) -> bool {
        self.group_id.as_ref() == Some(&row.group_id)
            && self.category.admits(row.category)
            && row.is_done == self.done
    }

    #[must_use]
    pub fn admits(&self, wish: &Wish) -> bool {
        self.admits_row(&wish.row)
    }

    /// Realtime topic name, stable for a given scope.
    #[must_use]
    pub fn channel_name(&self) -> String {
        let group = self.group_id.as_ref().map_or("none", GroupId::as_str);
        format!("wishes:{group}:{}:{}", self.category, self.done)
    }
}
