//! Backing-store contract.
//!
//! Every call is async and the engine is single-threaded, so the traits are
//! declared `?Send`. Implementations publish a [`ChangeEvent`] for every
//! committed wish write to subscribers of the wish's group.

pub mod feed;

use async_trait::async_trait;
use thiserror::Error;

use crate::filter::WishScope;
use crate::model::comment::{Comment, NewComment};
use crate::model::user::{NewUser, User};
use crate::model::vote::{NewVote, PriorityVote};
use crate::model::wish::{CategoryFilter, NewWish, Wish, WishPatch, WishRow};
use crate::model::{CommentId, GroupId, UserId, WishId};

pub use feed::{ChangeFeed, Subscription};

/// Errors reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A relation used by a join is not available on this store.
    #[error("relation unavailable: {0}")]
    MissingRelation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    /// A uniqueness or foreign-key constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// How much joined data to load with each wish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinSpec {
    /// Creator, comment count, and priority votes.
    Enriched,
    /// Creator and comment count only.
    Reduced,
}

impl JoinSpec {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enriched => "enriched",
            Self::Reduced => "reduced",
        }
    }
}

/// Filter for a snapshot query. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WishQuery {
    pub group_id: GroupId,
    pub category: CategoryFilter,
    pub done: bool,
}

impl WishQuery {
    /// Query for an available scope; `None` when the scope has no group.
    #[must_use]
    pub fn for_scope(scope: &WishScope) -> Option<Self> {
        scope.group_id.clone().map(|group_id| Self {
            group_id,
            category: scope.category,
            done: scope.done,
        })
    }
}

/// Full scalar row of an updated wish. Vote changes also carry the wish's
/// current vote list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WishUpdate {
    pub row: WishRow,
    pub priority_votes: Option<Vec<PriorityVote>>,
}

/// Realtime notification of a committed wish write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(WishRow),
    Update(WishUpdate),
    Delete(WishId),
}

impl ChangeEvent {
    #[must_use]
    pub const fn wish_id(&self) -> &WishId {
        match self {
            Self::Insert(row) => &row.id,
            Self::Update(update) => &update.row.id,
            Self::Delete(id) => id,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }
}

/// Realtime notification of a committed comment write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentEvent {
    /// Inserted row; `author` is not joined.
    Insert(Comment),
    Delete(CommentId),
}

#[async_trait(?Send)]
pub trait WishStore {
    async fn query_wishes(&self, query: &WishQuery, join: JoinSpec)
    -> Result<Vec<Wish>, StoreError>;

    async fn wish_by_id(&self, id: &WishId, join: JoinSpec) -> Result<Option<Wish>, StoreError>;

    async fn insert_wish(&self, wish: NewWish) -> Result<WishRow, StoreError>;

    /// Apply `patch` and return the updated row.
    async fn update_wish(&self, id: &WishId, patch: &WishPatch) -> Result<WishRow, StoreError>;

    /// Deleting an id that does not exist succeeds.
    async fn delete_wish(&self, id: &WishId) -> Result<(), StoreError>;

    /// A second vote by the same user on the same wish is a
    /// [`StoreError::Conflict`].
    async fn insert_vote(&self, vote: NewVote) -> Result<(), StoreError>;

    fn subscribe_wishes(&self, group_id: &GroupId) -> Subscription<ChangeEvent>;
}

#[async_trait(?Send)]
pub trait CommentStore {
    /// Oldest first, authors joined.
    async fn comments_for(&self, wish_id: &WishId) -> Result<Vec<Comment>, StoreError>;

    async fn comment_by_id(&self, id: &CommentId) -> Result<Option<Comment>, StoreError>;

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError>;

    async fn delete_comment(&self, id: &CommentId) -> Result<(), StoreError>;

    fn subscribe_comments(&self, wish_id: &WishId) -> Subscription<CommentEvent>;
}

#[async_trait(?Send)]
pub trait ProfileStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn user_by_invite_code(&self, code: &str) -> Result<Option<User>, StoreError>;

    async fn set_invite_code(&self, id: &UserId, code: &str) -> Result<(), StoreError>;

    /// Make `a` and `b` partners in `group_id`.
    async fn link_group(&self, a: &UserId, b: &UserId, group_id: &GroupId)
    -> Result<(), StoreError>;

    /// Clear partner and group for `user` and their partner.
    async fn unlink_group(&self, user: &UserId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::wish::Category;

    #[test]
    fn query_requires_group() {
        assert!(WishQuery::for_scope(&WishScope::default()).is_none());
        let scope = WishScope::new(
            GroupId::from("g"),
            CategoryFilter::Only(Category::Games),
            true,
        );
        let query = WishQuery::for_scope(&scope).expect("available scope");
        assert_eq!(query.group_id.as_str(), "g");
        assert!(query.done);
    }

    #[test]
    fn delete_event_reports_id() {
        let event = ChangeEvent::Delete(WishId::from("w9"));
        assert_eq!(event.wish_id().as_str(), "w9");
        assert_eq!(event.kind(), "delete");
    }
}
