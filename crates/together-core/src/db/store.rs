//! [`SqliteStore`]: the store contract over one SQLite connection.
//!
//! Every committed wish write is published to subscribers of the wish's
//! group; comment writes go to subscribers of the wish.

use std::cell::{Cell, RefCell};
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use super::query::{self, UserKey};
use crate::model::comment::{Comment, NewComment};
use crate::model::user::{NewUser, User};
use crate::model::vote::NewVote;
use crate::model::wish::{NewWish, Wish, WishPatch, WishRow};
use crate::model::{CommentId, GroupId, UserId, WishId};
use crate::store::{
    ChangeEvent, ChangeFeed, CommentEvent, CommentStore, JoinSpec, ProfileStore, StoreError,
    Subscription, WishQuery, WishStore, WishUpdate,
};

/// Translate SQLite failures into store-level errors.
fn classify(error: rusqlite::Error) -> StoreError {
    match &error {
        rusqlite::Error::SqliteFailure(code, message)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(message.clone().unwrap_or_else(|| code.to_string()))
        }
        rusqlite::Error::SqliteFailure(_, Some(message))
            if message.starts_with("no such table") || message.starts_with("no such column") =>
        {
            StoreError::MissingRelation(message.clone())
        }
        _ => StoreError::Sqlite(error),
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn not_found(kind: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

pub struct SqliteStore {
    conn: RefCell<Connection>,
    wishes: ChangeFeed<GroupId, ChangeEvent>,
    comments: ChangeFeed<WishId, CommentEvent>,
    offline: Cell<bool>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("offline", &self.offline.get())
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Wrap an already configured and migrated connection.
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: RefCell::new(conn),
            wishes: ChangeFeed::new(),
            comments: ChangeFeed::new(),
            offline: Cell::new(false),
        }
    }

    /// Open the database file at `path`, migrating it to the latest schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        super::open_store(path).map(Self::new)
    }

    /// Fresh in-memory store at the latest schema.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot create the database.
    pub fn in_memory() -> Result<Self> {
        Self::in_memory_at_version(super::migrations::LATEST_SCHEMA_VERSION)
    }

    /// Fresh in-memory store stopped at schema `version`.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot create or migrate the database.
    pub fn in_memory_at_version(version: u32) -> Result<Self> {
        super::open_in_memory(version).map(Self::new)
    }

    /// While offline every call fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline.get()
    }

    /// Live wish subscribers for `group_id`.
    #[must_use]
    pub fn wish_subscriber_count(&self, group_id: &GroupId) -> usize {
        self.wishes.subscriber_count(group_id)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.get() {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    fn publish_wish(&self, group_id: &GroupId, event: &ChangeEvent) {
        let reached = self.wishes.publish(group_id, event);
        tracing::debug!(
            group_id = %group_id,
            wish_id = %event.wish_id(),
            kind = event.kind(),
            reached,
            "published wish change"
        );
    }
}

#[async_trait(?Send)]
impl WishStore for SqliteStore {
    async fn query_wishes(
        &self,
        query: &WishQuery,
        join: JoinSpec,
    ) -> Result<Vec<Wish>, StoreError> {
        self.check_online()?;
        query::query_wishes(&self.conn.borrow(), query, join).map_err(classify)
    }

    async fn wish_by_id(&self, id: &WishId, join: JoinSpec) -> Result<Option<Wish>, StoreError> {
        self.check_online()?;
        query::wish_by_id(&self.conn.borrow(), id, join).map_err(classify)
    }

    async fn insert_wish(&self, wish: NewWish) -> Result<WishRow, StoreError> {
        self.check_online()?;
        let row = WishRow {
            id: WishId::new(new_id()),
            group_id: wish.group_id,
            category: wish.category,
            title: wish.title,
            description: wish.description,
            image_url: wish.image_url,
            source_url: wish.source_url,
            created_by: wish.created_by,
            is_done: false,
            done_at: None,
            created_at: now(),
        };

        self.conn
            .borrow()
            .execute(
                "INSERT INTO wishes (
                    wish_id, group_id, category, title, description, image_url,
                    source_url, created_by, is_done, done_at_us, created_at_us
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, ?9)",
                params![
                    row.id.as_str(),
                    row.group_id.as_str(),
                    row.category.as_str(),
                    row.title,
                    row.description,
                    row.image_url,
                    row.source_url,
                    row.created_by.as_str(),
                    row.created_at.timestamp_micros(),
                ],
            )
            .map_err(classify)?;

        self.publish_wish(&row.group_id, &ChangeEvent::Insert(row.clone()));
        Ok(row)
    }

    async fn update_wish(&self, id: &WishId, patch: &WishPatch) -> Result<WishRow, StoreError> {
        self.check_online()?;
        let row = {
            let conn = self.conn.borrow();
            let mut row = query::wish_row_by_id(&conn, id)
                .map_err(classify)?
                .ok_or_else(|| not_found("wish", id))?;
            patch
                .apply_to(&mut row)
                .map_err(|e| StoreError::Conflict(e.to_string()))?;
            // Published rows must match what a reload returns.
            row.done_at = row.done_at.map(|t| t.trunc_subsecs(6));

            conn.execute(
                "UPDATE wishes
                 SET title = ?2, description = ?3, is_done = ?4, done_at_us = ?5
                 WHERE wish_id = ?1",
                params![
                    id.as_str(),
                    row.title,
                    row.description,
                    i64::from(row.is_done),
                    row.done_at.map(|t| t.timestamp_micros()),
                ],
            )
            .map_err(classify)?;
            row
        };

        self.publish_wish(
            &row.group_id.clone(),
            &ChangeEvent::Update(WishUpdate {
                row: row.clone(),
                priority_votes: None,
            }),
        );
        Ok(row)
    }

    async fn delete_wish(&self, id: &WishId) -> Result<(), StoreError> {
        self.check_online()?;
        let group_id = {
            let conn = self.conn.borrow();
            let Some(row) = query::wish_row_by_id(&conn, id).map_err(classify)? else {
                tracing::debug!(wish_id = %id, "delete of missing wish is a no-op");
                return Ok(());
            };
            conn.execute("DELETE FROM wishes WHERE wish_id = ?1", params![id.as_str()])
                .map_err(classify)?;
            row.group_id
        };

        self.publish_wish(&group_id, &ChangeEvent::Delete(id.clone()));
        Ok(())
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<(), StoreError> {
        self.check_online()?;
        let (row, votes) = {
            let conn = self.conn.borrow();
            let row = query::wish_row_by_id(&conn, &vote.wish_id)
                .map_err(classify)?
                .ok_or_else(|| not_found("wish", &vote.wish_id))?;
            conn.execute(
                "INSERT INTO wish_priorities (wish_id, user_id, value, created_at_us)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    vote.wish_id.as_str(),
                    vote.user_id.as_str(),
                    i64::from(vote.value),
                    now().timestamp_micros(),
                ],
            )
            .map_err(classify)?;
            let votes = query::votes_for(&conn, &vote.wish_id).map_err(classify)?;
            (row, votes)
        };

        self.publish_wish(
            &row.group_id.clone(),
            &ChangeEvent::Update(WishUpdate {
                row,
                priority_votes: Some(votes),
            }),
        );
        Ok(())
    }

    fn subscribe_wishes(&self, group_id: &GroupId) -> Subscription<ChangeEvent> {
        self.wishes.subscribe(group_id.clone())
    }
}

#[async_trait(?Send)]
impl CommentStore for SqliteStore {
    async fn comments_for(&self, wish_id: &WishId) -> Result<Vec<Comment>, StoreError> {
        self.check_online()?;
        query::comments_for(&self.conn.borrow(), wish_id).map_err(classify)
    }

    async fn comment_by_id(&self, id: &CommentId) -> Result<Option<Comment>, StoreError> {
        self.check_online()?;
        query::comment_by_id(&self.conn.borrow(), id).map_err(classify)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError> {
        self.check_online()?;
        let inserted = Comment {
            id: CommentId::new(new_id()),
            wish_id: comment.wish_id,
            user_id: comment.user_id,
            text: comment.text,
            created_at: now(),
            author: None,
        };

        let joined = {
            let conn = self.conn.borrow();
            if query::wish_row_by_id(&conn, &inserted.wish_id)
                .map_err(classify)?
                .is_none()
            {
                return Err(not_found("wish", &inserted.wish_id));
            }
            conn.execute(
                "INSERT INTO comments (comment_id, wish_id, user_id, text, created_at_us)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    inserted.id.as_str(),
                    inserted.wish_id.as_str(),
                    inserted.user_id.as_str(),
                    inserted.text,
                    inserted.created_at.timestamp_micros(),
                ],
            )
            .map_err(classify)?;
            query::comment_by_id(&conn, &inserted.id)
                .map_err(classify)?
                .ok_or_else(|| not_found("comment", &inserted.id))?
        };

        self.comments.publish(
            &inserted.wish_id.clone(),
            &CommentEvent::Insert(inserted),
        );
        Ok(joined)
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<(), StoreError> {
        self.check_online()?;
        let wish_id = {
            let conn = self.conn.borrow();
            let Some(comment) = query::comment_by_id(&conn, id).map_err(classify)? else {
                return Ok(());
            };
            conn.execute("DELETE FROM comments WHERE comment_id = ?1", params![id.as_str()])
                .map_err(classify)?;
            comment.wish_id
        };

        self.comments
            .publish(&wish_id, &CommentEvent::Delete(id.clone()));
        Ok(())
    }

    fn subscribe_comments(&self, wish_id: &WishId) -> Subscription<CommentEvent> {
        self.comments.subscribe(wish_id.clone())
    }
}

#[async_trait(?Send)]
impl ProfileStore for SqliteStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.check_online()?;
        let created = User {
            id: UserId::new(new_id()),
            email: user.email.trim().to_string(),
            display_name: user.display_name.trim().to_string(),
            avatar_url: None,
            partner_id: None,
            group_id: None,
            invite_code: None,
            push_token: None,
            created_at: now(),
        };
        self.conn
            .borrow()
            .execute(
                "INSERT INTO users (user_id, email, display_name, created_at_us)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    created.id.as_str(),
                    created.email,
                    created.display_name,
                    created.created_at.timestamp_micros(),
                ],
            )
            .map_err(classify)?;
        Ok(created)
    }

    async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        self.check_online()?;
        query::user_by(&self.conn.borrow(), UserKey::Id, id.as_str()).map_err(classify)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.check_online()?;
        query::user_by(&self.conn.borrow(), UserKey::Email, email.trim()).map_err(classify)
    }

    async fn user_by_invite_code(&self, code: &str) -> Result<Option<User>, StoreError> {
        self.check_online()?;
        query::user_by(&self.conn.borrow(), UserKey::InviteCode, code).map_err(classify)
    }

    async fn set_invite_code(&self, id: &UserId, code: &str) -> Result<(), StoreError> {
        self.check_online()?;
        let changed = self
            .conn
            .borrow()
            .execute(
                "UPDATE users SET invite_code = ?2 WHERE user_id = ?1",
                params![id.as_str(), code],
            )
            .map_err(classify)?;
        if changed == 0 {
            return Err(not_found("user", id));
        }
        Ok(())
    }

    async fn link_group(
        &self,
        a: &UserId,
        b: &UserId,
        group_id: &GroupId,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction().map_err(classify)?;
        for (user, partner) in [(a, b), (b, a)] {
            let changed = tx
                .execute(
                    "UPDATE users SET partner_id = ?2, group_id = ?3 WHERE user_id = ?1",
                    params![user.as_str(), partner.as_str(), group_id.as_str()],
                )
                .map_err(classify)?;
            if changed == 0 {
                return Err(not_found("user", user));
            }
        }
        tx.commit().map_err(classify)?;
        tracing::info!(group_id = %group_id, "linked partners");
        Ok(())
    }

    async fn unlink_group(&self, user: &UserId) -> Result<(), StoreError> {
        self.check_online()?;
        let mut conn = self.conn.borrow_mut();
        let current =
            query::user_by(&conn, UserKey::Id, user.as_str())
                .map_err(classify)?
                .ok_or_else(|| not_found("user", user))?;

        let tx = conn.transaction().map_err(classify)?;
        let mut ids = vec![current.id];
        ids.extend(current.partner_id);
        for id in &ids {
            tx.execute(
                "UPDATE users SET partner_id = NULL, group_id = NULL WHERE user_id = ?1",
                params![id.as_str()],
            )
            .map_err(classify)?;
        }
        tx.commit().map_err(classify)?;
        Ok(())
    }
}
