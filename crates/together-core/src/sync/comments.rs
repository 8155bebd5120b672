//! Live comment thread for one wish, oldest first.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::TogetherError;
use crate::model::comment::Comment;
use crate::model::{CommentId, WishId};
use crate::store::{CommentEvent, CommentStore};

pub struct CommentThread {
    store: Rc<dyn CommentStore>,
    wish_id: WishId,
    comments: RefCell<Vec<Comment>>,
}

impl std::fmt::Debug for CommentThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentThread")
            .field("wish_id", &self.wish_id)
            .field("comments", &self.comments.borrow().len())
            .finish_non_exhaustive()
    }
}

impl CommentThread {
    #[must_use]
    pub fn new(store: Rc<dyn CommentStore>, wish_id: WishId) -> Self {
        Self {
            store,
            wish_id,
            comments: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn wish_id(&self) -> &WishId {
        &self.wish_id
    }

    #[must_use]
    pub fn comments(&self) -> Vec<Comment> {
        self.comments.borrow().clone()
    }

    fn contains(&self, id: &CommentId) -> bool {
        self.comments.borrow().iter().any(|c| &c.id == id)
    }

    /// Reload every comment on the wish.
    ///
    /// # Errors
    ///
    /// Returns [`TogetherError::FetchFailed`] if the store query fails; the
    /// thread keeps its previous contents.
    pub async fn refresh(&self) -> Result<(), TogetherError> {
        let comments = self
            .store
            .comments_for(&self.wish_id)
            .await
            .map_err(TogetherError::FetchFailed)?;
        *self.comments.borrow_mut() = comments;
        Ok(())
    }

    /// Apply one comment event. Returns true if the thread changed.
    pub async fn apply_event(&self, event: CommentEvent) -> bool {
        match event {
            CommentEvent::Insert(comment) => {
                if comment.wish_id != self.wish_id || self.contains(&comment.id) {
                    return false;
                }
                let joined = match self.store.comment_by_id(&comment.id).await {
                    Ok(Some(joined)) => joined,
                    Ok(None) => return false,
                    Err(error) => {
                        warn!(comment_id = %comment.id, error = %error, "dropping comment event");
                        return false;
                    }
                };

                let mut comments = self.comments.borrow_mut();
                if comments.iter().any(|c| c.id == joined.id) {
                    return false;
                }
                comments.push(joined);
                comments.sort_by_key(|c| c.created_at);
                true
            }
            CommentEvent::Delete(id) => {
                let mut comments = self.comments.borrow_mut();
                let before = comments.len();
                comments.retain(|c| c.id != id);
                before != comments.len()
            }
        }
    }

    /// Subscribe, load, and apply events in arrival order until `shutdown`
    /// resolves.
    ///
    /// # Errors
    ///
    /// Returns [`TogetherError::FetchFailed`] if the initial load fails.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), TogetherError> {
        tokio::pin!(shutdown);
        let mut subscription = self.store.subscribe_comments(&self.wish_id);
        self.refresh().await?;

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                event = subscription.recv() => match event {
                    Some(event) => {
                        let changed = self.apply_event(event).await;
                        debug!(wish_id = %self.wish_id, changed, "comment event handled");
                    }
                    None => break,
                },
            }
        }
        subscription.unsubscribe();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::model::GroupId;
    use crate::model::comment::NewComment;
    use crate::model::user::NewUser;
    use crate::model::wish::{Category, NewWish};
    use crate::store::{ProfileStore, WishStore};

    async fn fixture() -> (Rc<SqliteStore>, WishId, crate::model::UserId) {
        let store = Rc::new(SqliteStore::in_memory().expect("store"));
        let user = store
            .create_user(NewUser {
                email: "ana@example.com".into(),
                display_name: "Ana".into(),
            })
            .await
            .expect("user");
        let wish = store
            .insert_wish(NewWish {
                group_id: GroupId::from("g"),
                category: Category::Movies,
                title: "Paris, Texas".into(),
                description: None,
                image_url: None,
                source_url: None,
                created_by: user.id.clone(),
            })
            .await
            .expect("wish");
        (store, wish.id, user.id)
    }

    #[tokio::test]
    async fn duplicate_insert_events_are_ignored() {
        let (store, wish_id, user_id) = fixture().await;
        let thread = CommentThread::new(store.clone(), wish_id.clone());
        let mut sub = store.subscribe_comments(&wish_id);

        store
            .insert_comment(NewComment {
                wish_id: wish_id.clone(),
                user_id,
                text: "saturday?".into(),
            })
            .await
            .expect("comment");
        let event = sub.try_recv().expect("insert event");

        assert!(thread.apply_event(event.clone()).await);
        assert!(!thread.apply_event(event).await);
        let comments = thread.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(
            comments[0].author.as_ref().map(|a| a.display_name.as_str()),
            Some("Ana")
        );
    }

    #[tokio::test]
    async fn delete_event_removes_comment() {
        let (store, wish_id, user_id) = fixture().await;
        let thread = CommentThread::new(store.clone(), wish_id.clone());
        let comment = store
            .insert_comment(NewComment {
                wish_id: wish_id.clone(),
                user_id,
                text: "yes".into(),
            })
            .await
            .expect("comment");
        thread.refresh().await.expect("load");
        assert_eq!(thread.comments().len(), 1);

        assert!(thread.apply_event(CommentEvent::Delete(comment.id.clone())).await);
        assert!(thread.comments().is_empty());
        assert!(!thread.apply_event(CommentEvent::Delete(comment.id)).await);
    }

    #[tokio::test]
    async fn comments_stay_oldest_first() {
        let (store, wish_id, user_id) = fixture().await;
        for text in ["one", "two", "three"] {
            store
                .insert_comment(NewComment {
                    wish_id: wish_id.clone(),
                    user_id: user_id.clone(),
                    text: text.into(),
                })
                .await
                .expect("comment");
        }
        let thread = CommentThread::new(store, wish_id);
        thread.refresh().await.expect("load");
        let texts: Vec<_> = thread.comments().into_iter().map(|c| c.text).collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }
}
