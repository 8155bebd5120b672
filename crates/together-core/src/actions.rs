//! Validated writes against the store.
//!
//! These never touch a local list directly; each write reaches open lists
//! through the change feed. Deletes that should hide the wish immediately
//! go through [`crate::sync::LiveWishList::delete_wish`] instead.

use chrono::Utc;
use tracing::info;

use crate::error::TogetherError;
use crate::model::comment::{Comment, NewComment};
use crate::model::vote::{NewVote, PriorityValue};
use crate::model::wish::{NewWish, WishPatch, WishRow};
use crate::model::{CommentId, UserId, WishId};
use crate::store::{CommentStore, StoreError, WishStore};
use crate::sync::with_join_fallback;

fn write_error(error: StoreError, wish_id: &WishId) -> TogetherError {
    match error {
        StoreError::NotFound { kind: "wish", .. } => TogetherError::WishNotFound(wish_id.to_string()),
        other => TogetherError::WriteFailed(other),
    }
}

/// Create a wish after trimming and validating its fields.
///
/// # Errors
///
/// [`TogetherError::InvalidTitle`] for a blank title, or
/// [`TogetherError::WriteFailed`] if the store rejects the insert.
pub async fn add_wish(store: &dyn WishStore, wish: NewWish) -> Result<WishRow, TogetherError> {
    let wish = wish.normalized()?;
    let row = store
        .insert_wish(wish)
        .await
        .map_err(TogetherError::WriteFailed)?;
    info!(wish_id = %row.id, category = %row.category, "added wish");
    Ok(row)
}

/// Apply an edit to a wish's title or description.
///
/// # Errors
///
/// [`TogetherError::WishNotFound`] or [`TogetherError::WriteFailed`].
pub async fn edit_wish(
    store: &dyn WishStore,
    id: &WishId,
    patch: &WishPatch,
) -> Result<WishRow, TogetherError> {
    if let Some(title) = &patch.title {
        if title.trim().is_empty() {
            return Err(TogetherError::InvalidTitle);
        }
    }
    store
        .update_wish(id, patch)
        .await
        .map_err(|e| write_error(e, id))
}

/// Mark a wish done, stamping `done_at` with the current time.
///
/// # Errors
///
/// [`TogetherError::WishNotFound`] or [`TogetherError::WriteFailed`].
pub async fn complete_wish(store: &dyn WishStore, id: &WishId) -> Result<WishRow, TogetherError> {
    let row = edit_wish(store, id, &WishPatch::complete(Utc::now())).await?;
    info!(wish_id = %id, "completed wish");
    Ok(row)
}

/// Move a done wish back to the open list and clear `done_at`.
///
/// # Errors
///
/// [`TogetherError::WishNotFound`] or [`TogetherError::WriteFailed`].
pub async fn reopen_wish(store: &dyn WishStore, id: &WishId) -> Result<WishRow, TogetherError> {
    let row = edit_wish(store, id, &WishPatch::reopen()).await?;
    info!(wish_id = %id, "reopened wish");
    Ok(row)
}

/// Record `user`'s priority for a wish. Each user votes once per wish.
///
/// # Errors
///
/// [`TogetherError::InvalidPriority`] outside `1..=5`,
/// [`TogetherError::WishNotFound`], [`TogetherError::DuplicateVote`], or
/// [`TogetherError::WriteFailed`].
pub async fn set_priority(
    store: &dyn WishStore,
    wish_id: &WishId,
    user: &UserId,
    value: i64,
) -> Result<(), TogetherError> {
    let value = PriorityValue::try_from(value)?;
    let (wish, _) = with_join_fallback(move |join| store.wish_by_id(wish_id, join))
        .await
        .map_err(TogetherError::FetchFailed)?;
    let wish = wish.ok_or_else(|| TogetherError::WishNotFound(wish_id.to_string()))?;

    let duplicate = || TogetherError::DuplicateVote {
        wish_id: wish_id.to_string(),
        user_id: user.to_string(),
    };
    if wish.vote_of(user).is_some() {
        return Err(duplicate());
    }

    store
        .insert_vote(NewVote {
            wish_id: wish_id.clone(),
            user_id: user.clone(),
            value,
        })
        .await
        .map_err(|error| match error {
            StoreError::Conflict(_) => duplicate(),
            other => write_error(other, wish_id),
        })?;
    info!(wish_id = %wish_id, value = %value, "set priority");
    Ok(())
}

/// Post a comment on a wish.
///
/// # Errors
///
/// [`TogetherError::InvalidComment`] for blank text,
/// [`TogetherError::WishNotFound`], or [`TogetherError::WriteFailed`].
pub async fn post_comment(
    store: &dyn CommentStore,
    comment: NewComment,
) -> Result<Comment, TogetherError> {
    let comment = comment.normalized()?;
    let wish_id = comment.wish_id.clone();
    store
        .insert_comment(comment)
        .await
        .map_err(|e| write_error(e, &wish_id))
}

/// # Errors
///
/// [`TogetherError::WriteFailed`] if the store rejects the delete.
pub async fn delete_comment(store: &dyn CommentStore, id: &CommentId) -> Result<(), TogetherError> {
    store
        .delete_comment(id)
        .await
        .map_err(TogetherError::WriteFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::model::GroupId;
    use crate::model::user::NewUser;
    use crate::model::wish::Category;
    use crate::store::{JoinSpec, ProfileStore};

    async fn fixture() -> (SqliteStore, UserId, UserId, WishRow) {
        let store = SqliteStore::in_memory().expect("store");
        let mut ids = Vec::new();
        for name in ["ana", "ben"] {
            let user = store
                .create_user(NewUser {
                    email: format!("{name}@example.com"),
                    display_name: name.into(),
                })
                .await
                .expect("user");
            ids.push(user.id);
        }
        let ben = ids.pop().expect("ben");
        let ana = ids.pop().expect("ana");
        let row = add_wish(
            &store,
            NewWish {
                group_id: GroupId::for_pair(&ana, &ben),
                category: Category::Games,
                title: " Outer Wilds ".into(),
                description: None,
                image_url: None,
                source_url: None,
                created_by: ana.clone(),
            },
        )
        .await
        .expect("add");
        (store, ana, ben, row)
    }

    #[tokio::test]
    async fn add_trims_title() {
        let (_store, _ana, _ben, row) = fixture().await;
        assert_eq!(row.title, "Outer Wilds");
        assert!(!row.is_done);
    }

    #[tokio::test]
    async fn complete_then_reopen() {
        let (store, _ana, _ben, row) = fixture().await;
        let done = complete_wish(&store, &row.id).await.expect("complete");
        assert!(done.is_done);
        assert!(done.done_at.is_some());

        let open = reopen_wish(&store, &row.id).await.expect("reopen");
        assert!(!open.is_done);
        assert!(open.done_at.is_none());
    }

    #[tokio::test]
    async fn missing_wish_maps_to_not_found() {
        let (store, _ana, _ben, _row) = fixture().await;
        let result = complete_wish(&store, &WishId::from("nope")).await;
        assert!(matches!(result, Err(TogetherError::WishNotFound(_))));
    }

    #[tokio::test]
    async fn second_vote_by_same_user_is_rejected() {
        let (store, ana, ben, row) = fixture().await;
        set_priority(&store, &row.id, &ana, 5).await.expect("ana votes");
        assert!(matches!(
            set_priority(&store, &row.id, &ana, 3).await,
            Err(TogetherError::DuplicateVote { .. })
        ));
        set_priority(&store, &row.id, &ben, 4).await.expect("ben votes");

        let wish = store
            .wish_by_id(&row.id, JoinSpec::Enriched)
            .await
            .expect("load")
            .expect("present");
        assert_eq!(wish.average_priority(), Some(4.5));
    }

    #[tokio::test]
    async fn out_of_range_priority_is_rejected_before_store() {
        let (store, ana, _ben, row) = fixture().await;
        store.set_offline(true);
        assert!(matches!(
            set_priority(&store, &row.id, &ana, 6).await,
            Err(TogetherError::InvalidPriority(6))
        ));
    }

    #[tokio::test]
    async fn blank_comment_is_rejected() {
        let (store, ana, _ben, row) = fixture().await;
        let result = post_comment(
            &store,
            NewComment {
                wish_id: row.id,
                user_id: ana,
                text: "   ".into(),
            },
        )
        .await;
        assert!(matches!(result, Err(TogetherError::InvalidComment)));
    }
}
