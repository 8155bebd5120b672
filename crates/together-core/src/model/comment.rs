use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CommentId, Creator, UserId, WishId};
use crate::error::TogetherError;

/// A comment on a wish, with its author joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub wish_id: WishId,
    pub user_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author: Option<Creator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub wish_id: WishId,
    pub user_id: UserId,
    pub text: String,
}

impl NewComment {
    /// # Errors
    ///
    /// Returns [`TogetherError::InvalidComment`] when the text is blank.
    pub fn normalized(self) -> Result<Self, TogetherError> {
        let text = self.text.trim().to_string();
        if text.is_empty() {
            return Err(TogetherError::InvalidComment);
        }
        Ok(Self { text, ..self })
    }
}
