use serde::{Deserialize, Serialize};
use std::fmt;

use super::{UserId, WishId};
use crate::error::TogetherError;

/// A single partner's priority for a wish, `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct PriorityValue(u8);

impl PriorityValue {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for PriorityValue {
    type Error = TogetherError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(v) if (Self::MIN..=Self::MAX).contains(&v) => Ok(Self(v)),
            _ => Err(TogetherError::InvalidPriority(value)),
        }
    }
}

impl From<PriorityValue> for i64 {
    fn from(value: PriorityValue) -> Self {
        Self::from(value.0)
    }
}

impl fmt::Display for PriorityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A vote as joined onto a wish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityVote {
    pub user_id: UserId,
    pub value: PriorityValue,
}

/// A vote to be written. Votes are insert-only; one per `(wish, user)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVote {
    pub wish_id: WishId,
    pub user_id: UserId,
    pub value: PriorityValue,
}
