use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::vote::PriorityVote;
use super::{Creator, GroupId, ParseEnumError, UserId, WishId};
use crate::error::TogetherError;
use crate::priority::{self, PriorityRank};

/// The five wish categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Places,
    Restaurants,
    Movies,
    Games,
    Events,
}

impl Category {
    pub const ALL: [Self; 5] = [
        Self::Places,
        Self::Restaurants,
        Self::Movies,
        Self::Games,
        Self::Events,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Places => "places",
            Self::Restaurants => "restaurants",
            Self::Movies => "movies",
            Self::Games => "games",
            Self::Events => "events",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

impl FromStr for Category {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ParseEnumError {
                expected: "category",
                got: s.to_string(),
            })
    }
}

/// Category half of a list scope: every category, or exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    #[must_use]
    pub fn admits(self, category: Category) -> bool {
        match self {
            Self::All => true,
            Self::Only(only) => only == category,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Only(category) => category.as_str(),
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if normalize(s) == "all" {
            return Ok(Self::All);
        }
        s.parse().map(Self::Only).map_err(|_| ParseEnumError {
            expected: "category filter",
            got: s.to_string(),
        })
    }
}

impl TryFrom<String> for CategoryFilter {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CategoryFilter> for String {
    fn from(value: CategoryFilter) -> Self {
        value.as_str().to_string()
    }
}

/// Scalar columns of a wish as stored. This is what UPDATE events carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishRow {
    pub id: WishId,
    pub group_id: GroupId,
    pub category: Category,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
    pub created_by: UserId,
    pub is_done: bool,
    pub done_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A wish with its joined fields, as held in a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wish {
    #[serde(flatten)]
    pub row: WishRow,
    pub creator: Option<Creator>,
    #[serde(default)]
    pub comment_count: u32,
    /// Empty when loaded through the reduced join.
    #[serde(default)]
    pub priority_votes: Vec<PriorityVote>,
}

impl Wish {
    /// Wrap a bare row with no joined data.
    #[must_use]
    pub const fn from_row(row: WishRow) -> Self {
        Self {
            row,
            creator: None,
            comment_count: 0,
            priority_votes: Vec::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &WishId {
        &self.row.id
    }

    #[must_use]
    pub fn rank(&self) -> PriorityRank {
        priority::rank(&self.priority_votes)
    }

    /// Average of both partners' votes, once both have voted.
    #[must_use]
    pub fn average_priority(&self) -> Option<f64> {
        self.rank().average()
    }

    /// Vote cast by `user`, if any.
    #[must_use]
    pub fn vote_of(&self, user: &UserId) -> Option<&PriorityVote> {
        self.priority_votes.iter().find(|v| &v.user_id == user)
    }

    /// Overwrite scalar fields from `row`; joined fields are kept.
    pub fn merge_row(&mut self, row: WishRow) {
        self.row = row;
    }
}

/// Fields supplied when creating a wish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWish {
    pub group_id: GroupId,
    pub category: Category,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
    pub created_by: UserId,
}

impl NewWish {
    /// Trim text fields, dropping blank optionals.
    ///
    /// # Errors
    ///
    /// Returns [`TogetherError::InvalidTitle`] when the title is blank.
    pub fn normalized(self) -> Result<Self, TogetherError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(TogetherError::InvalidTitle);
        }
        Ok(Self {
            title,
            description: trim_optional(self.description),
            image_url: trim_optional(self.image_url),
            source_url: trim_optional(self.source_url),
            ..self
        })
    }
}

fn trim_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Partial update of a wish's mutable scalar fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WishPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub is_done: Option<bool>,
    pub done_at: Option<Option<DateTime<Utc>>>,
}

impl WishPatch {
    /// Mark done, stamping the completion time.
    #[must_use]
    pub fn complete(now: DateTime<Utc>) -> Self {
        Self {
            is_done: Some(true),
            done_at: Some(Some(now)),
            ..Self::default()
        }
    }

    /// Put a done wish back on the open list.
    #[must_use]
    pub fn reopen() -> Self {
        Self {
            is_done: Some(false),
            done_at: Some(None),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.is_done.is_none()
            && self.done_at.is_none()
    }

    /// Apply to a stored row.
    ///
    /// # Errors
    ///
    /// Returns [`TogetherError::InvalidTitle`] if the patch blanks the title.
    pub fn apply_to(&self, row: &mut WishRow) -> Result<(), TogetherError> {
        if let Some(title) = &self.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(TogetherError::InvalidTitle);
            }
            row.title = title.to_string();
        }
        if let Some(description) = &self.description {
            row.description = trim_optional(description.clone());
        }
        if let Some(is_done) = self.is_done {
            row.is_done = is_done;
        }
        if let Some(done_at) = self.done_at {
            row.done_at = done_at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row() -> WishRow {
        WishRow {
            id: WishId::from("w1"),
            group_id: GroupId::from("g1"),
            category: Category::Movies,
            title: "Dune".into(),
            description: None,
            image_url: None,
            source_url: None,
            created_by: UserId::from("u1"),
            is_done: false,
            done_at: None,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).single().expect("ts"),
        }
    }

    #[test]
    fn category_parse_and_display() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
        assert_eq!(" Movies ".parse::<Category>(), Ok(Category::Movies));
        assert!("books".parse::<Category>().is_err());
    }

    #[test]
    fn category_filter_accepts_all() {
        assert_eq!("all".parse::<CategoryFilter>(), Ok(CategoryFilter::All));
        assert_eq!(
            "games".parse::<CategoryFilter>(),
            Ok(CategoryFilter::Only(Category::Games))
        );
        assert!(CategoryFilter::All.admits(Category::Events));
        assert!(!CategoryFilter::Only(Category::Games).admits(Category::Events));
    }

    #[test]
    fn category_filter_serializes_as_string() {
        let json = serde_json::to_string(&CategoryFilter::Only(Category::Places)).expect("json");
        assert_eq!(json, "\"places\"");
        let back: CategoryFilter = serde_json::from_str("\"all\"").expect("parse");
        assert_eq!(back, CategoryFilter::All);
    }

    #[test]
    fn new_wish_rejects_blank_title() {
        let wish = NewWish {
            group_id: GroupId::from("g1"),
            category: Category::Places,
            title: "   ".into(),
            description: Some("  ".into()),
            image_url: None,
            source_url: None,
            created_by: UserId::from("u1"),
        };
        assert!(matches!(
            wish.normalized(),
            Err(TogetherError::InvalidTitle)
        ));
    }

    #[test]
    fn new_wish_trims_fields() {
        let wish = NewWish {
            group_id: GroupId::from("g1"),
            category: Category::Places,
            title: "  Lisbon ".into(),
            description: Some("  ".into()),
            image_url: Some(" https://img ".into()),
            source_url: None,
            created_by: UserId::from("u1"),
        }
        .normalized()
        .expect("valid");
        assert_eq!(wish.title, "Lisbon");
        assert_eq!(wish.description, None);
        assert_eq!(wish.image_url.as_deref(), Some("https://img"));
    }

    #[test]
    fn complete_and_reopen_patches() {
        let now = Utc.timestamp_opt(1_700_000_500, 0).single().expect("ts");
        let mut r = row();
        WishPatch::complete(now).apply_to(&mut r).expect("apply");
        assert!(r.is_done);
        assert_eq!(r.done_at, Some(now));

        WishPatch::reopen().apply_to(&mut r).expect("apply");
        assert!(!r.is_done);
        assert_eq!(r.done_at, None);
    }

    #[test]
    fn merge_row_keeps_joined_fields() {
        let mut wish = Wish::from_row(row());
        wish.comment_count = 3;
        let mut updated = row();
        updated.title = "Dune: Part Two".into();
        wish.merge_row(updated);
        assert_eq!(wish.row.title, "Dune: Part Two");
        assert_eq!(wish.comment_count, 3);
    }
}
