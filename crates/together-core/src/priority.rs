//! Priority aggregation and list ordering.
//!
//! A wish is *ranked* once both partners have voted. Its rank is the vote
//! sum, which orders identically to the average and stays exact. Ranked
//! wishes sort ahead of unranked ones, highest first; everything else keeps
//! the order it arrived in.

use std::cmp::Reverse;

use serde::Serialize;

use crate::model::vote::PriorityVote;
use crate::model::wish::Wish;

/// Number of votes a wish needs before it is ranked.
pub const VOTES_FOR_RANK: usize = 2;

/// Ranking key derived from a wish's votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PriorityRank {
    Unranked,
    Ranked { sum: u8 },
}

impl PriorityRank {
    #[must_use]
    pub const fn is_ranked(self) -> bool {
        matches!(self, Self::Ranked { .. })
    }

    /// Arithmetic mean of the two votes.
    #[must_use]
    pub fn average(self) -> Option<f64> {
        match self {
            Self::Unranked => None,
            Self::Ranked { sum } => Some(f64::from(sum) / 2.0),
        }
    }
}

/// Rank from 0..=2 votes. Any count other than exactly two is unranked.
#[must_use]
pub fn rank(votes: &[PriorityVote]) -> PriorityRank {
    if votes.len() != VOTES_FOR_RANK {
        return PriorityRank::Unranked;
    }
    let sum = votes.iter().map(|v| v.value.get()).sum();
    PriorityRank::Ranked { sum }
}

/// Order a collection: ranked wishes descending (stable on ties), then
/// unranked wishes in their original relative order.
#[must_use]
pub fn sort_wishes(wishes: Vec<Wish>) -> Vec<Wish> {
    let (mut ranked, unranked): (Vec<_>, Vec<_>) = wishes
        .into_iter()
        .map(|wish| (wish.rank(), wish))
        .partition(|(rank, _)| rank.is_ranked());

    ranked.sort_by_key(|(rank, _)| match *rank {
        PriorityRank::Ranked { sum } => Reverse(sum),
        PriorityRank::Unranked => Reverse(0),
    });

    ranked
        .into_iter()
        .chain(unranked)
        .map(|(_, wish)| wish)
        .collect()
}
