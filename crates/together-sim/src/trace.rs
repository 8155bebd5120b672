//! Replayable run trace.
//!
//! Store ids are random, so traces name wishes by creation order (`w0`,
//! `w1`, ...). Two runs of the same seed produce identical traces.

use std::collections::HashMap;

use serde::Serialize;
use together_core::model::WishId;
use together_core::model::wish::Category;

use crate::device::DeviceId;

/// Maps store ids to stable per-run labels.
#[derive(Debug, Clone, Default)]
pub struct WishLabels {
    labels: HashMap<WishId, String>,
}

impl WishLabels {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Label a newly created wish.
    pub fn assign(&mut self, id: &WishId) -> String {
        let next = self.labels.len();
        self.labels
            .entry(id.clone())
            .or_insert_with(|| format!("w{next}"))
            .clone()
    }

    /// Label for `id`; unknown ids fall back to the raw id.
    #[must_use]
    pub fn label(&self, id: &WishId) -> String {
        self.labels
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Labels for `ids`, in the given order.
    #[must_use]
    pub fn all<'a>(&self, ids: impl IntoIterator<Item = &'a WishId>) -> Vec<String> {
        ids.into_iter().map(|id| self.label(id)).collect()
    }
}

/// A write a device attempts against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    Add { category: Category },
    Retitle,
    Vote { value: i64 },
    Complete,
    Reopen,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    Write {
        device: DeviceId,
        #[serde(flatten)]
        op: WriteOp,
        wish: Option<String>,
        accepted: bool,
    },
    Send {
        device: DeviceId,
        wish: String,
        event: &'static str,
        delay_rounds: u64,
        duplicated: bool,
    },
    Deliver {
        device: DeviceId,
        wish: String,
        event: &'static str,
        /// Debug form of the reconciler's outcome.
        outcome: String,
        outage: bool,
    },
    Reordered {
        deliveries: usize,
    },
    ScopeChange {
        device: DeviceId,
        scope: String,
    },
    Rollback {
        device: DeviceId,
        wish: String,
    },
    Refresh {
        device: DeviceId,
        entries: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub round: u64,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}
