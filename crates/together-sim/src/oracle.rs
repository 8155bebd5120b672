use std::collections::{HashMap, HashSet};

use together_core::model::WishId;
use together_core::model::wish::Wish;
use together_core::priority::sort_wishes;
use together_core::sync::WishListView;

use crate::device::DeviceId;
use crate::trace::WishLabels;

// ── Result types ─────────────────────────────────────────────────────────────

/// Accumulated outcome of invariant checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl Default for OracleResult {
    fn default() -> Self {
        Self::pass()
    }
}

impl OracleResult {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Fold another result into this one. Failures accumulate.
    pub fn merge(&mut self, other: Self) {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
    }
}

/// A broken list invariant, with wishes named by trace label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Two entries share an id.
    DuplicateEntry { device: DeviceId, wish: String },
    /// An entry the list's scope does not admit.
    OutOfScope { device: DeviceId, wish: String },
    /// A tombstoned id is visible.
    TombstoneVisible { device: DeviceId, wish: String },
    /// Entries are not in priority order; `position` is the first
    /// mismatching index.
    Unsorted { device: DeviceId, position: usize },
    /// A failed delete left the wish hidden or tombstoned.
    RollbackIncomplete {
        device: DeviceId,
        wish: String,
        restored: bool,
        tombstoned: bool,
    },
    /// After every event was delivered, an entry disagrees with the store.
    Unsound {
        device: DeviceId,
        wish: String,
        reason: String,
    },
    /// After every event was delivered, a tombstone is still held.
    LingeringTombstone { device: DeviceId, wish: String },
    /// A refreshed list differs from a fresh load of the same scope.
    RefreshMismatch {
        device: DeviceId,
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

// ── Oracle ───────────────────────────────────────────────────────────────────

/// Invariant checks for a device's live list.
///
/// # Invariants checked
///
/// 1. **Step** (`check_step`): after every write and every delivery, no
///    duplicate ids, every entry in scope, no tombstoned entry visible, and
///    entries in priority order.
/// 2. **Rollback** (`check_rollback`): a failed delete restores what it hid
///    and clears its tombstone.
/// 3. **Soundness** (`check_soundness`): once the network is drained, every
///    entry exists in the store with identical fields and no tombstone
///    remains. A list may still be missing rows (an UPDATE for a row it never
///    held is ignored), so this is not completeness.
/// 4. **Refresh** (`check_refresh`): a refreshed list equals an independent
///    load of its scope, in order.
pub struct ListOracle;

impl ListOracle {
    #[must_use]
    pub fn check_step(
        device: DeviceId,
        view: &WishListView,
        tombstoned: &[WishId],
        labels: &WishLabels,
    ) -> OracleResult {
        let mut violations = Vec::new();
        let tombstoned: HashSet<&WishId> = tombstoned.iter().collect();
        let mut seen = HashSet::new();

        for wish in &view.wishes {
            let id = wish.id();
            if !seen.insert(id) {
                violations.push(InvariantViolation::DuplicateEntry {
                    device,
                    wish: labels.label(id),
                });
            }
            if !view.scope.admits(wish) {
                violations.push(InvariantViolation::OutOfScope {
                    device,
                    wish: labels.label(id),
                });
            }
            if tombstoned.contains(id) {
                violations.push(InvariantViolation::TombstoneVisible {
                    device,
                    wish: labels.label(id),
                });
            }
        }

        let sorted = sort_wishes(view.wishes.clone());
        if let Some(position) = sorted
            .iter()
            .zip(&view.wishes)
            .position(|(want, got)| want.id() != got.id())
        {
            violations.push(InvariantViolation::Unsorted { device, position });
        }

        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_rollback(
        device: DeviceId,
        wish: String,
        was_present: bool,
        is_present: bool,
        tombstoned: bool,
    ) -> OracleResult {
        let restored = !was_present || is_present;
        if restored && !tombstoned {
            return OracleResult::pass();
        }
        OracleResult::from_violations(vec![InvariantViolation::RollbackIncomplete {
            device,
            wish,
            restored,
            tombstoned,
        }])
    }

    #[must_use]
    pub fn check_soundness(
        device: DeviceId,
        wishes: &[Wish],
        truth: &HashMap<WishId, Wish>,
        tombstoned: &[WishId],
        labels: &WishLabels,
    ) -> OracleResult {
        let mut violations: Vec<InvariantViolation> = wishes
            .iter()
            .filter_map(|wish| {
                let reason = match truth.get(wish.id()) {
                    None => "deleted in store".to_string(),
                    Some(stored) if stored == wish => return None,
                    Some(stored) => describe_difference(stored, wish),
                };
                Some(InvariantViolation::Unsound {
                    device,
                    wish: labels.label(wish.id()),
                    reason,
                })
            })
            .collect();

        violations.extend(tombstoned.iter().map(|id| {
            InvariantViolation::LingeringTombstone {
                device,
                wish: labels.label(id),
            }
        }));

        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_refresh(
        device: DeviceId,
        actual: &[Wish],
        expected: &[Wish],
        labels: &WishLabels,
    ) -> OracleResult {
        if actual == expected {
            return OracleResult::pass();
        }
        OracleResult::from_violations(vec![InvariantViolation::RefreshMismatch {
            device,
            expected: labels.all(expected.iter().map(Wish::id)),
            actual: labels.all(actual.iter().map(Wish::id)),
        }])
    }
}

fn describe_difference(stored: &Wish, held: &Wish) -> String {
    let mut fields = Vec::new();
    if stored.row.title != held.row.title {
        fields.push("title");
    }
    if stored.row.is_done != held.row.is_done {
        fields.push("is_done");
    }
    if stored.row.category != held.row.category {
        fields.push("category");
    }
    if stored.priority_votes != held.priority_votes {
        fields.push("priority_votes");
    }
    if stored.creator != held.creator {
        fields.push("creator");
    }
    if fields.is_empty() {
        "differs from store".to_string()
    } else {
        format!("stale {}", fields.join(", "))
    }
}

/// Human-readable form of a violation.
#[must_use]
pub fn format_violation(violation: &InvariantViolation) -> String {
    match violation {
        InvariantViolation::DuplicateEntry { device, wish } => {
            format!("DuplicateEntry: device {device} holds {wish} twice")
        }
        InvariantViolation::OutOfScope { device, wish } => {
            format!("OutOfScope: device {device} holds {wish} outside its scope")
        }
        InvariantViolation::TombstoneVisible { device, wish } => {
            format!("TombstoneVisible: device {device} shows tombstoned {wish}")
        }
        InvariantViolation::Unsorted { device, position } => {
            format!("Unsorted: device {device} out of priority order at index {position}")
        }
        InvariantViolation::RollbackIncomplete {
            device,
            wish,
            restored,
            tombstoned,
        } => format!(
            "RollbackIncomplete: device {device} failed delete of {wish} \
             (restored={restored}, tombstoned={tombstoned})"
        ),
        InvariantViolation::Unsound {
            device,
            wish,
            reason,
        } => format!("Unsound: device {device} holds {wish}: {reason}"),
        InvariantViolation::LingeringTombstone { device, wish } => {
            format!("LingeringTombstone: device {device} still tombstones {wish}")
        }
        InvariantViolation::RefreshMismatch {
            device,
            expected,
            actual,
        } => format!(
            "RefreshMismatch: device {device} expected {expected:?}, got {actual:?}"
        ),
    }
}
