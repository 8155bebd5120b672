//! Fault-injecting relay between the store's change feed and each device.
//!
//! The realtime feed is reliable, so nothing is ever dropped. Events can be
//! late, repeated, and interleaved differently across rows, but events for
//! the same row reach a device in publish order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use together_core::model::WishId;
use together_core::store::ChangeEvent;

use crate::device::DeviceId;
use crate::rng::SimRng;

/// Delivery fault configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum delivery delay in rounds.
    pub max_delay_rounds: u8,
    /// Percentage of sends delivered twice.
    pub duplicate_rate_percent: u8,
    /// Percentage chance of interleaving rows differently at each tick.
    pub reorder_rate_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 3,
            duplicate_rate_percent: 5,
            reorder_rate_percent: 20,
        }
    }
}

/// One change event on its way to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: DeviceId,
    /// Send order; a duplicate shares its original's sequence.
    pub seq: u64,
    pub event: ChangeEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pending {
    deliver_at_round: u64,
    delivery: Delivery,
}

/// Result of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub duplicated: bool,
    pub delay_rounds: u64,
}

/// Result of delivering every ready message for a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverOutcome {
    pub delivered: Vec<Delivery>,
    /// Whether rows were interleaved differently from send order.
    pub reordered: bool,
}

type RowKey = (DeviceId, WishId);

#[derive(Debug, Clone, Default)]
pub struct SimulatedNetwork {
    pending: Vec<Pending>,
    /// Latest scheduled round per device and row. A later event for the
    /// row is never scheduled before it.
    row_horizon: HashMap<RowKey, u64>,
    next_seq: u64,
    fault: FaultConfig,
}

impl SimulatedNetwork {
    #[must_use]
    pub fn new(fault: FaultConfig) -> Self {
        Self {
            fault,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn fault_config(&self) -> FaultConfig {
        self.fault
    }

    /// Number of queued in-flight deliveries.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queue `event` for `to` with a random delay, possibly twice.
    pub fn send(
        &mut self,
        to: DeviceId,
        event: ChangeEvent,
        round: u64,
        rng: &mut SimRng,
    ) -> SendOutcome {
        let delay = rng.below(u64::from(self.fault.max_delay_rounds) + 1);
        let key = (to, event.wish_id().clone());
        let floor = self.row_horizon.get(&key).copied().unwrap_or(0);
        let deliver_at_round = round.saturating_add(delay).max(floor);
        self.row_horizon.insert(key, deliver_at_round);

        let seq = self.next_seq;
        self.next_seq += 1;
        let delivery = Delivery { to, seq, event };

        let duplicated = rng.chance(self.fault.duplicate_rate_percent);
        if duplicated {
            self.pending.push(Pending {
                deliver_at_round,
                delivery: delivery.clone(),
            });
        }
        self.pending.push(Pending {
            deliver_at_round,
            delivery,
        });

        SendOutcome {
            duplicated,
            delay_rounds: deliver_at_round - round,
        }
    }

    /// Deliver every message whose round has arrived.
    pub fn deliver_ready(&mut self, round: u64, rng: &mut SimRng) -> DeliverOutcome {
        let (ready, later): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|pending| pending.deliver_at_round <= round);
        self.pending = later;

        let delivered: Vec<Delivery> = ready.into_iter().map(|p| p.delivery).collect();
        if delivered.len() > 1 && rng.chance(self.fault.reorder_rate_percent) {
            let (delivered, reordered) = interleave_rows(delivered);
            return DeliverOutcome {
                delivered,
                reordered,
            };
        }
        DeliverOutcome {
            delivered,
            reordered: false,
        }
    }

    /// Deliver everything still in flight.
    pub fn drain_all(&mut self, rng: &mut SimRng) -> DeliverOutcome {
        self.deliver_ready(u64::MAX, rng)
    }
}

/// Reverse the order in which rows appear while keeping each row's own
/// events in sequence.
fn interleave_rows(deliveries: Vec<Delivery>) -> (Vec<Delivery>, bool) {
    let mut rows: Vec<Vec<Delivery>> = Vec::new();
    let mut slots: HashMap<RowKey, usize> = HashMap::new();
    for delivery in deliveries {
        let key = (delivery.to, delivery.event.wish_id().clone());
        let slot = *slots.entry(key).or_insert_with(|| {
            rows.push(Vec::new());
            rows.len() - 1
        });
        rows[slot].push(delivery);
    }
    let changed = rows.len() > 1;
    (rows.into_iter().rev().flatten().collect(), changed)
}
