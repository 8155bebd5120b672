//! Two partner devices, one shared store, and a faulty relay between them.
//!
//! Each round, devices issue random writes (add, retitle, vote, complete,
//! reopen, delete) and occasionally switch scope. Every published change
//! event is relayed to both devices through [`SimulatedNetwork`]. Devices
//! read the store through a [`LaggedStore`], so an INSERT enrichment can stay
//! outstanding for a few rounds while later deliveries are applied. List
//! invariants are checked after every step; once the run ends and the
//! network is drained, each list is checked for soundness against the store,
//! then refreshed and compared with an independent load.

use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{Context as _, Result, bail};
use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use together_core::actions;
use together_core::db::SqliteStore;
use together_core::filter::WishScope;
use together_core::model::user::NewUser;
use together_core::model::wish::{Category, CategoryFilter, NewWish, Wish, WishPatch};
use together_core::model::{GroupId, WishId};
use together_core::session::Session;
use together_core::store::{ProfileStore, WishQuery, WishStore};
use together_core::sync::{Applied, IgnoreReason, load_snapshot, with_join_fallback};
use tracing::{debug, info};

use crate::device::{Device, DeviceId};
use crate::lagged::LaggedStore;
use crate::network::{DeliverOutcome, FaultConfig, SimulatedNetwork};
use crate::oracle::{ListOracle, OracleResult};
use crate::rng::SimRng;
use crate::trace::{TraceEvent, TraceEventKind, WishLabels, WriteOp};

/// Parameters for one simulated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub rounds: u64,
    pub writes_per_round: u8,
    pub fault: FaultConfig,
    /// Percentage of deliveries and deletes attempted while the store is
    /// unreachable.
    pub outage_rate_percent: u8,
    /// Percentage chance per round that a device switches scope.
    pub scope_change_rate_percent: u8,
    /// Run against a store without the votes relation.
    pub degraded_store: bool,
    /// Percentage of point lookups answered one or more rounds late.
    pub lookup_lag_percent: u8,
    pub max_lookup_lag_rounds: u8,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            rounds: 24,
            writes_per_round: 2,
            fault: FaultConfig::default(),
            outage_rate_percent: 5,
            scope_change_rate_percent: 5,
            degraded_store: false,
            lookup_lag_percent: 20,
            max_lookup_lag_rounds: 2,
        }
    }
}

/// Counters over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    pub writes: usize,
    pub rejected_writes: usize,
    pub sends: usize,
    pub duplicated: usize,
    pub reorders: usize,
    pub deliveries: usize,
    pub suppressed_by_tombstone: usize,
    pub dropped_inserts: usize,
    pub held_lookups: usize,
    /// Inserts dropped because the row was deleted during enrichment.
    pub superseded_inserts: usize,
    /// Inserts discarded because the device changed scope meanwhile.
    pub stale_inserts: usize,
    pub rollbacks: usize,
    pub scope_changes: usize,
}

/// A device's list after the final refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub id: DeviceId,
    pub scope: String,
    pub wishes: Vec<String>,
    pub tombstones: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub trace: Vec<TraceEvent>,
    pub stats: SimulationStats,
    pub states: Vec<DeviceState>,
    pub oracle: OracleResult,
    /// Whether the run exercised tombstone suppression, a rolled-back
    /// delete, or a delete overtaking an insert enrichment.
    pub interesting_state_reached: bool,
}

/// A delivery the device has finished handling.
struct Delivered {
    device: DeviceId,
    wish: String,
    event: &'static str,
    outage: bool,
    applied: Applied,
}

const PARTNERS: [(&str, &str); 2] = [("ana@sim.local", "Ana"), ("ben@sim.local", "Ben")];

#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    rng: SimRng,
    store: Rc<SqliteStore>,
    lists: Rc<LaggedStore>,
    group: GroupId,
    devices: Vec<Device>,
    network: SimulatedNetwork,
    in_flight: FuturesUnordered<LocalBoxFuture<'static, Delivered>>,
    labels: WishLabels,
    known: Vec<WishId>,
    trace: Vec<TraceEvent>,
    stats: SimulationStats,
    oracle: OracleResult,
    round: u64,
}

impl Simulator {
    /// Create both partners, link them, and load each device's list.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the partners
    /// cannot be linked.
    pub async fn new(config: SimulationConfig) -> Result<Self> {
        let store = if config.degraded_store {
            SqliteStore::in_memory_at_version(1)?
        } else {
            SqliteStore::in_memory()?
        };
        let store = Rc::new(store);
        let profiles: Rc<dyn ProfileStore> = Rc::clone(&store) as Rc<dyn ProfileStore>;

        let mut sessions = Vec::with_capacity(PARTNERS.len());
        for (email, name) in PARTNERS {
            let user = store
                .create_user(NewUser {
                    email: email.to_string(),
                    display_name: name.to_string(),
                })
                .await
                .with_context(|| format!("create {email}"))?;
            sessions.push(Session::start(Rc::clone(&profiles), &user.id).await?);
        }
        let code = sessions[0].create_invite().await?;
        let group = sessions[1].link_partner(&code).await?;
        sessions[0].refresh().await?;

        let mut rng = SimRng::new(config.seed);
        let lists = Rc::new(LaggedStore::new(
            Rc::clone(&store),
            config.seed,
            config.lookup_lag_percent,
            config.max_lookup_lag_rounds,
        ));
        let mut devices = Vec::with_capacity(sessions.len());
        for (id, session) in sessions.iter().enumerate() {
            let user = session.user_id().context("session has no user")?;
            let scope = if id == 0 {
                session.scope(CategoryFilter::All, false)
            } else {
                random_scope(&mut rng, &group)
            };
            let reads = Rc::clone(&lists) as Rc<dyn WishStore>;
            let device = Device::new(id, user, reads, &group, scope);
            device.list().refresh().await?;
            devices.push(device);
        }

        info!(seed = config.seed, degraded = config.degraded_store, "simulation ready");
        Ok(Self {
            config,
            rng,
            store,
            lists,
            group,
            devices,
            network: SimulatedNetwork::new(config.fault),
            in_flight: FuturesUnordered::new(),
            labels: WishLabels::new(),
            known: Vec::new(),
            trace: Vec::new(),
            stats: SimulationStats::default(),
            oracle: OracleResult::pass(),
            round: 0,
        })
    }

    /// Run every round, drain the network, and check the final state.
    ///
    /// # Errors
    ///
    /// Returns an error only for harness failures (store unreachable while
    /// no outage is injected). Invariant violations are reported in the
    /// result.
    pub async fn run(mut self) -> Result<SimulationResult> {
        for round in 0..self.config.rounds {
            self.round = round;
            self.lists.advance_to(round);
            self.settle();
            for _ in 0..self.config.writes_per_round {
                self.random_write().await;
            }
            if self.rng.chance(self.config.scope_change_rate_percent) {
                self.change_scope().await?;
            }
            self.relay();
            let outcome = self.network.deliver_ready(round, &mut self.rng);
            self.deliver(outcome, true);
        }

        self.round = self.config.rounds;
        self.relay();
        let outcome = self.network.drain_all(&mut self.rng);
        self.deliver(outcome, false);
        self.lists.release_all();
        self.settle();
        if !self.in_flight.is_empty() {
            bail!("{} deliveries still pending after release", self.in_flight.len());
        }
        self.stats.held_lookups = self.lists.held();

        self.check_soundness().await?;
        self.refresh_and_compare().await?;
        Ok(self.finish())
    }

    fn record(&mut self, kind: TraceEventKind) {
        self.trace.push(TraceEvent {
            round: self.round,
            kind,
        });
    }

    fn check_step(&mut self, device: DeviceId) {
        let list = self.devices[device].list();
        let result =
            ListOracle::check_step(device, &list.view(), &list.tombstoned_ids(), &self.labels);
        self.oracle.merge(result);
    }

    fn check_all_steps(&mut self) {
        for device in 0..self.devices.len() {
            self.check_step(device);
        }
    }

    fn pick_op(&mut self) -> WriteOp {
        match self.rng.below(100) {
            0..30 => WriteOp::Add {
                category: *self.rng.pick(&Category::ALL).unwrap_or(&Category::Places),
            },
            30..40 => WriteOp::Retitle,
            40..65 => WriteOp::Vote {
                value: i64::try_from(self.rng.below(5)).unwrap_or(0) + 1,
            },
            65..75 => WriteOp::Complete,
            75..80 => WriteOp::Reopen,
            _ => WriteOp::Delete,
        }
    }

    async fn random_write(&mut self) {
        let device = self.rng.index(self.devices.len());
        let mut op = self.pick_op();
        let target = if matches!(op, WriteOp::Add { .. }) {
            None
        } else {
            self.rng.pick(&self.known).cloned()
        };
        if target.is_none() {
            op = WriteOp::Add {
                category: *self.rng.pick(&Category::ALL).unwrap_or(&Category::Places),
            };
        }

        let accepted = match (op, &target) {
            (WriteOp::Delete, Some(id)) => self.delete(device, id).await,
            (op, target) => self.write(device, op, target.as_ref()).await,
        };

        self.stats.writes += 1;
        if !accepted {
            self.stats.rejected_writes += 1;
        }
        let wish = match &target {
            Some(id) => Some(self.labels.label(id)),
            None if accepted => self.known.last().map(|id| self.labels.label(id)),
            None => None,
        };
        self.record(TraceEventKind::Write {
            device,
            op,
            wish,
            accepted,
        });
        self.check_all_steps();
    }

    /// Plain store write through the action layer. Returns whether the store
    /// accepted it.
    async fn write(&mut self, device: DeviceId, op: WriteOp, target: Option<&WishId>) -> bool {
        let store = self.store.as_ref();
        let user = self.devices[device].user().clone();
        let result = match (op, target) {
            (WriteOp::Add { category }, _) => {
                let title = format!("wish {}", self.known.len());
                match actions::add_wish(
                    store,
                    NewWish {
                        group_id: self.group.clone(),
                        category,
                        title,
                        description: None,
                        image_url: None,
                        source_url: None,
                        created_by: user,
                    },
                )
                .await
                {
                    Ok(row) => {
                        self.labels.assign(&row.id);
                        self.known.push(row.id);
                        Ok(())
                    }
                    Err(error) => Err(error),
                }
            }
            (WriteOp::Retitle, Some(id)) => {
                let patch = WishPatch {
                    title: Some(format!("{} (r{})", self.labels.label(id), self.round)),
                    ..WishPatch::default()
                };
                actions::edit_wish(store, id, &patch).await.map(drop)
            }
            (WriteOp::Vote { value }, Some(id)) => {
                actions::set_priority(store, id, &user, value).await
            }
            (WriteOp::Complete, Some(id)) => actions::complete_wish(store, id).await.map(drop),
            (WriteOp::Reopen, Some(id)) => actions::reopen_wish(store, id).await.map(drop),
            _ => return false,
        };
        if let Err(error) = &result {
            debug!(device, error = %error, "write rejected");
        }
        result.is_ok()
    }

    /// Optimistic delete through the device's list, sometimes during an
    /// outage so the removal rolls back.
    async fn delete(&mut self, device: DeviceId, id: &WishId) -> bool {
        let outage = self.rng.chance(self.config.outage_rate_percent);
        let list = self.devices[device].list();
        let was_present = list.get(id).is_some();

        self.store.set_offline(outage);
        let result = list.delete_wish(id).await;
        self.store.set_offline(false);

        if result.is_ok() {
            // A DELETE for a missing row is never published, so a deleted id
            // must not be targeted again.
            self.known.retain(|known| known != id);
            return true;
        }
        let is_present = list.get(id).is_some();
        let tombstoned = list.is_tombstoned(id);
        let wish = self.labels.label(id);
        self.oracle.merge(ListOracle::check_rollback(
            device,
            wish.clone(),
            was_present,
            is_present,
            tombstoned,
        ));
        self.stats.rollbacks += 1;
        self.record(TraceEventKind::Rollback { device, wish });
        false
    }

    async fn change_scope(&mut self) -> Result<()> {
        let device = self.rng.index(self.devices.len());
        let scope = random_scope(&mut self.rng, &self.group);
        self.record(TraceEventKind::ScopeChange {
            device,
            scope: scope_label(&scope),
        });
        self.stats.scope_changes += 1;

        let list = self.devices[device].list();
        list.set_scope(scope);
        list.refresh().await?;
        self.check_step(device);
        Ok(())
    }

    /// Move every newly published event into the network.
    fn relay(&mut self) {
        for device in 0..self.devices.len() {
            for event in self.devices[device].take_published() {
                let wish = self.labels.label(event.wish_id());
                let kind = event.kind();
                let sent = self.network.send(device, event, self.round, &mut self.rng);
                self.stats.sends += 1;
                if sent.duplicated {
                    self.stats.duplicated += 1;
                }
                self.record(TraceEventKind::Send {
                    device,
                    wish,
                    event: kind,
                    delay_rounds: sent.delay_rounds,
                    duplicated: sent.duplicated,
                });
            }
        }
    }

    fn deliver(&mut self, outcome: DeliverOutcome, allow_outage: bool) {
        if outcome.reordered {
            self.stats.reorders += 1;
            self.record(TraceEventKind::Reordered {
                deliveries: outcome.delivered.len(),
            });
        }

        for delivery in outcome.delivered {
            let outage = allow_outage && self.rng.chance(self.config.outage_rate_percent);
            let device = delivery.to;
            let wish = self.labels.label(delivery.event.wish_id());
            let event = delivery.event.kind();
            let applying = self.devices[device].deliver(delivery.event);
            self.in_flight.push(
                async move {
                    Delivered {
                        device,
                        wish,
                        event,
                        outage,
                        applied: applying.await,
                    }
                }
                .boxed_local(),
            );

            self.store.set_offline(outage);
            self.settle();
            self.store.set_offline(false);
        }
    }

    /// Poll in-flight deliveries until none can make progress without a
    /// later round.
    fn settle(&mut self) {
        loop {
            let Some(Some(done)) = self.in_flight.next().now_or_never() else {
                break;
            };
            self.finish_delivery(done);
        }
    }

    fn finish_delivery(&mut self, done: Delivered) {
        let Delivered {
            device,
            wish,
            event,
            outage,
            applied,
        } = done;
        self.stats.deliveries += 1;
        match applied {
            Applied::Ignored(IgnoreReason::Tombstoned) => {
                self.stats.suppressed_by_tombstone += 1;
            }
            Applied::Ignored(IgnoreReason::FetchFailed) => self.stats.dropped_inserts += 1,
            Applied::Ignored(IgnoreReason::Superseded) => self.stats.superseded_inserts += 1,
            Applied::Ignored(IgnoreReason::Stale) => self.stats.stale_inserts += 1,
            _ => {}
        }
        self.record(TraceEventKind::Deliver {
            device,
            wish,
            event,
            outcome: format!("{applied:?}"),
            outage,
        });
        self.check_step(device);
    }

    /// Every wish in the group, open and done, keyed by id.
    async fn load_truth(&self) -> Result<HashMap<WishId, Wish>> {
        let store = self.store.as_ref();
        let mut truth = HashMap::new();
        for done in [false, true] {
            let query = WishQuery {
                group_id: self.group.clone(),
                category: CategoryFilter::All,
                done,
            };
            let query = &query;
            let (wishes, _) =
                with_join_fallback(move |join| store.query_wishes(query, join)).await?;
            truth.extend(wishes.into_iter().map(|w| (w.id().clone(), w)));
        }
        Ok(truth)
    }

    async fn check_soundness(&mut self) -> Result<()> {
        let truth = self.load_truth().await?;
        for device in 0..self.devices.len() {
            let list = self.devices[device].list();
            let result = ListOracle::check_soundness(
                device,
                &list.wishes(),
                &truth,
                &list.tombstoned_ids(),
                &self.labels,
            );
            self.oracle.merge(result);
        }
        Ok(())
    }

    async fn refresh_and_compare(&mut self) -> Result<()> {
        for device in 0..self.devices.len() {
            let list = self.devices[device].list();
            list.refresh().await?;
            let expected = load_snapshot(self.store.as_ref(), &list.scope()).await?;
            let actual = list.wishes();
            let result = ListOracle::check_refresh(device, &actual, &expected.wishes, &self.labels);
            self.oracle.merge(result);
            self.record(TraceEventKind::Refresh {
                device,
                entries: actual.len(),
            });
            self.check_step(device);
        }
        Ok(())
    }

    fn finish(self) -> SimulationResult {
        let states = self
            .devices
            .iter()
            .map(|device| {
                let list = device.list();
                let mut tombstones = self.labels.all(&list.tombstoned_ids());
                tombstones.sort();
                DeviceState {
                    id: device.id(),
                    scope: scope_label(&list.scope()),
                    wishes: self.labels.all(list.wishes().iter().map(Wish::id)),
                    tombstones,
                }
            })
            .collect();

        let interesting_state_reached = self.stats.suppressed_by_tombstone > 0
            || self.stats.rollbacks > 0
            || self.stats.superseded_inserts > 0;
        info!(
            seed = self.config.seed,
            passed = self.oracle.passed,
            writes = self.stats.writes,
            deliveries = self.stats.deliveries,
            "simulation finished"
        );
        SimulationResult {
            trace: self.trace,
            stats: self.stats,
            states,
            oracle: self.oracle,
            interesting_state_reached,
        }
    }
}

fn random_scope(rng: &mut SimRng, group: &GroupId) -> WishScope {
    let category = if rng.chance(50) {
        CategoryFilter::All
    } else {
        CategoryFilter::Only(*rng.pick(&Category::ALL).unwrap_or(&Category::Places))
    };
    WishScope::new(group.clone(), category, rng.chance(25))
}

/// Scope without the group id, which is random per run.
fn scope_label(scope: &WishScope) -> String {
    format!("{}:{}", scope.category, scope.done)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(config: SimulationConfig) -> SimulationResult {
        Simulator::new(config)
            .await
            .expect("setup")
            .run()
            .await
            .expect("run")
    }

    #[tokio::test]
    async fn default_run_passes() {
        let result = run(SimulationConfig::default()).await;
        assert!(result.oracle.passed, "{:?}", result.oracle.violations);
        assert!(result.stats.writes > 0);
        assert!(result.stats.deliveries >= result.stats.sends);
        assert_eq!(result.states.len(), 2);
        assert!(result.states.iter().all(|s| s.tombstones.is_empty()));
    }

    #[tokio::test]
    async fn degraded_store_passes_and_rejects_votes() {
        let result = run(SimulationConfig {
            seed: 3,
            degraded_store: true,
            ..SimulationConfig::default()
        })
        .await;
        assert!(result.oracle.passed, "{:?}", result.oracle.violations);
        let accepted_votes = result
            .trace
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    TraceEventKind::Write {
                        op: WriteOp::Vote { .. },
                        accepted: true,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(accepted_votes, 0);
    }

    #[tokio::test]
    async fn every_send_is_delivered() {
        let result = run(SimulationConfig {
            seed: 8,
            fault: FaultConfig {
                max_delay_rounds: 5,
                duplicate_rate_percent: 0,
                reorder_rate_percent: 50,
            },
            ..SimulationConfig::default()
        })
        .await;
        assert_eq!(result.stats.deliveries, result.stats.sends);
    }

    #[tokio::test]
    async fn outages_roll_back_deletes() {
        let result = run(SimulationConfig {
            seed: 12,
            rounds: 40,
            outage_rate_percent: 60,
            ..SimulationConfig::default()
        })
        .await;
        assert!(result.oracle.passed, "{:?}", result.oracle.violations);
        assert!(result.stats.rollbacks > 0);
        assert!(result.interesting_state_reached);
    }

    #[tokio::test]
    async fn late_lookups_overlap_later_deliveries() {
        let result = run(SimulationConfig {
            seed: 21,
            rounds: 40,
            lookup_lag_percent: 60,
            max_lookup_lag_rounds: 3,
            ..SimulationConfig::default()
        })
        .await;
        assert!(result.oracle.passed, "{:?}", result.oracle.violations);
        assert!(result.stats.held_lookups > 0);
        assert_eq!(result.stats.deliveries, result.stats.sends + result.stats.duplicated);
    }

    #[test]
    fn scope_label_omits_group() {
        let scope = WishScope::new(GroupId::from("a_b"), CategoryFilter::All, true);
        assert_eq!(scope_label(&scope), "all:true");
    }
}
