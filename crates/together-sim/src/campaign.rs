//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with the same parameters, collecting pass/fail
//! results and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::network::FaultConfig;
use crate::oracle::{InvariantViolation, format_violation};
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration: which seeds to run and the simulation
/// parameters shared by every seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub seed_range: Range<u64>,
    pub rounds: u64,
    pub writes_per_round: u8,
    /// Maximum delivery delay in rounds.
    pub fault_max_delay: u8,
    /// Percent of events delivered twice.
    pub fault_duplicate_percent: u8,
    /// Percent of ticks that interleave rows differently.
    pub fault_reorder_percent: u8,
    /// Percent of deliveries and deletes hit by a store outage.
    pub outage_percent: u8,
    pub scope_change_percent: u8,
    pub degraded_store: bool,
    /// Percent of point lookups answered one or more rounds late.
    pub lookup_lag_percent: u8,
    pub max_lookup_lag_rounds: u8,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..100,
            rounds: 24,
            writes_per_round: 2,
            fault_max_delay: 3,
            fault_duplicate_percent: 5,
            fault_reorder_percent: 20,
            outage_percent: 5,
            scope_change_percent: 5,
            degraded_store: false,
            lookup_lag_percent: 20,
            max_lookup_lag_rounds: 2,
        }
    }
}

impl CampaignConfig {
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            rounds: self.rounds,
            writes_per_round: self.writes_per_round,
            fault: FaultConfig {
                max_delay_rounds: self.fault_max_delay,
                duplicate_rate_percent: self.fault_duplicate_percent,
                reorder_rate_percent: self.fault_reorder_percent,
            },
            outage_rate_percent: self.outage_percent,
            scope_change_rate_percent: self.scope_change_percent,
            degraded_store: self.degraded_store,
            lookup_lag_percent: self.lookup_lag_percent,
            max_lookup_lag_rounds: self.max_lookup_lag_rounds,
        }
    }

    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if self.writes_per_round == 0 {
            bail!("writes_per_round must be > 0");
        }
        for (name, percent) in [
            ("fault_duplicate_percent", self.fault_duplicate_percent),
            ("fault_reorder_percent", self.fault_reorder_percent),
            ("outage_percent", self.outage_percent),
            ("scope_change_percent", self.scope_change_percent),
            ("lookup_lag_percent", self.lookup_lag_percent),
        ] {
            if percent > 100 {
                bail!("{name} must be <= 100, got {percent}");
            }
        }
        Ok(())
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed, for replay.
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that exercised tombstone suppression, a rolled-back delete, or
    /// a delete overtaking an insert enrichment.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run one seed to completion on a fresh single-threaded runtime.
fn simulate(config: SimulationConfig) -> Result<SimulationResult> {
    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    runtime.block_on(async move { Simulator::new(config).await?.run().await })
}

/// Run every seed in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a seed hits a harness
/// failure. Invariant violations are reported, not returned.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        report.seeds_run += 1;
        let result = simulate(config.sim_config_for_seed(seed))?;
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }
        if result.oracle.passed {
            report.seeds_passed += 1;
        } else {
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: result.oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    tracing::info!(
        seeds = report.seeds_run,
        passed = report.seeds_passed,
        "campaign finished"
    );
    Ok(report)
}

/// Run a single seed and return `Ok(())` on pass, `Err(violations)` on
/// failure.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself fails. The inner
/// `Result` distinguishes pass from invariant violations.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let result = simulate(config.sim_config_for_seed(seed))?;
    if result.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(result.oracle.violations))
    }
}

/// Replay a single seed with its full trace for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    config.validate()?;
    simulate(config.sim_config_for_seed(seed))
}
