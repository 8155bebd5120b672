//! Deterministic simulation of two partner devices sharing one wishlist.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` for harness failures; invariant
//!   violations are data, reported through [`oracle::OracleResult`].
//! - **Logging**: `tracing` macros; the harness itself installs no
//!   subscriber.
//! - **Determinism**: every random choice comes from [`rng::SimRng`], and
//!   traces name wishes by creation order, so a seed replays exactly.

#![forbid(unsafe_code)]

pub mod campaign;
pub mod device;
pub mod lagged;
pub mod network;
pub mod oracle;
pub mod rng;
pub mod simulator;
pub mod trace;

pub use campaign::{CampaignConfig, CampaignReport, run_campaign};
pub use simulator::{SimulationConfig, SimulationResult, SimulationStats, Simulator};
