//! together-core library: the shared-wishlist sync engine.
//!
//! # Conventions
//!
//! - **Errors**: [`TogetherError`] at the public surface; `anyhow::Result`
//!   for opening databases and loading config.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Concurrency**: single-threaded. Shared state is `Rc`/`RefCell` and
//!   store futures are `?Send`.

#![forbid(unsafe_code)]

pub mod actions;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod model;
pub mod priority;
pub mod session;
pub mod store;
pub mod sync;
pub mod tombstone;

pub use error::{ErrorCode, TogetherError};
pub use filter::WishScope;
pub use session::Session;
pub use sync::{LiveWishList, WishListView};
