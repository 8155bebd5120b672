//! Client-side list reconciliation: snapshots, change events, and
//! optimistic removal.

pub mod comments;
pub mod live;
pub mod reconcile;
pub mod snapshot;

pub use comments::CommentThread;
pub use live::{LiveWishList, RemovalTicket, WishListView};
pub use reconcile::{Applied, IgnoreReason, WishList};
pub use snapshot::{Snapshot, load_snapshot, with_join_fallback};
