//! Torznab-compatible HTTP surface for the forum indexer.

pub mod api;
pub mod feed;
pub mod metrics;
pub mod state;

pub use api::create_router;
pub use feed::{FeedEncoder, FeedError, TorznabEncoder};
pub use state::AppState;
