//! Text heuristics: episode extraction, season relevance and size/category
//! estimation. Everything here is pure and synchronous.

pub mod estimate;
mod extractor;
mod season;
mod types;

pub use estimate::{categorize, categorize_episode, estimate_size, explicit_size};
pub use extractor::{extract, extract_filename};
pub use season::{explicit_seasons, SeasonMatcher, SeasonSpan};
pub use types::*;
