//! Size estimation and feed category assignment for releases whose
//! metadata is not published in a machine-readable way.

use once_cell::sync::Lazy;
use regex_lite::Regex;

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// Newznab category ids used in the feed.
pub mod category {
    pub const MOVIES: u32 = 2000;
    pub const TV: u32 = 5000;
    pub const TV_ANIME: u32 = 5070;
    pub const OTHER: u32 = 8000;
}

static EXPLICIT_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(GB|GiB|MB|MiB)\b").unwrap());

/// A size written out in the text, e.g. "1.4 GB" or "700MB".
pub fn explicit_size(text: &str) -> Option<u64> {
    let caps = EXPLICIT_SIZE.captures(text)?;
    let value: f64 = caps.get(1)?.as_str().replace(',', ".").parse().ok()?;
    let unit = caps.get(2)?.as_str().to_ascii_lowercase();
    let multiplier = if unit.starts_with('g') { GIB } else { MIB };
    Some((value * multiplier as f64) as u64)
}

/// Best guess at a release size from its title or context text.
pub fn estimate_size(text: &str) -> u64 {
    if let Some(size) = explicit_size(text) {
        return size;
    }

    let lower = text.to_lowercase();
    if lower.contains("1080p") || lower.contains("bluray") {
        2 * GIB
    } else if lower.contains("720p") || lower.contains("hdtv") {
        GIB
    } else {
        512 * MIB
    }
}

/// Feed category for a release title.
pub fn categorize(title: &str) -> u32 {
    let lower = title.to_lowercase();
    if lower.contains("anime") {
        category::TV_ANIME
    } else if ["s0", "season", "episode", "stagione", "episodio"]
        .iter()
        .any(|token| lower.contains(token))
    {
        category::TV
    } else if lower.contains("movie") || lower.contains("film") {
        category::MOVIES
    } else {
        category::OTHER
    }
}

/// Category for a record: anything with a season is TV.
pub fn categorize_episode(title: &str, season: Option<u32>) -> u32 {
    match categorize(title) {
        category::OTHER | category::MOVIES if season.is_some() => category::TV,
        other => other,
    }
}
