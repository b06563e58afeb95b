//! Season/episode extraction from free text.
//!
//! Three ordered tiers are tried in turn (season packs, episode ranges, single
//! episodes); within a tier the first pattern yielding a valid result wins.
//! A match that produces an invalid shape (e.g. a reversed range) is skipped
//! and the search continues with the next pattern.

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};

use super::types::{EpisodeInfo, ExtractionOutcome};

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid episode pattern"))
        .collect()
}

static SEASON_PACK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\bcomplete[\s._-]*season[\s._-]*(\d{1,2})\b",
        r"(?i)\bfull[\s._-]*season[\s._-]*(\d{1,2})\b",
        r"(?i)\bseason[\s._-]*(\d{1,2})[\s._-]*(?:complete|full|pack)\b",
        r"(?i)\bstagione[\s._-]*(\d{1,2})[\s._-]*complet[ao]\b",
        r"(?i)\bs(\d{1,2})[\s._-]*(?:complete|completa|full)\b",
    ])
});

// S01E02-E05
static RANGE_SHORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bs(\d{1,2})[\s._-]*e(\d{1,3})[\s._]*-?[\s._]*e(\d{1,3})\b").unwrap()
});

// S01E02-S01E05
static RANGE_FULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bs(\d{1,2})[\s._-]*e(\d{1,3})[\s._]*-[\s._]*s(\d{1,2})[\s._-]*e(\d{1,3})\b")
        .unwrap()
});

// S01E02-05
static RANGE_BARE_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bs(\d{1,2})[\s._-]*e(\d{1,3})[\s._]*-[\s._]*(\d{1,3})\b").unwrap()
});

// Episodes 1-10, Episodi 1 al 10
static RANGE_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bepisod(?:es?|io|i)[\s._]*(\d{1,3})[\s._]*(?:-|to|al|a)[\s._]*(\d{1,3})\b")
        .unwrap()
});

static SEASON_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:season|stagione)[\s._]*(\d{1,2})\b|\bs(\d{1,2})\b").unwrap()
});

static SINGLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\bs(\d{1,2})[\s._-]*e(\d{1,3})\b",
        r"(?i)\b(\d{1,2})x(\d{1,3})\b",
        r"(?i)\bstagion[ei][\s._]*(\d{1,2}).*?\bepisodio[\s._]*(\d{1,3})\b",
        r"(?i)\bseason[\s._]*(\d{1,2}).*?\bepisode[\s._]*(\d{1,3})\b",
    ])
});

static BARE_DIGITS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s._\-\[(])(\d{3,4})(?:[\s._\-\])]|$)").unwrap()
});

static LONE_SEASON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\b(?:season|stagione)[\s._]*|\bs)(\d{1,2})\b").unwrap()
});

const RESOLUTIONS: [u32; 5] = [480, 576, 720, 1080, 2160];

fn num(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}

/// Extract episode information from a thread title or release context text.
pub fn extract(text: &str) -> ExtractionOutcome {
    let text = text.trim();
    if text.is_empty() {
        return ExtractionOutcome::Unparsable;
    }

    season_pack(text)
        .or_else(|| episode_range(text))
        .or_else(|| single_episode(text))
        .map(ExtractionOutcome::Parsed)
        .unwrap_or(ExtractionOutcome::Unparsable)
}

/// Extract episode information from a release filename.
///
/// Runs [`extract`] first; only when it finds nothing are the looser filename
/// conventions tried: a bare 3-4 digit run read as `season * 100 + episode`
/// ("Show.0102.mkv" is S01E02), then a lone season marker read as a pack.
pub fn extract_filename(name: &str) -> ExtractionOutcome {
    let primary = extract(name);
    if primary.is_parsed() {
        return primary;
    }

    bare_digit_run(name)
        .or_else(|| lone_season(name))
        .map(ExtractionOutcome::Parsed)
        .unwrap_or(ExtractionOutcome::Unparsable)
}

fn season_pack(text: &str) -> Option<EpisodeInfo> {
    SEASON_PACK_PATTERNS.iter().find_map(|re| {
        let caps = re.captures(text)?;
        num(&caps, 1).map(EpisodeInfo::season_pack)
    })
}

fn episode_range(text: &str) -> Option<EpisodeInfo> {
    if let Some(info) = RANGE_SHORT.captures(text).and_then(|caps| {
        EpisodeInfo::range(num(&caps, 1), num(&caps, 2)?, num(&caps, 3)?)
    }) {
        return Some(info);
    }

    if let Some(info) = RANGE_FULL.captures(text).and_then(|caps| {
        let (from, to) = (num(&caps, 1)?, num(&caps, 3)?);
        // A span crossing seasons is not a range of one season
        if from != to {
            return None;
        }
        EpisodeInfo::range(Some(from), num(&caps, 2)?, num(&caps, 4)?)
    }) {
        return Some(info);
    }

    if let Some(info) = RANGE_BARE_END.captures(text).and_then(|caps| {
        EpisodeInfo::range(num(&caps, 1), num(&caps, 2)?, num(&caps, 3)?)
    }) {
        return Some(info);
    }

    RANGE_WORDS.captures(text).and_then(|caps| {
        let season = SEASON_HINT
            .captures(text)
            .and_then(|hint| num(&hint, 1).or_else(|| num(&hint, 2)));
        EpisodeInfo::range(season, num(&caps, 1)?, num(&caps, 2)?)
    })
}

fn single_episode(text: &str) -> Option<EpisodeInfo> {
    SINGLE_PATTERNS.iter().find_map(|re| {
        let caps = re.captures(text)?;
        Some(EpisodeInfo::single(num(&caps, 1)?, num(&caps, 2)?))
    })
}

fn bare_digit_run(name: &str) -> Option<EpisodeInfo> {
    BARE_DIGITS.captures_iter(name).find_map(|caps| {
        let raw = caps.get(1)?.as_str();
        let value: u32 = raw.parse().ok()?;
        if raw.len() == 4 && (1900..=2099).contains(&value) {
            return None;
        }
        if RESOLUTIONS.contains(&value) {
            return None;
        }
        let (season, episode) = (value / 100, value % 100);
        (season > 0 && episode > 0).then(|| EpisodeInfo::single(season, episode))
    })
}

fn lone_season(name: &str) -> Option<EpisodeInfo> {
    let caps = LONE_SEASON.captures(name)?;
    num(&caps, 1).map(EpisodeInfo::season_pack)
}
