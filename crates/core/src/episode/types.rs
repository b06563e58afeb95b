use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Season/episode information recovered from a title or filename.
///
/// Constructed only through [`EpisodeInfo::single`], [`EpisodeInfo::season_pack`]
/// and [`EpisodeInfo::range`], which keep the shape consistent: a season pack or
/// a range never carries a single `episode`, and a range is non-empty and
/// strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    season: Option<u32>,
    episode: Option<u32>,
    is_season_pack: bool,
    episode_range: Option<Vec<u32>>,
}

/// Largest span accepted as an episode range; anything wider is noise.
pub const MAX_RANGE_LEN: u32 = 200;

impl EpisodeInfo {
    pub fn single(season: u32, episode: u32) -> Self {
        Self {
            season: Some(season),
            episode: Some(episode),
            is_season_pack: false,
            episode_range: None,
        }
    }

    pub fn season_pack(season: u32) -> Self {
        Self {
            season: Some(season),
            episode: None,
            is_season_pack: true,
            episode_range: None,
        }
    }

    /// Inclusive range `start..=end`. A degenerate range (`start == end`) collapses
    /// to a single episode when the season is known; reversed or oversized spans
    /// yield `None`.
    pub fn range(season: Option<u32>, start: u32, end: u32) -> Option<Self> {
        if end < start || end - start > MAX_RANGE_LEN {
            return None;
        }
        if start == end {
            return season.map(|s| Self::single(s, start));
        }
        Some(Self {
            season,
            episode: None,
            is_season_pack: false,
            episode_range: Some((start..=end).collect()),
        })
    }

    pub fn season(&self) -> Option<u32> {
        self.season
    }

    pub fn episode(&self) -> Option<u32> {
        self.episode
    }

    pub fn is_season_pack(&self) -> bool {
        self.is_season_pack
    }

    pub fn episode_range(&self) -> Option<&[u32]> {
        self.episode_range.as_deref()
    }
}

/// Result of running the extractor. `Unparsable` is an expected value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Parsed(EpisodeInfo),
    Unparsable,
}

impl ExtractionOutcome {
    pub fn into_info(self) -> Option<EpisodeInfo> {
        match self {
            ExtractionOutcome::Parsed(info) => Some(info),
            ExtractionOutcome::Unparsable => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, ExtractionOutcome::Parsed(_))
    }
}

/// A release link found in a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseLink {
    pub uri: String,
    /// Exact length advertised by the link itself (magnet `xl=`)
    pub raw_size: Option<u64>,
    pub seeders: u32,
    pub peers: u32,
}

/// One release of one thread, with whatever episode info could be recovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub title: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub is_season_pack: bool,
    pub episode_range: Option<Vec<u32>>,
    pub thread_id: String,
    pub thread_url: String,
    pub release_link: ReleaseLink,
    pub size_bytes: u64,
    pub category: u32,
    pub publish_time: DateTime<Utc>,
}

impl EpisodeRecord {
    /// True when the record stands for more than one episode of its season
    /// (a pack, a range, or a release whose episode could not be read).
    pub fn covers_whole_season(&self) -> bool {
        self.is_season_pack || self.episode_range.is_some() || self.episode.is_none()
    }

    /// Whether this record can satisfy a request for `episode`.
    pub fn may_contain_episode(&self, episode: u32) -> bool {
        match (self.episode, &self.episode_range) {
            (Some(e), _) => e == episode,
            (None, Some(range)) => range.contains(&episode),
            (None, None) => true,
        }
    }
}
