//! Episode-tracking service (Sonarr v3 API).
//!
//! The [`EpisodeTracker`] trait is the seam used by reconciliation; the
//! production implementation is [`SonarrClient`].

mod sonarr;
mod title;

pub use sonarr::SonarrClient;
pub use title::titles_match;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Tracker request timed out")]
    Timeout,

    #[error("Connection to tracker failed: {0}")]
    ConnectionFailed(String),

    #[error("Tracker rejected the API key")]
    Unauthorized,

    #[error("Tracker API error: {0}")]
    ApiError(String),

    #[error("Failed to parse tracker response: {0}")]
    ParseError(String),
}

impl TrackerError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TrackerError::Timeout | TrackerError::ConnectionFailed(_) | TrackerError::ApiError(_)
        )
    }
}

/// A series known to the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSeries {
    pub id: i64,
    pub title: String,
    pub monitored: bool,
}

/// One episode as reported by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEpisode {
    pub season_number: u32,
    pub episode_number: u32,
    pub monitored: bool,
    pub has_file: bool,
}

impl TrackedEpisode {
    /// Monitored but not downloaded yet.
    pub fn is_missing(&self) -> bool {
        self.monitored && !self.has_file
    }
}

#[async_trait]
pub trait EpisodeTracker: Send + Sync {
    /// Name of this tracker (for logging)
    fn name(&self) -> &str;

    async fn list_series(&self) -> Result<Vec<TrackedSeries>, TrackerError>;

    async fn list_episodes(&self, series_id: i64) -> Result<Vec<TrackedEpisode>, TrackerError>;
}
