//! Search pipeline: discovery, expansion, reconciliation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cache::{cache_key, MemorySearchCache, SearchCache};
use crate::config::Config;
use crate::episode::{EpisodeRecord, SeasonMatcher};
use crate::forum::{
    AuthError, DiscoverySettings, ExpandError, ExpanderSettings, SessionManager, ThreadCandidate,
    ThreadDiscovery, ThreadExpander,
};
use crate::metrics::{SEARCH_DURATION, SEARCH_RESULTS};
use crate::reconcile::ReconciliationFilter;
use crate::tracker::EpisodeTracker;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Thread expansion failed: {0}")]
    Expand(#[from] ExpandError),
}

/// A series search, optionally narrowed to a season and episode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_season(mut self, season: u32) -> Self {
        self.season = Some(season);
        self
    }

    pub fn with_episode(mut self, episode: u32) -> Self {
        self.episode = Some(episode);
        self
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Threads expanded per search, in discovery order
    pub max_threads: usize,
    pub expansion_concurrency: usize,
}

/// Drop records that cannot contain `episode`; packs and ranges covering it stay.
pub fn filter_episode(records: Vec<EpisodeRecord>, episode: Option<u32>) -> Vec<EpisodeRecord> {
    match episode {
        Some(episode) => records
            .into_iter()
            .filter(|r| r.may_contain_episode(episode))
            .collect(),
        None => records,
    }
}

pub struct SearchPipeline {
    session: Arc<SessionManager>,
    discovery: ThreadDiscovery,
    expander: Arc<ThreadExpander>,
    reconciler: Option<ReconciliationFilter>,
    cache: Option<Arc<dyn SearchCache>>,
    settings: PipelineSettings,
}

impl SearchPipeline {
    pub fn new(
        session: Arc<SessionManager>,
        discovery: ThreadDiscovery,
        expander: ThreadExpander,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            session,
            discovery,
            expander: Arc::new(expander),
            reconciler: None,
            cache: None,
            settings,
        }
    }

    pub fn with_reconciler(mut self, reconciler: ReconciliationFilter) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn SearchCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Wire every stage from configuration.
    pub fn from_config(
        config: &Config,
        session: Arc<SessionManager>,
        tracker: Option<Arc<dyn EpisodeTracker>>,
    ) -> Self {
        let discovery = ThreadDiscovery::new(
            Arc::clone(&session),
            DiscoverySettings::from_config(&config.forum),
            SeasonMatcher::new(config.season_match),
        );
        let expander =
            ThreadExpander::new(Arc::clone(&session), ExpanderSettings::from_config(&config.forum));
        let settings = PipelineSettings {
            max_threads: config.forum.max_threads_per_search,
            expansion_concurrency: config.forum.expansion_concurrency,
        };

        let mut pipeline = Self::new(session, discovery, expander, settings);
        if let (Some(tracker), Some(tracker_config)) = (tracker, config.tracker.as_ref()) {
            pipeline = pipeline.with_reconciler(ReconciliationFilter::from_config(tracker, tracker_config));
        }
        if config.cache.search_ttl_secs > 0 {
            pipeline = pipeline.with_cache(Arc::new(MemorySearchCache::new(Duration::from_secs(
                config.cache.search_ttl_secs,
            ))));
        }
        pipeline
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn has_reconciler(&self) -> bool {
        self.reconciler.is_some()
    }

    /// Run a search end to end. Never fails; degraded stages yield fewer records.
    pub async fn search(&self, request: &SearchRequest) -> Vec<EpisodeRecord> {
        let started = Instant::now();
        let query = request.query.trim();
        if query.is_empty() {
            debug!("Empty query, nothing to search");
            return Vec::new();
        }

        let key = cache_key(query, request.season);
        if let Some(cache) = &self.cache {
            if let Some(records) = cache.get(&key).await {
                debug!(query, season = ?request.season, "Search served from cache");
                SEARCH_DURATION
                    .with_label_values(&["cache"])
                    .observe(started.elapsed().as_secs_f64());
                return self.finish(filter_episode(records, request.episode));
            }
        }

        let candidates: Vec<ThreadCandidate> = self
            .discovery
            .search(query, request.season)
            .await
            .into_iter()
            .take(self.settings.max_threads)
            .collect();

        let records = self.expand_all(candidates).await;

        let records = match (&self.reconciler, request.season) {
            (Some(reconciler), Some(season)) => reconciler.filter(records, query, season).await,
            _ => records,
        };

        if let Some(cache) = &self.cache {
            if !records.is_empty() {
                cache.put(&key, records.clone()).await;
            }
        }

        SEARCH_DURATION
            .with_label_values(&["forum"])
            .observe(started.elapsed().as_secs_f64());
        let records = self.finish(filter_episode(records, request.episode));
        info!(
            query,
            season = ?request.season,
            episode = ?request.episode,
            records = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search finished"
        );
        records
    }

    /// Expand a single thread, logging in first if needed.
    pub async fn expand_thread(&self, thread_id: &str) -> Result<Vec<EpisodeRecord>, PipelineError> {
        self.session.ensure_authenticated().await?;
        Ok(self.expander.try_expand(thread_id).await?)
    }

    fn finish(&self, records: Vec<EpisodeRecord>) -> Vec<EpisodeRecord> {
        SEARCH_RESULTS
            .with_label_values(&[])
            .observe(records.len() as f64);
        records
    }

    /// Expand candidates on spawned tasks, at most `expansion_concurrency` at
    /// once. Results keep discovery order.
    ///
    /// The tasks are detached: if the caller drops this future, expansions
    /// already started still run to completion.
    async fn expand_all(&self, candidates: Vec<ThreadCandidate>) -> Vec<EpisodeRecord> {
        let semaphore = Arc::new(Semaphore::new(self.settings.expansion_concurrency.max(1)));

        let handles: Vec<_> = candidates
            .into_iter()
            .map(|candidate| {
                let expander = Arc::clone(&self.expander);
                let semaphore = Arc::clone(&semaphore);
                tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return Vec::new();
                    };
                    expander.expand(&candidate.thread_id).await
                })
            })
            .collect();

        let mut records = Vec::new();
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(batch) => records.extend(batch),
                Err(e) => warn!(error = %e, "Thread expansion task failed"),
            }
        }
        records
    }
}
