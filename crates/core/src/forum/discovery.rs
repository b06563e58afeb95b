//! Thread discovery through the forum's own search.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ForumConfig;
use crate::episode::SeasonMatcher;
use crate::metrics::{DISCOVERY_REQUESTS, THREADS_DISCOVERED};

use super::login_state::has_login_form;
use super::session::{AuthError, SessionManager};
use super::transport::{Page, TransportError};

/// A search hit: one forum thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCandidate {
    /// Only unique within one search; the forum may renumber threads
    pub thread_id: String,
    pub title: String,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Search request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Search page asked for a login, session was lost")]
    SessionLost,
}

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Forum sections the search is restricted to
    pub forum_ids: Vec<u32>,
    pub timeout: Duration,
}

impl DiscoverySettings {
    pub fn from_config(config: &ForumConfig) -> Self {
        Self {
            forum_ids: config.search_forum_ids.clone(),
            timeout: config.search_timeout(),
        }
    }
}

static RESULT_LIST: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.topiclist.topics").expect("valid selector"));
static TOPIC_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.topictitle").expect("valid selector"));
static THREAD_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]t=(\d+)(?:[&#]|$)").unwrap());

/// Thread id from a topic link such as `./viewtopic.php?f=51&t=123&sid=...`.
pub fn thread_id_from_href(href: &str) -> Option<String> {
    THREAD_ID
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn normalize_title(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a search results page into candidates, dropping duplicates.
///
/// A page without a result list is an empty result, unless it is a login
/// page, which means the session was lost mid-flight.
pub fn parse_search_results(html: &str) -> Result<Vec<ThreadCandidate>, DiscoveryError> {
    let document = Html::parse_document(html);
    let Some(list) = document.select(&RESULT_LIST).next() else {
        if has_login_form(html) {
            return Err(DiscoveryError::SessionLost);
        }
        return Ok(Vec::new());
    };

    let mut seen = HashSet::new();
    let candidates = list
        .select(&TOPIC_LINK)
        .filter_map(|link| {
            let thread_id = thread_id_from_href(link.value().attr("href")?)?;
            let title = normalize_title(&link.text().collect::<String>());
            if title.is_empty() || !seen.insert(thread_id.clone()) {
                return None;
            }
            Some(ThreadCandidate { thread_id, title })
        })
        .collect();

    Ok(candidates)
}

/// Finds candidate threads for a series and optional season.
pub struct ThreadDiscovery {
    session: Arc<SessionManager>,
    settings: DiscoverySettings,
    matcher: SeasonMatcher,
}

impl ThreadDiscovery {
    pub fn new(session: Arc<SessionManager>, settings: DiscoverySettings, matcher: SeasonMatcher) -> Self {
        Self {
            session,
            settings,
            matcher,
        }
    }

    /// Search the forum. Failures are logged and yield an empty list.
    pub async fn search(&self, query: &str, season: Option<u32>) -> Vec<ThreadCandidate> {
        match self.try_search(query, season).await {
            Ok(candidates) => {
                DISCOVERY_REQUESTS.with_label_values(&["ok"]).inc();
                THREADS_DISCOVERED.inc_by(candidates.len() as u64);
                candidates
            }
            Err(e) => {
                DISCOVERY_REQUESTS.with_label_values(&["error"]).inc();
                warn!(query, error = %e, "Thread discovery failed");
                Vec::new()
            }
        }
    }

    pub async fn try_search(
        &self,
        query: &str,
        season: Option<u32>,
    ) -> Result<Vec<ThreadCandidate>, DiscoveryError> {
        self.session.ensure_authenticated().await?;

        let url = self.search_url(query);
        debug!(query, "Searching forum");
        let page = self
            .session
            .get(&url, self.settings.timeout)
            .await
            .and_then(Page::error_for_status)?;

        let candidates = parse_search_results(&page.body)?;
        let total = candidates.len();
        let kept: Vec<ThreadCandidate> = match season {
            Some(season) => candidates
                .into_iter()
                .filter(|c| self.matcher.matches(&c.title, season))
                .collect(),
            None => candidates,
        };

        info!(query, ?season, total, kept = kept.len(), "Forum search finished");
        Ok(kept)
    }

    /// Search URL: title-only topic search restricted to the configured sections.
    pub fn search_url(&self, query: &str) -> String {
        let mut params = vec![
            ("keywords".to_string(), query.to_string()),
            ("terms".to_string(), "all".to_string()),
            ("author".to_string(), String::new()),
        ];
        params.extend(
            self.settings
                .forum_ids
                .iter()
                .map(|id| ("fid[]".to_string(), id.to_string())),
        );
        for (key, value) in [
            ("sc", "0"),
            ("sf", "titleonly"),
            ("sr", "topics"),
            ("sk", "t"),
            ("sd", "d"),
            ("st", "0"),
            ("ch", "300"),
            ("t", "0"),
            ("submit", "Cerca"),
        ] {
            params.push((key.to_string(), value.to_string()));
        }

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.session.url("search.php"), query_string)
    }
}
