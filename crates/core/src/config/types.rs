use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub forum: ForumConfig,
    #[serde(default)]
    pub renewal: RenewalConfig,
    #[serde(default)]
    pub season_match: SeasonMatchConfig,
    #[serde(default)]
    pub tracker: Option<TrackerConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    9898
}

/// Authentication configuration for the HTTP surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// Where the forum session cookies are persisted between restarts.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStoreKind {
    #[default]
    File,
    Sqlite,
}

/// Forum site configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForumConfig {
    /// Forum root, e.g. "https://forum.example.org"
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Timeout for thread pages and login requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
    #[serde(default = "default_login_max_attempts")]
    pub login_max_attempts: u32,
    #[serde(default = "default_login_initial_backoff")]
    pub login_initial_backoff_ms: u64,
    #[serde(default = "default_login_max_backoff")]
    pub login_max_backoff_ms: u64,
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
    #[serde(default)]
    pub session_store: SessionStoreKind,
    /// Forum sections the site search is restricted to
    #[serde(default = "default_search_forum_ids")]
    pub search_forum_ids: Vec<u32>,
    #[serde(default = "default_max_threads")]
    pub max_threads_per_search: usize,
    #[serde(default = "default_expansion_concurrency")]
    pub expansion_concurrency: usize,
    #[serde(default = "default_true")]
    pub thanks_enabled: bool,
    #[serde(default = "default_thanks_delay_min")]
    pub thanks_delay_min_ms: u64,
    #[serde(default = "default_thanks_delay_max")]
    pub thanks_delay_max_ms: u64,
}

impl ForumConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_search_timeout() -> u64 {
    20
}

fn default_login_max_attempts() -> u32 {
    15
}

fn default_login_initial_backoff() -> u64 {
    5_000
}

fn default_login_max_backoff() -> u64 {
    300_000
}

fn default_session_path() -> PathBuf {
    PathBuf::from("forum_session.json")
}

fn default_search_forum_ids() -> Vec<u32> {
    vec![26, 28, 29, 51, 52, 30, 31, 33, 35, 37]
}

fn default_max_threads() -> usize {
    5
}

fn default_expansion_concurrency() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_thanks_delay_min() -> u64 {
    5_000
}

fn default_thanks_delay_max() -> u64 {
    15_000
}

/// Background session renewal
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenewalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_renewal_min")]
    pub min_interval_ms: u64,
    #[serde(default = "default_renewal_max")]
    pub max_interval_ms: u64,
    /// Consecutive failed cycles before the cool-down kicks in
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: default_renewal_min(),
            max_interval_ms: default_renewal_max(),
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown(),
        }
    }
}

fn default_renewal_min() -> u64 {
    1_200_000
}

fn default_renewal_max() -> u64 {
    3_600_000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown() -> u64 {
    1_800_000
}

/// Knobs for the permissive season match applied to thread titles.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct SeasonMatchConfig {
    /// Accept an isolated number equal to the season ("Show 2 [720p]")
    #[serde(default = "default_true")]
    pub bare_number: bool,
    /// Accept "complete"/"completa" when the title has no explicit season token
    #[serde(default = "default_true")]
    pub completeness_markers: bool,
}

impl Default for SeasonMatchConfig {
    fn default() -> Self {
        Self {
            bare_number: true,
            completeness_markers: true,
        }
    }
}

/// Episode tracker (Sonarr v3 API)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_tracker_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_tracker_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_tracker_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_tracker_timeout() -> u64 {
    10
}

fn default_tracker_attempts() -> u32 {
    3
}

fn default_tracker_backoff() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// 0 disables the search cache
    #[serde(default = "default_search_ttl")]
    pub search_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            search_ttl_secs: default_search_ttl(),
        }
    }
}

fn default_search_ttl() -> u64 {
    300
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub forum: SanitizedForumConfig,
    pub renewal: RenewalConfig,
    pub season_match: SeasonMatchConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker: Option<SanitizedTrackerConfig>,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
}

/// Forum config with the password hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedForumConfig {
    pub base_url: String,
    pub username: String,
    pub password_configured: bool,
    pub session_store: SessionStoreKind,
    pub search_forum_ids: Vec<u32>,
    pub max_threads_per_search: usize,
    pub thanks_enabled: bool,
}

/// Tracker config with the API key hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTrackerConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
            },
            server: config.server.clone(),
            forum: SanitizedForumConfig {
                base_url: config.forum.base_url.clone(),
                username: config.forum.username.clone(),
                password_configured: !config.forum.password.is_empty(),
                session_store: config.forum.session_store,
                search_forum_ids: config.forum.search_forum_ids.clone(),
                max_threads_per_search: config.forum.max_threads_per_search,
                thanks_enabled: config.forum.thanks_enabled,
            },
            renewal: config.renewal.clone(),
            season_match: config.season_match,
            tracker: config.tracker.as_ref().map(|t| SanitizedTrackerConfig {
                url: t.url.clone(),
                api_key_configured: !t.api_key.is_empty(),
                timeout_secs: t.timeout_secs,
                max_attempts: t.max_attempts,
            }),
            cache: config.cache.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[auth]
method = "none"

[forum]
base_url = "https://forum.example.org"
username = "alice"
password = "hunter2"
"#;

    #[test]
    fn test_deserialize_minimal_config_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.auth.method, AuthMethod::None);
        assert_eq!(config.server.port, 9898);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.forum.login_max_attempts, 15);
        assert_eq!(config.forum.search_timeout_secs, 20);
        assert_eq!(config.forum.request_timeout_secs, 30);
        assert_eq!(config.forum.session_store, SessionStoreKind::File);
        assert_eq!(config.forum.search_forum_ids.len(), 10);
        assert_eq!(config.renewal.failure_threshold, 3);
        assert_eq!(config.renewal.cooldown_ms, 1_800_000);
        assert!(config.season_match.bare_number);
        assert!(config.tracker.is_none());
        assert_eq!(config.cache.search_ttl_secs, 300);
    }

    #[test]
    fn test_deserialize_missing_auth_fails() {
        let toml = r#"
[forum]
base_url = "https://forum.example.org"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_tracker_and_overrides() {
        let toml = r#"
[auth]
method = "api_key"
api_key = "torznab-key"

[forum]
base_url = "https://forum.example.org"
username = "alice"
password = "hunter2"
session_store = "sqlite"
search_forum_ids = [1, 2]

[season_match]
completeness_markers = false

[tracker]
url = "http://localhost:8989"
api_key = "sonarr-key"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::ApiKey);
        assert_eq!(config.forum.session_store, SessionStoreKind::Sqlite);
        assert_eq!(config.forum.search_forum_ids, vec![1, 2]);
        assert!(config.season_match.bare_number);
        assert!(!config.season_match.completeness_markers);

        let tracker = config.tracker.unwrap();
        assert_eq!(tracker.timeout_secs, 10);
        assert_eq!(tracker.max_attempts, 3);
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.tracker = Some(TrackerConfig {
            url: "http://localhost:8989".to_string(),
            api_key: "secret-key".to_string(),
            timeout_secs: 10,
            max_attempts: 3,
            retry_backoff_ms: 500,
        });

        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.auth.method, "none");
        assert!(sanitized.forum.password_configured);
        assert!(sanitized.tracker.as_ref().unwrap().api_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("secret-key"));
    }
}
