pub mod access;
pub mod cache;
pub mod config;
pub mod episode;
pub mod forum;
pub mod metrics;
pub mod pipeline;
pub mod reconcile;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tracker;

pub use access::{
    create_authenticator, AccessError, AccessRequest, ApiKeyAuthenticator, Authenticator,
    Identity, NoneAuthenticator,
};
pub use cache::{cache_key, MemorySearchCache, SearchCache};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthConfig, AuthMethod, Config,
    ConfigError, SanitizedConfig, SessionStoreKind,
};
pub use episode::{
    extract, extract_filename, EpisodeInfo, EpisodeRecord, ExtractionOutcome, ReleaseLink,
    SeasonMatcher,
};
pub use forum::{
    AuthError, Credentials, FileSessionStore, ForumTransport, LoginSettings, ReqwestTransport,
    SessionManager, SessionRenewer, SessionStatus, SessionStore, SqliteSessionStore,
    ThreadCandidate, ThreadDiscovery, ThreadExpander, spawn_initial_login,
};
pub use pipeline::{PipelineError, SearchPipeline, SearchRequest};
pub use reconcile::{MissingEpisodes, ReconciliationError, ReconciliationFilter};
pub use tracker::{EpisodeTracker, SonarrClient, TrackerError};
