//! Everything that talks to the forum: HTTP identity, session lifecycle,
//! search and thread expansion.

mod discovery;
mod expander;
pub mod login_state;
mod renewal;
mod session;
mod store;
mod transport;

pub use discovery::{
    parse_search_results, thread_id_from_href, DiscoveryError, DiscoverySettings, ThreadCandidate,
    ThreadDiscovery,
};
pub use expander::{
    parse_magnet, parse_thread_page, ExpandError, ExpanderSettings, MagnetInfo, RawRelease,
    ThreadExpander, ThreadPage,
};
pub use login_state::{Detection, LoginState, LoginStateDetector};
pub use renewal::{next_delay, spawn_initial_login, SessionRenewer};
pub use session::{
    backoff_delay, AuthError, Credentials, LoginSettings, RenewalOutcome, SessionManager,
    SessionStatus, SessionToken,
};
pub use store::{
    FileSessionStore, PersistedSession, SessionStore, SessionStoreError, SqliteSessionStore,
};
pub use transport::{resolve_url, ForumTransport, Page, ReqwestTransport, StoredCookie, TransportError};
