//! Forum session lifecycle: login, login-state probing, persistence.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::config::ForumConfig;
use crate::metrics::{LOGIN_ATTEMPTS, SESSION_PROBES};

use super::login_state::{credentials_rejected, parse_login_form, LoginStateDetector};
use super::store::{PersistedSession, SessionStore};
use super::transport::{resolve_url, ForumTransport, Page, StoredCookie, TransportError};

const LOGIN_PATH: &str = "ucp.php?mode=login";
const PROBE_PATH: &str = "index.php";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Forum credentials are not configured: {0}")]
    MissingCredentials(String),

    #[error("Forum rejected the credentials: {0}")]
    InvalidCredentials(String),

    #[error("Login form not found on the login page")]
    FormNotFound,

    #[error("Unexpected HTTP status {0} during login")]
    UnexpectedStatus(u16),

    #[error("Login response did not show a logged-in page ({0})")]
    UnexpectedPage(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Login failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl AuthError {
    /// Transient failures are retried with backoff; the rest end the login.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::FormNotFound
                | AuthError::UnexpectedStatus(_)
                | AuthError::UnexpectedPage(_)
                | AuthError::Transport(_)
        )
    }
}

/// Username and password for the forum account.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, AuthError> {
        let username = username.into();
        let password = password.into();
        if username.trim().is_empty() {
            return Err(AuthError::MissingCredentials("username is empty".to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::MissingCredentials("password is empty".to_string()));
        }
        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
}

impl LoginSettings {
    pub fn from_config(config: &ForumConfig) -> Self {
        Self {
            max_attempts: config.login_max_attempts,
            initial_backoff: Duration::from_millis(config.login_initial_backoff_ms),
            max_backoff: Duration::from_millis(config.login_max_backoff_ms),
            request_timeout: config.request_timeout(),
        }
    }
}

/// Handle to an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionToken {
    /// Value of the forum's session-id cookie, when one is set
    pub session_id: Option<String>,
    pub cookie_count: usize,
}

impl SessionToken {
    fn from_cookies(cookies: &[StoredCookie]) -> Self {
        Self {
            session_id: cookies
                .iter()
                .find(|c| c.name.to_ascii_lowercase().contains("sid"))
                .map(|c| c.value.clone()),
            cookie_count: cookies.len(),
        }
    }

    /// Session id shortened for logs.
    pub fn short_id(&self) -> String {
        self.session_id
            .as_deref()
            .map(|id| id.chars().take(8).collect())
            .unwrap_or_else(|| "-".to_string())
    }
}

/// Point-in-time view of the session for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub last_probe: Option<DateTime<Utc>>,
    pub login_count: u64,
    pub consecutive_renewal_failures: u32,
}

/// Result of one renewal cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    StillValid,
    Renewed,
}

#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    last_login: Option<DateTime<Utc>>,
    last_probe: Option<DateTime<Utc>>,
    login_count: u64,
}

/// Wait before retry number `retry` (1-based): exponential in `initial`,
/// capped at `max`, scaled by `jitter` (clamped to [0.5, 1.5]).
pub fn backoff_delay(retry: u32, initial: Duration, max: Duration, jitter: f64) -> Duration {
    let factor = 2u32.saturating_pow(retry.saturating_sub(1));
    let base = initial.saturating_mul(factor).min(max);
    base.mul_f64(jitter.clamp(0.5, 1.5)).min(max)
}

/// Owns the forum HTTP identity and serializes every login through one lock.
pub struct SessionManager {
    transport: Arc<dyn ForumTransport>,
    store: Arc<dyn SessionStore>,
    base_url: String,
    credentials: Credentials,
    settings: LoginSettings,
    probe_rules: LoginStateDetector,
    login_rules: LoginStateDetector,
    login_lock: Mutex<()>,
    state: RwLock<SessionState>,
    renewal_failures: AtomicU32,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn ForumTransport>,
        store: Arc<dyn SessionStore>,
        base_url: impl Into<String>,
        credentials: Credentials,
        settings: LoginSettings,
    ) -> Self {
        Self {
            transport,
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            settings,
            probe_rules: LoginStateDetector::probe(),
            login_rules: LoginStateDetector::login_response(),
            login_lock: Mutex::new(()),
            state: RwLock::new(SessionState::default()),
            renewal_failures: AtomicU32::new(0),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn settings(&self) -> &LoginSettings {
        &self.settings
    }

    /// Absolute URL for a forum path or link.
    pub fn url(&self, path: &str) -> String {
        resolve_url(&self.base_url, path)
    }

    /// Plain GET through the session's HTTP identity.
    pub async fn get(&self, url: &str, timeout: Duration) -> Result<Page, TransportError> {
        self.transport.get(url, timeout).await
    }

    /// Load persisted cookies and keep them if they still pass the probe.
    pub async fn restore(&self) -> bool {
        let store = Arc::clone(&self.store);
        let loaded = match tokio::task::spawn_blocking(move || store.load()).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Session store task failed");
                return false;
            }
        };
        let persisted = match loaded {
            Ok(Some(persisted)) => persisted,
            Ok(None) => {
                debug!("No persisted forum session");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load persisted forum session");
                return false;
            }
        };

        if persisted.base_url.trim_end_matches('/') != self.base_url {
            warn!(
                saved_for = %persisted.base_url,
                "Persisted session belongs to another forum, ignoring it"
            );
            return false;
        }

        let _guard = self.login_lock.lock().await;
        self.transport.restore_cookies(&persisted.cookies).await;
        let valid = self.is_authenticated().await;
        if valid {
            let token = SessionToken::from_cookies(&persisted.cookies);
            info!(
                session = %token.short_id(),
                saved_at = %persisted.saved_at,
                "Restored persisted forum session"
            );
        } else {
            info!("Persisted forum session is no longer valid");
        }
        valid
    }

    /// Probe a regular page and apply the login-state rules to it.
    pub async fn is_authenticated(&self) -> bool {
        let result = self
            .transport
            .get(&self.url(PROBE_PATH), self.settings.request_timeout)
            .await
            .and_then(Page::error_for_status);

        let authenticated = match result {
            Ok(page) => {
                let detection = self
                    .probe_rules
                    .evaluate(&page.body, self.credentials.username());
                debug!(rule = ?detection.rule, state = ?detection.state, "Session probe");
                detection.is_logged_in()
            }
            Err(e) => {
                warn!(error = %e, "Session probe failed");
                SESSION_PROBES.with_label_values(&["error"]).inc();
                self.record_probe(false).await;
                return false;
            }
        };

        SESSION_PROBES
            .with_label_values(&[if authenticated {
                "authenticated"
            } else {
                "unauthenticated"
            }])
            .inc();
        self.record_probe(authenticated).await;
        authenticated
    }

    /// Return the current session if it passes the probe, logging in otherwise.
    pub async fn ensure_authenticated(&self) -> Result<SessionToken, AuthError> {
        let guard = self.login_lock.lock().await;
        if self.is_authenticated().await {
            return Ok(self.current_token().await);
        }
        info!("Forum session is not authenticated, logging in");
        self.login_with_retries(guard, self.settings.max_attempts, self.settings.initial_backoff)
            .await
    }

    /// Log in, retrying transient failures with jittered exponential backoff.
    pub async fn login(
        &self,
        max_attempts: u32,
        initial_backoff: Duration,
    ) -> Result<SessionToken, AuthError> {
        let guard = self.login_lock.lock().await;
        self.login_with_retries(guard, max_attempts, initial_backoff)
            .await
    }

    /// One renewal cycle: probe, and log in again if the session lapsed.
    pub async fn renew(&self) -> Result<RenewalOutcome, AuthError> {
        let guard = self.login_lock.lock().await;
        if self.is_authenticated().await {
            return Ok(RenewalOutcome::StillValid);
        }
        info!("Forum session expired, renewing");
        self.login_with_retries(guard, self.settings.max_attempts, self.settings.initial_backoff)
            .await
            .map(|_| RenewalOutcome::Renewed)
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.state.read().await;
        SessionStatus {
            authenticated: state.authenticated,
            last_login: state.last_login,
            last_probe: state.last_probe,
            login_count: state.login_count,
            consecutive_renewal_failures: self.renewal_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_renewal_failures(&self, failures: u32) {
        self.renewal_failures.store(failures, Ordering::Relaxed);
    }

    async fn current_token(&self) -> SessionToken {
        SessionToken::from_cookies(&self.transport.cookies().await)
    }

    async fn record_probe(&self, authenticated: bool) {
        let mut state = self.state.write().await;
        state.authenticated = authenticated;
        state.last_probe = Some(Utc::now());
    }

    /// Runs the first attempt under `guard`. The lock is released for every
    /// backoff wait and taken again per attempt; whoever logged in meanwhile
    /// is picked up by a fresh probe instead of a second login.
    async fn login_with_retries<'a>(
        &'a self,
        guard: MutexGuard<'a, ()>,
        max_attempts: u32,
        initial_backoff: Duration,
    ) -> Result<SessionToken, AuthError> {
        let max_attempts = max_attempts.max(1);
        let mut first = Some(guard);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let _held = match first.take() {
                Some(held) => held,
                None => {
                    let jitter = rand::thread_rng().gen_range(0.5..=1.5);
                    let wait = backoff_delay(
                        attempt - 1,
                        initial_backoff,
                        self.settings.max_backoff,
                        jitter,
                    );
                    debug!(attempt, wait_ms = wait.as_millis() as u64, "Waiting before next login attempt");
                    tokio::time::sleep(wait).await;

                    let held = self.login_lock.lock().await;
                    if self.is_authenticated().await {
                        debug!(attempt, "Session became valid while waiting, skipping login");
                        return Ok(self.current_token().await);
                    }
                    held
                }
            };

            match self.attempt_login().await {
                Ok(token) => {
                    LOGIN_ATTEMPTS.with_label_values(&["success"]).inc();
                    self.on_login_success(&token).await;
                    info!(attempt, session = %token.short_id(), "Logged in to forum");
                    return Ok(token);
                }
                Err(e) if e.is_transient() => {
                    LOGIN_ATTEMPTS.with_label_values(&["transient"]).inc();
                    warn!(attempt, max_attempts, error = %e, "Login attempt failed");
                    last_error = Some(e);
                }
                Err(e) => {
                    LOGIN_ATTEMPTS.with_label_values(&["rejected"]).inc();
                    warn!(attempt, error = %e, "Login rejected, not retrying");
                    self.record_probe(false).await;
                    return Err(e);
                }
            }
        }

        self.record_probe(false).await;
        Err(AuthError::Exhausted {
            attempts: max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    async fn attempt_login(&self) -> Result<SessionToken, AuthError> {
        let timeout = self.settings.request_timeout;
        let login_url = self.url(LOGIN_PATH);

        let page = self.transport.get(&login_url, timeout).await?;
        if !page.is_ok_or_redirect() {
            return Err(AuthError::UnexpectedStatus(page.status));
        }

        let form = parse_login_form(&page.body).ok_or(AuthError::FormNotFound)?;
        let action = form
            .action
            .as_deref()
            .map(|action| self.url(action))
            .unwrap_or(login_url);
        let fields = self.credential_fields(form.fields);

        let response = self.transport.post_form(&action, &fields, timeout).await?;
        if !response.is_ok_or_redirect() {
            return Err(AuthError::UnexpectedStatus(response.status));
        }

        let detection = self
            .login_rules
            .evaluate(&response.body, self.credentials.username());
        if detection.is_logged_in() {
            return Ok(self.current_token().await);
        }

        let reason = detection.rule.unwrap_or("no logged-in marker").to_string();
        if credentials_rejected(&response.body) {
            Err(AuthError::InvalidCredentials(reason))
        } else {
            Err(AuthError::UnexpectedPage(reason))
        }
    }

    /// Form fields as scraped, with credentials and submit fields injected.
    fn credential_fields(&self, mut fields: Vec<(String, String)>) -> Vec<(String, String)> {
        let injected = [
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            ("login", "Login"),
            ("redirect", "./index.php"),
        ];
        for (name, value) in injected {
            match fields.iter_mut().find(|(n, _)| n == name) {
                Some(field) => field.1 = value.to_string(),
                None => fields.push((name.to_string(), value.to_string())),
            }
        }
        fields
    }

    async fn on_login_success(&self, token: &SessionToken) {
        {
            let mut state = self.state.write().await;
            state.authenticated = true;
            state.last_login = Some(Utc::now());
            state.last_probe = state.last_login;
            state.login_count += 1;
        }

        let persisted = PersistedSession {
            base_url: self.base_url.clone(),
            cookies: self.transport.cookies().await,
            saved_at: Utc::now(),
        };
        let cookies = persisted.cookies.len();
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.save(&persisted)).await {
            Ok(Ok(())) => debug!(
                session = %token.short_id(),
                cookies,
                "Persisted forum session"
            ),
            Ok(Err(e)) => warn!(error = %e, "Failed to persist forum session"),
            Err(e) => warn!(error = %e, "Session store task failed"),
        }
    }
}
