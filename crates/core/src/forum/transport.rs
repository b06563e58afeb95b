//! HTTP identity used to talk to the forum.
//!
//! The [`ForumTransport`] trait is the seam between the session/discovery/expander
//! logic and the network. [`ReqwestTransport`] keeps every cookie in one shared
//! jar so that a login performed by one caller is seen by all the others.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::ConnectionFailed(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// A fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub status: u16,
    /// Final URL after redirects
    pub url: String,
    pub body: String,
}

impl Page {
    /// 2xx and 3xx both count: the forum answers a successful login with a redirect.
    pub fn is_ok_or_redirect(&self) -> bool {
        (200..400).contains(&self.status)
    }

    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.is_ok_or_redirect() {
            Ok(self)
        } else {
            Err(TransportError::Status(self.status))
        }
    }
}

/// A cookie as persisted between restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
}

#[async_trait]
pub trait ForumTransport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<Page, TransportError>;

    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        timeout: Duration,
    ) -> Result<Page, TransportError>;

    /// Cookies currently held for the forum.
    async fn cookies(&self) -> Vec<StoredCookie>;

    /// Load previously persisted cookies into the jar.
    async fn restore_cookies(&self, cookies: &[StoredCookie]);
}

/// Resolve a link found on a forum page against the forum root.
///
/// Handles absolute URLs, site-relative paths and the `./page.php` form phpBB
/// uses everywhere.
pub fn resolve_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    let path = href.trim_start_matches("./").trim_start_matches('/');
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Production transport over `reqwest` with a shared cookie jar.
pub struct ReqwestTransport {
    client: Client,
    jar: Arc<Jar>,
    base: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, TransportError> {
        let base =
            Url::parse(base_url).map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(user_agent)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self { client, jar, base })
    }
}

#[async_trait]
impl ForumTransport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<Page, TransportError> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok(Page {
            status,
            url: final_url,
            body,
        })
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        timeout: Duration,
    ) -> Result<Page, TransportError> {
        let response = self
            .client
            .post(url)
            .form(form)
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok(Page {
            status,
            url: final_url,
            body,
        })
    }

    async fn cookies(&self) -> Vec<StoredCookie> {
        let Some(header) = self.jar.cookies(&self.base) else {
            return Vec::new();
        };
        let Ok(raw) = header.to_str() else {
            return Vec::new();
        };
        parse_cookie_header(raw)
    }

    async fn restore_cookies(&self, cookies: &[StoredCookie]) {
        for cookie in cookies {
            self.jar
                .add_cookie_str(&format!("{}={}; Path=/", cookie.name, cookie.value), &self.base);
        }
    }
}

/// Split a `Cookie:` header value ("a=1; b=2") into name/value pairs.
fn parse_cookie_header(raw: &str) -> Vec<StoredCookie> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (!name.is_empty()).then(|| StoredCookie {
                name: name.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}
