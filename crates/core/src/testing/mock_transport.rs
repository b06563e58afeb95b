//! Mock forum transport for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::forum::{ForumTransport, Page, StoredCookie, TransportError};

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct MockResponse {
    result: Result<(u16, String), TransportError>,
    set_cookies: Vec<StoredCookie>,
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            result: Ok((status, body.into())),
            set_cookies: Vec::new(),
        }
    }

    pub fn fail(error: TransportError) -> Self {
        Self {
            result: Err(error),
            set_cookies: Vec::new(),
        }
    }

    /// Cookies the "server" sets when this reply is served.
    pub fn with_cookies(mut self, cookies: Vec<StoredCookie>) -> Self {
        self.set_cookies = cookies;
        self
    }
}

/// A request seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub form: Vec<(String, String)>,
}

/// Mock implementation of [`ForumTransport`].
///
/// Replies are scripted per route. A route is either a bare path
/// (`"/viewtopic.php"`) or a path with its query (`"/viewtopic.php?t=42"`);
/// the exact form wins over the bare path. Each route replays its script in
/// order and then keeps repeating the last reply. Unscripted routes answer 404.
pub struct MockTransport {
    base_url: String,
    gets: Arc<RwLock<HashMap<String, VecDeque<MockResponse>>>>,
    posts: Arc<RwLock<HashMap<String, VecDeque<MockResponse>>>>,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
    cookies: Arc<RwLock<Vec<StoredCookie>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    route_delays: Arc<RwLock<HashMap<String, Duration>>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("base_url", &self.base_url)
            .field("routes", &"<routes>")
            .finish()
    }
}

impl MockTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            gets: Arc::new(RwLock::new(HashMap::new())),
            posts: Arc::new(RwLock::new(HashMap::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
            cookies: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(None)),
            route_delays: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn script_get(&self, route: &str, responses: Vec<MockResponse>) {
        self.gets
            .write()
            .await
            .insert(route.to_string(), responses.into());
    }

    pub async fn script_post(&self, route: &str, responses: Vec<MockResponse>) {
        self.posts
            .write()
            .await
            .insert(route.to_string(), responses.into());
    }

    /// Delay every reply, to simulate a slow forum.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Delay replies on one route only.
    pub async fn set_route_delay(&self, route: &str, delay: Duration) {
        self.route_delays
            .write()
            .await
            .insert(route.to_string(), delay);
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    /// URL and form of every POST, in order.
    pub async fn posts(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.requests
            .read()
            .await
            .iter()
            .filter(|r| r.method == "POST")
            .map(|r| (r.url.clone(), r.form.clone()))
            .collect()
    }

    pub async fn get_count(&self, route: &str) -> usize {
        self.count("GET", route).await
    }

    pub async fn post_count(&self, route: &str) -> usize {
        self.count("POST", route).await
    }

    /// URLs of every GET matching `route`, in order.
    pub async fn get_urls(&self, route: &str) -> Vec<String> {
        self.requests
            .read()
            .await
            .iter()
            .filter(|r| r.method == "GET" && self.route_matches(route, &r.url))
            .map(|r| r.url.clone())
            .collect()
    }

    async fn count(&self, method: &str, route: &str) -> usize {
        self.requests
            .read()
            .await
            .iter()
            .filter(|r| r.method == method && self.route_matches(route, &r.url))
            .count()
    }

    fn relative<'a>(&self, url: &'a str) -> &'a str {
        url.strip_prefix(self.base_url.as_str()).unwrap_or(url)
    }

    fn route_matches(&self, route: &str, url: &str) -> bool {
        let rel = self.relative(url);
        rel == route || rel.split('?').next() == Some(route)
    }

    async fn serve(
        &self,
        routes: &RwLock<HashMap<String, VecDeque<MockResponse>>>,
        url: &str,
    ) -> Result<Page, TransportError> {
        let rel = self.relative(url).to_string();
        let path = rel.split('?').next().unwrap_or_default().to_string();

        let delay = {
            let route_delays = self.route_delays.read().await;
            route_delays
                .get(&rel)
                .or_else(|| route_delays.get(&path))
                .copied()
        };
        if let Some(delay) = delay.or(*self.delay.read().await) {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut routes = routes.write().await;
            let script = if routes.contains_key(&rel) {
                routes.get_mut(&rel)
            } else {
                routes.get_mut(&path)
            };
            script.and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };

        let Some(reply) = reply else {
            return Ok(Page {
                status: 404,
                url: url.to_string(),
                body: String::new(),
            });
        };

        if !reply.set_cookies.is_empty() {
            self.restore_cookies(&reply.set_cookies).await;
        }

        reply.result.map(|(status, body)| Page {
            status,
            url: url.to_string(),
            body,
        })
    }
}

#[async_trait]
impl ForumTransport for MockTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<Page, TransportError> {
        self.requests.write().await.push(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            form: Vec::new(),
        });
        self.serve(&self.gets, url).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        _timeout: Duration,
    ) -> Result<Page, TransportError> {
        self.requests.write().await.push(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            form: form.to_vec(),
        });
        self.serve(&self.posts, url).await
    }

    async fn cookies(&self) -> Vec<StoredCookie> {
        self.cookies.read().await.clone()
    }

    async fn restore_cookies(&self, cookies: &[StoredCookie]) {
        let mut jar = self.cookies.write().await;
        for cookie in cookies {
            match jar.iter_mut().find(|c| c.name == cookie.name) {
                Some(existing) => existing.value = cookie.value.clone(),
                None => jar.push(cookie.clone()),
            }
        }
    }
}
