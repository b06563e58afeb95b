//! Background session renewal.
//!
//! A single spawned task wakes on a randomized interval, probes the session
//! and logs in again if it lapsed. After `failure_threshold` consecutive
//! failures it waits the longer cool-down before the next attempt. Login
//! failures never end the task; only [`SessionRenewer::stop`] does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RenewalConfig;
use crate::metrics::RENEWAL_CYCLES;

use super::session::{RenewalOutcome, SessionManager};

/// Delay before the next cycle, given the failures seen so far.
///
/// `roll` is a uniform sample in [0, 1) drawn by the caller.
pub fn next_delay(config: &RenewalConfig, consecutive_failures: u32, roll: f64) -> Duration {
    if consecutive_failures >= config.failure_threshold {
        return Duration::from_millis(config.cooldown_ms);
    }
    let span = config.max_interval_ms.saturating_sub(config.min_interval_ms);
    let offset = (span as f64 * roll.clamp(0.0, 1.0)) as u64;
    Duration::from_millis(config.min_interval_ms + offset.min(span))
}

/// Reuse the persisted session or log in, on a spawned task. Failures are
/// logged; request-path callers retry on demand.
pub fn spawn_initial_login(session: Arc<SessionManager>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if session.restore().await {
            info!("Reusing persisted forum session");
            return;
        }
        match session.ensure_authenticated().await {
            Ok(token) => info!(session = %token.short_id(), "Initial forum login succeeded"),
            Err(e) => warn!(
                error = %e,
                "Initial forum login failed, searches will retry on demand"
            ),
        }
    })
}

/// Owns the renewal task of one [`SessionManager`].
pub struct SessionRenewer {
    session: Arc<SessionManager>,
    config: RenewalConfig,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SessionRenewer {
    pub fn new(session: Arc<SessionManager>, config: RenewalConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            session,
            config,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn the renewal loop. A second call while running is a no-op.
    pub async fn start(&self) {
        if !self.config.enabled {
            info!("Session renewal disabled");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Session renewal already running");
            return;
        }

        let session = Arc::clone(&self.session);
        let running = Arc::clone(&self.running);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!(
                min_interval_ms = config.min_interval_ms,
                max_interval_ms = config.max_interval_ms,
                "Session renewal loop started"
            );
            let mut failures: u32 = 0;
            loop {
                let roll: f64 = rand::thread_rng().gen();
                let delay = next_delay(&config, failures, roll);
                if failures >= config.failure_threshold {
                    warn!(
                        failures,
                        cooldown_ms = config.cooldown_ms,
                        "Repeated renewal failures, cooling down"
                    );
                    failures = 0;
                } else {
                    debug!(delay_ms = delay.as_millis() as u64, "Next session renewal scheduled");
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Session renewal loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match session.renew().await {
                            Ok(RenewalOutcome::StillValid) => {
                                RENEWAL_CYCLES.with_label_values(&["still_valid"]).inc();
                                failures = 0;
                            }
                            Ok(RenewalOutcome::Renewed) => {
                                RENEWAL_CYCLES.with_label_values(&["renewed"]).inc();
                                info!("Forum session renewed");
                                failures = 0;
                            }
                            Err(e) => {
                                RENEWAL_CYCLES.with_label_values(&["failed"]).inc();
                                failures += 1;
                                warn!(failures, error = %e, "Session renewal failed");
                            }
                        }
                        session.set_renewal_failures(failures);
                    }
                }
            }
            info!("Session renewal loop stopped");
        });

        *self.handle.lock().await = Some(handle);
    }

    /// Signal the loop to stop and wait for it. Safe to call repeatedly.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Session renewal not running");
            return;
        }
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Session renewal task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forum::{Credentials, LoginSettings};
    use crate::testing::{fixtures, MemorySessionStore, MockResponse, MockTransport};

    const BASE: &str = "https://forum.example.org";

    fn config(min: u64, max: u64) -> RenewalConfig {
        RenewalConfig {
            enabled: true,
            min_interval_ms: min,
            max_interval_ms: max,
            failure_threshold: 2,
            cooldown_ms: 10_000,
        }
    }

    fn session(transport: Arc<MockTransport>) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            transport,
            Arc::new(MemorySessionStore::new()),
            BASE,
            Credentials::new("alice", "pw").unwrap(),
            LoginSettings {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
                request_timeout: Duration::from_secs(1),
            },
        ))
    }

    #[test]
    fn test_next_delay_within_range() {
        let config = config(1_000, 3_000);
        assert_eq!(next_delay(&config, 0, 0.0), Duration::from_millis(1_000));
        assert_eq!(next_delay(&config, 1, 0.5), Duration::from_millis(2_000));
        assert!(next_delay(&config, 0, 0.9999) <= Duration::from_millis(3_000));
    }

    #[test]
    fn test_next_delay_cooldown_after_threshold() {
        let config = config(1_000, 3_000);
        assert_eq!(next_delay(&config, 2, 0.3), Duration::from_millis(10_000));
        assert_eq!(next_delay(&config, 5, 0.3), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_loop_renews_expired_session() {
        let transport = Arc::new(MockTransport::new(BASE));
        transport
            .script_get(
                "/index.php",
                vec![
                    MockResponse::ok(fixtures::index_logged_out()),
                    MockResponse::ok(fixtures::index_logged_in("alice")),
                ],
            )
            .await;
        transport
            .script_get("/ucp.php", vec![MockResponse::ok(fixtures::login_page())])
            .await;
        transport
            .script_post(
                "/ucp.php",
                vec![MockResponse::ok(fixtures::index_logged_in("alice"))],
            )
            .await;

        let session = session(transport.clone());
        let renewer = SessionRenewer::new(session.clone(), config(5, 10));
        renewer.start().await;
        assert!(renewer.is_running());

        tokio::time::sleep(Duration::from_millis(200)).await;
        renewer.stop().await;
        assert!(!renewer.is_running());

        assert_eq!(transport.post_count("/ucp.php").await, 1);
        let status = session.status().await;
        assert!(status.authenticated);
        assert_eq!(status.login_count, 1);
        assert_eq!(status.consecutive_renewal_failures, 0);
    }

    #[tokio::test]
    async fn test_loop_survives_failures_and_counts_them() {
        let transport = Arc::new(MockTransport::new(BASE));
        transport
            .script_get("/index.php", vec![MockResponse::status(503, "")])
            .await;
        transport
            .script_get("/ucp.php", vec![MockResponse::status(503, "")])
            .await;

        let session = session(transport.clone());
        let renewer = SessionRenewer::new(session.clone(), config(5, 10));
        renewer.start().await;

        // one failure, then a second failure reaching the threshold
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(renewer.is_running());
        let failures = session.status().await.consecutive_renewal_failures;
        assert_eq!(failures, 2);

        // the loop is now in its 10s cool-down; stop must not wait for it
        tokio::time::timeout(Duration::from_secs(1), renewer.stop())
            .await
            .expect("stop should interrupt the cool-down");
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let transport = Arc::new(MockTransport::new(BASE));
        transport
            .script_get("/index.php", vec![MockResponse::ok(fixtures::index_logged_in("alice"))])
            .await;
        let renewer = SessionRenewer::new(session(transport), config(1_000, 2_000));

        renewer.stop().await;
        renewer.start().await;
        renewer.start().await;
        assert!(renewer.is_running());
        renewer.stop().await;
        renewer.stop().await;
        assert!(!renewer.is_running());
    }

    #[tokio::test]
    async fn test_initial_login_runs_in_background() {
        let transport = Arc::new(MockTransport::new(BASE));
        transport
            .script_get("/index.php", vec![MockResponse::ok(fixtures::index_logged_out())])
            .await;
        transport
            .script_get("/ucp.php", vec![MockResponse::status(503, "")])
            .await;
        let session = Arc::new(SessionManager::new(
            transport.clone(),
            Arc::new(MemorySessionStore::new()),
            BASE,
            Credentials::new("alice", "pw").unwrap(),
            LoginSettings {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(200),
                max_backoff: Duration::from_secs(1),
                request_timeout: Duration::from_secs(1),
            },
        ));

        let handle = spawn_initial_login(session.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        // still backing off, while the caller is free to go on serving
        assert!(!handle.is_finished());
        assert_eq!(transport.get_count("/ucp.php").await, 1);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("initial login finishes")
            .unwrap();
        assert_eq!(transport.get_count("/ucp.php").await, 3);
        assert!(!session.status().await.authenticated);
    }

    #[tokio::test]
    async fn test_disabled_renewal_never_starts() {
        let transport = Arc::new(MockTransport::new(BASE));
        let mut config = config(1, 2);
        config.enabled = false;
        let renewer = SessionRenewer::new(session(transport.clone()), config);
        renewer.start().await;
        assert!(!renewer.is_running());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(transport.requests().await.is_empty());
    }
}
