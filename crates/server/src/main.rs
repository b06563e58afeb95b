use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forumdex_core::{
    create_authenticator, load_config, validate_config, Config, ConfigError, Credentials,
    EpisodeTracker, FileSessionStore, LoginSettings, ReqwestTransport, SearchPipeline,
    SessionManager, SessionRenewer, SessionStore, SessionStoreKind, SonarrClient,
    SqliteSessionStore, spawn_initial_login,
};
use forumdex_server::{create_router, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("FORUMDEX_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    if let Err(e) = validate_config(&config) {
        if let ConfigError::MissingCredentials(_) = e {
            error!("Forum credentials are missing, set [forum] username and password");
        }
        return Err(e).context("Configuration validation failed");
    }

    info!(
        forum = %config.forum.base_url,
        user = %config.forum.username,
        auth = ?config.auth.method,
        "Configuration loaded"
    );

    let authenticator =
        create_authenticator(&config.auth).context("Failed to create authenticator")?;
    info!("Using authenticator: {}", authenticator.method_name());

    let session = Arc::new(create_session(&config)?);

    // Restore or log in off the startup path so the listener binds right away
    spawn_initial_login(Arc::clone(&session));

    let tracker: Option<Arc<dyn EpisodeTracker>> = match &config.tracker {
        Some(tracker_config) => {
            info!(url = %tracker_config.url, "Reconciling results against episode tracker");
            Some(Arc::new(
                SonarrClient::new(tracker_config).context("Failed to create tracker client")?,
            ))
        }
        None => {
            info!("No episode tracker configured, results are not reconciled");
            None
        }
    };

    let pipeline = Arc::new(SearchPipeline::from_config(
        &config,
        Arc::clone(&session),
        tracker,
    ));

    let renewer = SessionRenewer::new(Arc::clone(&session), config.renewal.clone());
    renewer.start().await;

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, authenticator, pipeline));
    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    info!("Server shutting down...");
    renewer.stop().await;
    info!("Session renewal stopped");

    served
}

fn create_session(config: &Config) -> Result<SessionManager> {
    let forum = &config.forum;

    let transport = ReqwestTransport::new(&forum.base_url, &forum.user_agent)
        .context("Failed to create forum HTTP client")?;

    let store: Arc<dyn SessionStore> = match forum.session_store {
        SessionStoreKind::File => {
            info!(path = ?forum.session_path, "Persisting forum session to file");
            Arc::new(FileSessionStore::new(forum.session_path.clone()))
        }
        SessionStoreKind::Sqlite => {
            info!(path = ?forum.session_path, "Persisting forum session to SQLite");
            Arc::new(
                SqliteSessionStore::new(&forum.session_path)
                    .context("Failed to open session database")?,
            )
        }
    };

    let credentials = Credentials::new(&forum.username, &forum.password)
        .context("Forum credentials are missing")?;

    Ok(SessionManager::new(
        Arc::new(transport),
        store,
        forum.base_url.clone(),
        credentials,
        LoginSettings::from_config(forum),
    ))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
