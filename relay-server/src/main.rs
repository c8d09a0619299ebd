//! SMS Relay web server.
//!
//! Receives SMS forwarding webhooks, stores them in SQLite and serves the
//! encrypted export to logged-in users.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use smsrelay::{web, AppState, Config, OsRandom, SqliteMessageStore, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    let verifier = web::SignatureVerifier::from_secret(config.shared_secret.as_deref());
    info!(
        port = config.port,
        database_url = %config.database_url,
        webhook_path = %config.webhook_path,
        signature_verification = verifier.is_enabled(),
        signature_max_age_ms = config.signature_max_age_ms,
        login_enabled = config.web_password.is_some(),
        session_secret_configured = config.session_secret.is_some(),
        message_template_configured = config.message_template.is_some(),
        "config_loaded"
    );

    if config.base_decryption_string.is_empty() {
        warn!("base_decryption_string_empty");
    }
    if !verifier.is_enabled() {
        warn!("webhook_signature_verification_disabled");
    }

    let store = SqliteMessageStore::connect(&config.database_url)
        .await
        .context("Failed to open message database")?;
    info!("message_store_ready");

    let port = config.port;
    let state = AppState::new(
        config,
        Arc::new(store),
        Arc::new(SystemClock),
        Arc::new(OsRandom),
    );

    let app = web::router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
