//! Web server module.
//!
//! - Receives SMS webhooks and runs them through the ingest pipeline
//! - Serves the encrypted message export behind a login
//! - Provides the login pages and a health check

pub mod handlers;
pub mod pages;
pub mod session;
pub mod signature;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::trace::TraceLayer;

pub use handlers::{health, index, messages, webhook, AppState, HealthResponse};
pub use session::{login, login_page, logout, require_login, SESSION_COOKIE};
pub use signature::{compute_signature, verify_signature, SignatureVerifier};

/// Build the application router.
///
/// The webhook is mounted at `config.webhook_path`; `/` and `/messages`
/// require a logged-in session.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(index))
        .route("/messages", get(messages))
        .route_layer(from_fn_with_state(state.clone(), require_login));

    let webhook_path = state.config.webhook_path.clone();

    Router::new()
        .route("/health", get(health))
        .route(
            &webhook_path,
            get(webhook).post(webhook).put(webhook).patch(webhook),
        )
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
