//! HTTP endpoint handlers.
//!
//! The webhook handler only adapts the request for [`IngestPipeline`];
//! validation and storage happen there. The messages handler lists storage
//! and returns the sealed envelope.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRef, RawQuery, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::Key;
use serde::Serialize;
use tracing::{error, info};

use crate::clock::Clock;
use crate::crypto::{KeyMaterial, RandomSource};
use crate::export::Exporter;
use crate::ingest::{IngestPipeline, IngestRequest, WebhookResponse};
use crate::storage::MessageStore;
use crate::web::pages;
use crate::web::session::cookie_key;
use crate::web::signature::SignatureVerifier;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<IngestPipeline>,
    pub exporter: Arc<Exporter>,
    pub store: Arc<dyn MessageStore>,
    cookie_key: Key,
}

impl AppState {
    /// Wire every component from `config` and the injected collaborators.
    pub fn new(
        config: Config,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        let verifier = SignatureVerifier::from_secret(config.shared_secret.as_deref());
        let pipeline = IngestPipeline::new(
            verifier,
            config.signature_max_age_ms,
            clock,
            store.clone(),
        )
        .with_template(config.message_template.clone());

        let keys = KeyMaterial::derive(&config.base_decryption_string);
        let exporter = Exporter::new(&keys, rng.clone());
        let cookie_key = cookie_key(config.session_secret.as_deref(), rng.as_ref());

        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            exporter: Arc::new(exporter),
            store,
            cookie_key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// SMS Webhook
// =============================================================================

/// Webhook endpoint for GET, POST, PUT and PATCH.
pub async fn webhook(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> impl IntoResponse {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let request = IngestRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers: headers
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        raw_body: String::from_utf8_lossy(&body).into_owned(),
        content_type,
        query,
    };

    let outcome = state.pipeline.handle(request).await;
    (outcome.status, Json(outcome.body))
}

// =============================================================================
// Message Export
// =============================================================================

/// Encrypted listing of every stored message, newest first.
pub async fn messages(State(state): State<AppState>) -> Response {
    let records = match state.store.list_all().await {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "messages_list_failed");
            return internal_error("Failed to load messages");
        }
    };

    match state.exporter.seal(&records) {
        Ok(envelope) => {
            info!(records = records.len(), "messages_exported");
            Json(envelope).into_response()
        }
        Err(e) => {
            error!(error = %e, "messages_export_failed");
            internal_error("Failed to export messages")
        }
    }
}

/// Landing page for logged-in users.
pub async fn index() -> Html<&'static str> {
    Html(pages::INDEX)
}

fn internal_error(message: &'static str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(WebhookResponse {
            status: "error",
            message,
        }),
    )
        .into_response()
}
