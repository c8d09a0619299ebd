//! Inbound webhook pipeline.
//!
//! ```text
//! Received → Parsed → Validated → Stored
//!               └──────────┴──→ Rejected
//! ```
//!
//! The pipeline is stateless apart from its injected collaborators, so one
//! instance serves every request concurrently.

use std::collections::HashMap;
use std::num::IntErrorKind;
use std::sync::Arc;

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use url::form_urlencoded;

use crate::clock::Clock;
use crate::error::IngestError;
use crate::storage::{MessageStore, NewMessage, RECEIVED_AT_FORMAT};
use crate::template::substitute;
use crate::web::signature::{is_fresh, SignatureVerifier};

/// One inbound webhook call, as seen by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub raw_body: String,
    pub content_type: Option<String>,
    pub query: Option<String>,
}

/// JSON body returned to the webhook sender.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// HTTP status plus response body for one call.
#[derive(Debug)]
pub struct IngestOutcome {
    pub status: StatusCode,
    pub body: WebhookResponse,
}

/// Validates inbound webhooks and hands accepted ones to storage.
pub struct IngestPipeline {
    verifier: SignatureVerifier,
    max_age_ms: u64,
    clock: Arc<dyn Clock>,
    store: Arc<dyn MessageStore>,
    template: Option<String>,
}

impl IngestPipeline {
    pub fn new(
        verifier: SignatureVerifier,
        max_age_ms: u64,
        clock: Arc<dyn Clock>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            verifier,
            max_age_ms,
            clock,
            store,
            template: None,
        }
    }

    /// Render each stored message with `template` and log the result.
    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    /// Run the pipeline and map the result to a response.
    pub async fn handle(&self, request: IngestRequest) -> IngestOutcome {
        match self.ingest(&request).await {
            Ok(()) => IngestOutcome {
                status: StatusCode::OK,
                body: WebhookResponse {
                    status: "success",
                    message: "Message received",
                },
            },
            Err(e) => {
                match &e {
                    IngestError::Storage(_) => error!(error = %e, "webhook_store_failed"),
                    _ => warn!(
                        error = %e,
                        status = e.status().as_u16(),
                        "webhook_rejected"
                    ),
                }
                IngestOutcome {
                    status: e.status(),
                    body: WebhookResponse {
                        status: "error",
                        message: e.reason(),
                    },
                }
            }
        }
    }

    /// Validate and store one request.
    pub async fn ingest(&self, request: &IngestRequest) -> Result<(), IngestError> {
        let headers = headers_json(&request.headers);

        info!(
            method = %request.method,
            path = %request.path,
            headers = %headers,
            body = %request.raw_body,
            "webhook_received"
        );

        let fields = parse_fields(
            &request.method,
            request.content_type.as_deref(),
            &request.raw_body,
            request.query.as_deref(),
        )?;

        let timestamp = non_empty(&fields, "timestamp").ok_or(IngestError::MissingTimestamp)?;

        let server_ms = self.clock.now_millis();
        let client_ms: i64 = match timestamp.trim().parse::<i64>() {
            Ok(ms) => ms,
            // Integers beyond i64 are out of range, not malformed.
            Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow) => {
                return Err(IngestError::TimestampOutOfRange {
                    client: i64::MAX,
                    server: server_ms,
                })
            }
            Err(e) if matches!(e.kind(), IntErrorKind::NegOverflow) => {
                return Err(IngestError::TimestampOutOfRange {
                    client: i64::MIN,
                    server: server_ms,
                })
            }
            Err(_) => return Err(IngestError::InvalidTimestamp(timestamp.to_string())),
        };

        if !is_fresh(client_ms, server_ms, self.max_age_ms) {
            return Err(IngestError::TimestampOutOfRange {
                client: client_ms,
                server: server_ms,
            });
        }

        if self.verifier.is_enabled() {
            let sign = non_empty(&fields, "sign").ok_or(IngestError::MissingSignature)?;
            if !self.verifier.verify(timestamp, sign) {
                return Err(IngestError::InvalidSignature);
            }
        }

        let message = NewMessage {
            from_number: fields.get("from").cloned(),
            content: fields.get("content").cloned(),
            timestamp: timestamp.to_string(),
            method: request.method.clone(),
            path: request.path.clone(),
            headers,
            body: request.raw_body.clone(),
        };

        self.store.append(message).await?;

        info!(
            from = fields.get("from").map(String::as_str).unwrap_or(""),
            timestamp = %timestamp,
            "webhook_stored"
        );

        if let Some(template) = &self.template {
            let mut fields = fields;
            fields.insert("receive_time".to_string(), format_millis(server_ms));
            info!(rendered = %substitute(template, &fields), "message_rendered");
        }

        Ok(())
    }
}

/// Build the field map for a request.
///
/// `GET` reads the query string. Bodies are parsed by media type: JSON must
/// be an object, form bodies are decoded, and anything else is decoded as a
/// form on a best-effort basis.
pub fn parse_fields(
    method: &str,
    content_type: Option<&str>,
    raw_body: &str,
    query: Option<&str>,
) -> Result<HashMap<String, String>, IngestError> {
    if method.eq_ignore_ascii_case("GET") {
        return Ok(parse_form(query.unwrap_or("")));
    }

    match media_type(content_type).as_deref() {
        Some("application/json") => parse_json(raw_body),
        Some("application/x-www-form-urlencoded") => Ok(parse_form(raw_body)),
        // Unknown or missing content type: try form decoding and carry on
        // with whatever comes out, possibly nothing.
        _ => Ok(parse_form(raw_body)),
    }
}

fn media_type(content_type: Option<&str>) -> Option<String> {
    content_type.map(|ct| {
        ct.split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    })
}

fn parse_form(raw: &str) -> HashMap<String, String> {
    form_urlencoded::parse(raw.as_bytes())
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn parse_json(raw: &str) -> Result<HashMap<String, String>, IngestError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| IngestError::InvalidJson(e.to_string()))?;

    let Value::Object(map) = value else {
        return Err(IngestError::InvalidJson("body is not a JSON object".to_string()));
    };

    Ok(map
        .into_iter()
        .filter_map(|(k, v)| {
            let v = match v {
                Value::Null => return None,
                Value::String(s) => s,
                other => other.to_string(),
            };
            Some((k, v))
        })
        .collect())
}

fn non_empty<'a>(fields: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    fields.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

/// Serialize headers as a JSON object. Repeated names are joined with ", ".
fn headers_json(headers: &[(String, String)]) -> String {
    let mut map = serde_json::Map::new();
    for (name, value) in headers {
        match map.get_mut(name) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            _ => {
                map.insert(name.clone(), Value::String(value.clone()));
            }
        }
    }
    Value::Object(map).to_string()
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format(RECEIVED_AT_FORMAT).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::StorageError;
    use crate::storage::{MemoryMessageStore, StoredMessage};
    use crate::web::signature::compute_signature;
    use async_trait::async_trait;

    const NOW: i64 = 1_700_000_000_000;

    fn pipeline(secret: Option<&str>, store: Arc<dyn MessageStore>) -> IngestPipeline {
        IngestPipeline::new(
            SignatureVerifier::from_secret(secret),
            3_600_000,
            Arc::new(FixedClock(NOW)),
            store,
        )
    }

    fn json_request(body: &str) -> IngestRequest {
        IngestRequest {
            method: "POST".to_string(),
            path: "/webhook".to_string(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            raw_body: body.to_string(),
            content_type: Some("application/json".to_string()),
            query: None,
        }
    }

    struct FailingStore;

    #[async_trait]
    impl MessageStore for FailingStore {
        async fn append(&self, _message: NewMessage) -> Result<(), StorageError> {
            Err(StorageError::Database(sqlx::Error::PoolClosed))
        }

        async fn list_all(&self) -> Result<Vec<StoredMessage>, StorageError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_json_without_secret_is_stored() {
        let store = Arc::new(MemoryMessageStore::new());
        let p = pipeline(None, store.clone());

        let outcome = p
            .handle(json_request(&format!(r#"{{"timestamp": "{}"}}"#, NOW)))
            .await;

        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(outcome.body.status, "success");

        let rows = store.list_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].from_number, None);
        assert_eq!(rows[0].content, None);
        assert_eq!(rows[0].timestamp.as_deref(), Some("1700000000000"));
    }

    #[tokio::test]
    async fn test_numeric_json_timestamp() {
        let store = Arc::new(MemoryMessageStore::new());
        let p = pipeline(None, store.clone());

        let body = format!(r#"{{"from": "+15550100", "content": "hi", "timestamp": {}}}"#, NOW);
        let outcome = p.handle(json_request(&body)).await;

        assert_eq!(outcome.status, StatusCode::OK);
        let rows = store.list_all().await.unwrap();
        assert_eq!(rows[0].from_number.as_deref(), Some("+15550100"));
        assert_eq!(rows[0].body.as_deref(), Some(body.as_str()));
    }

    #[tokio::test]
    async fn test_missing_timestamp() {
        let store = Arc::new(MemoryMessageStore::new());
        let outcome = pipeline(None, store.clone())
            .handle(json_request(r#"{"from": "x"}"#))
            .await;

        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome.body.message, "Missing timestamp");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_timestamp_is_missing() {
        let store = Arc::new(MemoryMessageStore::new());
        let outcome = pipeline(None, store)
            .handle(json_request(r#"{"timestamp": ""}"#))
            .await;

        assert_eq!(outcome.body.message, "Missing timestamp");
    }

    #[tokio::test]
    async fn test_non_integer_timestamp() {
        let store = Arc::new(MemoryMessageStore::new());
        let outcome = pipeline(None, store)
            .handle(json_request(r#"{"timestamp": "12.5"}"#))
            .await;

        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome.body.message, "Invalid timestamp format");
    }

    #[tokio::test]
    async fn test_freshness_window_boundary() {
        let store = Arc::new(MemoryMessageStore::new());
        let p = pipeline(None, store.clone());

        let edge = format!(r#"{{"timestamp": "{}"}}"#, NOW - 3_600_000);
        assert_eq!(p.handle(json_request(&edge)).await.status, StatusCode::OK);

        let past = format!(r#"{{"timestamp": "{}"}}"#, NOW - 3_600_001);
        let outcome = p.handle(json_request(&past)).await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome.body.message, "Timestamp out of acceptable range");

        let future = format!(r#"{{"timestamp": "{}"}}"#, NOW + 3_600_001);
        assert_eq!(p.handle(json_request(&future)).await.status, StatusCode::BAD_REQUEST);

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let store = Arc::new(MemoryMessageStore::new());
        let p = pipeline(None, store);

        let outcome = p.handle(json_request("{not json")).await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome.body.message, "Invalid JSON");

        let outcome = p.handle(json_request("")).await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);

        let outcome = p.handle(json_request("[1, 2]")).await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_sign_with_secret_does_not_store() {
        let store = Arc::new(MemoryMessageStore::new());
        let outcome = pipeline(Some("secret"), store.clone())
            .handle(json_request(&format!(r#"{{"timestamp": "{}"}}"#, NOW)))
            .await;

        assert_eq!(outcome.status, StatusCode::UNAUTHORIZED);
        assert_eq!(outcome.body.message, "Signature required");
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_whitespace_secret_still_requires_sign() {
        let store = Arc::new(MemoryMessageStore::new());
        let outcome = pipeline(Some("   "), store.clone())
            .handle(json_request(&format!(r#"{{"timestamp": "{}"}}"#, NOW)))
            .await;

        assert_eq!(outcome.status, StatusCode::UNAUTHORIZED);
        assert_eq!(outcome.body.message, "Signature required");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_oversized_timestamp_is_out_of_range() {
        let store = Arc::new(MemoryMessageStore::new());
        let p = pipeline(None, store.clone());

        for ts in ["99999999999999999999", "-99999999999999999999"] {
            let outcome = p
                .handle(json_request(&format!(r#"{{"timestamp": "{}"}}"#, ts)))
                .await;
            assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
            assert_eq!(outcome.body.message, "Timestamp out of acceptable range");
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_sign_with_secret() {
        let store = Arc::new(MemoryMessageStore::new());
        let body = format!(r#"{{"timestamp": "{}", "sign": "bogus"}}"#, NOW);
        let outcome = pipeline(Some("secret"), store.clone())
            .handle(json_request(&body))
            .await;

        assert_eq!(outcome.status, StatusCode::UNAUTHORIZED);
        assert_eq!(outcome.body.message, "Invalid signature");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_valid_sign_form_body() {
        let store = Arc::new(MemoryMessageStore::new());
        let ts = NOW.to_string();
        let sign = compute_signature(&ts, "secret").unwrap();
        // The signature is already url-encoded; as a form value it must be
        // encoded once more so that decoding yields the encoded form.
        let sign_field: String = form_urlencoded::byte_serialize(sign.as_bytes()).collect();

        let request = IngestRequest {
            method: "POST".to_string(),
            path: "/webhook".to_string(),
            headers: Vec::new(),
            raw_body: format!("from=10086&content=hello+there&timestamp={}&sign={}", ts, sign_field),
            content_type: Some("application/x-www-form-urlencoded".to_string()),
            query: None,
        };

        let outcome = pipeline(Some("secret"), store.clone()).handle(request).await;
        assert_eq!(outcome.status, StatusCode::OK);

        let rows = store.list_all().await.unwrap();
        assert_eq!(rows[0].from_number.as_deref(), Some("10086"));
        assert_eq!(rows[0].content.as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn test_get_reads_query() {
        let store = Arc::new(MemoryMessageStore::new());
        let request = IngestRequest {
            method: "GET".to_string(),
            path: "/webhook".to_string(),
            query: Some(format!("from=abc&timestamp={}", NOW)),
            ..Default::default()
        };

        let outcome = pipeline(None, store.clone()).handle(request).await;
        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(
            store.list_all().await.unwrap()[0].from_number.as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn test_unknown_content_type_falls_back_to_form() {
        let store = Arc::new(MemoryMessageStore::new());
        let request = IngestRequest {
            method: "PUT".to_string(),
            path: "/webhook".to_string(),
            raw_body: format!("timestamp={}&content=x", NOW),
            content_type: Some("text/plain".to_string()),
            ..Default::default()
        };

        let outcome = pipeline(None, store.clone()).handle(request).await;
        assert_eq!(outcome.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unparseable_body_yields_missing_timestamp() {
        let store = Arc::new(MemoryMessageStore::new());
        let request = IngestRequest {
            method: "POST".to_string(),
            path: "/webhook".to_string(),
            raw_body: "\u{1}\u{2} garbage".to_string(),
            content_type: None,
            ..Default::default()
        };

        let outcome = pipeline(None, store).handle(request).await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome.body.message, "Missing timestamp");
    }

    #[tokio::test]
    async fn test_storage_failure_is_500() {
        let outcome = pipeline(None, Arc::new(FailingStore))
            .handle(json_request(&format!(r#"{{"timestamp": "{}"}}"#, NOW)))
            .await;

        assert_eq!(outcome.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(outcome.body.message, "Failed to store message");
    }

    #[tokio::test]
    async fn test_template_rendering_does_not_affect_outcome() {
        let store = Arc::new(MemoryMessageStore::new());
        let p = pipeline(None, store.clone())
            .with_template(Some("[from]: [msg] @ [receive_time]".to_string()));

        let outcome = p
            .handle(json_request(&format!(r#"{{"timestamp": "{}", "from": "a"}}"#, NOW)))
            .await;
        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn test_media_type_ignores_parameters() {
        let fields = parse_fields(
            "POST",
            Some("Application/JSON; charset=utf-8"),
            r#"{"timestamp": "1"}"#,
            None,
        )
        .unwrap();
        assert_eq!(fields.get("timestamp").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_json_values_are_stringified() {
        let fields = parse_json(r#"{"a": 1, "b": true, "c": null, "d": [1], "e": "s"}"#).unwrap();
        assert_eq!(fields["a"], "1");
        assert_eq!(fields["b"], "true");
        assert!(!fields.contains_key("c"));
        assert_eq!(fields["d"], "[1]");
        assert_eq!(fields["e"], "s");
    }

    #[test]
    fn test_headers_json_joins_duplicates() {
        let json = headers_json(&[
            ("accept".to_string(), "a".to_string()),
            ("accept".to_string(), "b".to_string()),
            ("host".to_string(), "h".to_string()),
        ]);
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["accept"], "a, b");
        assert_eq!(value["host"], "h");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01 00:00:00.000");
        assert_eq!(format_millis(1_700_000_000_123), "2023-11-14 22:13:20.123");
    }
}
