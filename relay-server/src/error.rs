//! Error types shared across the ingest and export paths.

use axum::http::StatusCode;
use thiserror::Error;

/// Failure of the message store collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Reasons an inbound webhook is rejected.
///
/// Validation failures map to 400, authentication failures to 401 and
/// storage failures to 500. `reason()` is the string returned to the sender.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("invalid timestamp format: {0}")]
    InvalidTimestamp(String),

    #[error("timestamp out of range: client={client} server={server}")]
    TimestampOutOfRange { client: i64, server: i64 },

    #[error("invalid json body: {0}")]
    InvalidJson(String),

    #[error("signature required")]
    MissingSignature,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("failed to store message: {0}")]
    Storage(#[from] StorageError),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::MissingTimestamp
            | IngestError::InvalidTimestamp(_)
            | IngestError::TimestampOutOfRange { .. }
            | IngestError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            IngestError::MissingSignature | IngestError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            IngestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::MissingTimestamp => "Missing timestamp",
            IngestError::InvalidTimestamp(_) => "Invalid timestamp format",
            IngestError::TimestampOutOfRange { .. } => "Timestamp out of acceptable range",
            IngestError::InvalidJson(_) => "Invalid JSON",
            IngestError::MissingSignature => "Signature required",
            IngestError::InvalidSignature => "Invalid signature",
            IngestError::Storage(_) => "Failed to store message",
        }
    }
}

/// Malformed encrypted payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("invalid base64: {0}")]
    Base64(String),

    #[error("payload of {0} bytes is shorter than one block")]
    TooShort(usize),

    #[error("payload of {0} bytes is not a multiple of the block size")]
    Misaligned(usize),

    #[error("invalid padding length {0}")]
    Padding(u8),

    #[error("plaintext is not valid utf-8")]
    Utf8,
}

/// Failure building or opening an export envelope.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("envelope signature mismatch")]
    SignatureMismatch,

    #[error(transparent)]
    Decrypt(#[from] DecryptError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(IngestError::MissingTimestamp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            IngestError::InvalidJson("eof".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(IngestError::MissingSignature.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(IngestError::InvalidSignature.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            IngestError::TimestampOutOfRange { client: 0, server: 1 }.status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(IngestError::MissingTimestamp.reason(), "Missing timestamp");
        assert_eq!(
            IngestError::InvalidTimestamp("abc".to_string()).reason(),
            "Invalid timestamp format"
        );
    }
}
