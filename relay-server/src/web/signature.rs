//! Inbound webhook signature verification.
//!
//! The forwarding app signs each callback with HMAC-SHA256:
//! - key: the shared secret
//! - message: `"{timestamp}\n{secret}"`
//! - encoding: standard base64, then form-url-encoded (`+` → `%2B`, `/` → `%2F`, `=` → `%3D`)
//!
//! Freshness is checked separately against a millisecond replay window.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Default replay window: one hour in milliseconds.
pub const DEFAULT_MAX_AGE_MS: u64 = 3_600_000;

/// Signature policy selected once at startup.
#[derive(Clone)]
pub enum SignatureVerifier {
    /// No secret configured. Every request passes.
    AlwaysAccept,
    /// Recompute and compare the HMAC with the shared secret.
    HmacCheck { secret: String },
}

impl SignatureVerifier {
    /// Pick the policy for an optional secret. Only an empty secret means none.
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(s) if is_signature_verification_enabled(s) => SignatureVerifier::HmacCheck {
                secret: s.to_string(),
            },
            _ => SignatureVerifier::AlwaysAccept,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, SignatureVerifier::HmacCheck { .. })
    }

    pub fn verify(&self, timestamp: &str, signature: &str) -> bool {
        match self {
            SignatureVerifier::AlwaysAccept => true,
            SignatureVerifier::HmacCheck { secret } => {
                verify_signature(timestamp, signature, secret)
            }
        }
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureVerifier::AlwaysAccept => f.write_str("AlwaysAccept"),
            SignatureVerifier::HmacCheck { .. } => f.write_str("HmacCheck"),
        }
    }
}

/// Compute the url-encoded signature the sender should have attached.
///
/// Returns `None` only if the MAC cannot be keyed.
pub fn compute_signature(timestamp: &str, secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(format!("{}\n{}", timestamp, secret).as_bytes());

    let encoded = BASE64.encode(mac.finalize().into_bytes());
    Some(form_urlencoded::byte_serialize(encoded.as_bytes()).collect())
}

/// Verify a webhook signature.
///
/// An empty `secret` disables verification and returns `true`.
/// Any failure computing the MAC is reported as a mismatch.
pub fn verify_signature(timestamp: &str, signature: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return true;
    }

    let expected = match compute_signature(timestamp, secret) {
        Some(s) => s,
        None => {
            warn!("webhook_signature_invalid_key");
            return false;
        }
    };

    let valid = constant_time_compare(&expected, signature);

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = signature.len(),
            "webhook_signature_mismatch"
        );
    }

    valid
}

/// Check that a client timestamp lies within `max_age_ms` of the server time.
///
/// The boundary is inclusive: a skew of exactly `max_age_ms` is accepted.
pub fn is_fresh(client_ms: i64, server_ms: i64, max_age_ms: u64) -> bool {
    server_ms.abs_diff(client_ms) <= max_age_ms
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Check if signature verification is enabled for a configured secret.
pub fn is_signature_verification_enabled(secret: &str) -> bool {
    !secret.is_empty()
}
