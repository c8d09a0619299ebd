//! Encrypted export of stored messages.
//!
//! ```text
//! records → JSON → AES-128-CBC → base64 data → HMAC-SHA256 → signature
//! ```
//!
//! Clients holding the base decryption string derive the same keys, check
//! the signature over `data`, then decrypt. [`Exporter::open`] does exactly that.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crypto::{HmacSigner, KeyMaterial, PayloadCipher, RandomSource};
use crate::error::ExportError;
use crate::storage::StoredMessage;

/// Encrypted and signed message listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// base64(iv || ciphertext)
    pub data: String,
    /// base64(HMAC-SHA256(data))
    pub signature: String,
}

/// Seals message listings into envelopes and opens them again.
#[derive(Clone)]
pub struct Exporter {
    cipher: PayloadCipher,
    signer: HmacSigner,
}

impl Exporter {
    pub fn new(keys: &KeyMaterial, rng: Arc<dyn RandomSource>) -> Self {
        Self {
            cipher: PayloadCipher::new(keys.cipher_key, rng),
            signer: HmacSigner::new(keys.sign_key),
        }
    }

    /// Serialize, encrypt and sign `records`.
    pub fn seal(&self, records: &[StoredMessage]) -> Result<EncryptedEnvelope, ExportError> {
        let json = serde_json::to_string(records)?;
        let data = self.cipher.encrypt(&json);
        let signature = self.signer.sign(&data);

        debug!(
            records = records.len(),
            data_length = data.len(),
            "export_envelope_sealed"
        );

        Ok(EncryptedEnvelope { data, signature })
    }

    /// Verify and decrypt an envelope produced by [`Exporter::seal`].
    pub fn open(&self, envelope: &EncryptedEnvelope) -> Result<Vec<StoredMessage>, ExportError> {
        if !self.signer.verify(&envelope.data, &envelope.signature) {
            warn!("export_envelope_signature_mismatch");
            return Err(ExportError::SignatureMismatch);
        }

        let json = self.cipher.decrypt(&envelope.data)?;
        Ok(serde_json::from_str(&json)?)
    }
}
