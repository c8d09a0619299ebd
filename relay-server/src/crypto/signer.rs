//! HMAC-SHA256 signatures over export payloads.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies strings with a 32-byte key.
#[derive(Clone)]
pub struct HmacSigner {
    key: [u8; 32],
}

impl HmacSigner {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn mac(&self, data: &str) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .expect("HMAC can take key of any size");
        mac.update(data.as_bytes());
        mac
    }

    /// Base64 of the raw 32-byte tag.
    pub fn sign(&self, data: &str) -> String {
        BASE64.encode(self.mac(data).finalize().into_bytes())
    }

    /// Constant-time check of `signature` against `data`.
    ///
    /// A signature that is not valid base64 simply fails verification.
    pub fn verify(&self, data: &str, signature: &str) -> bool {
        let Ok(tag) = BASE64.decode(signature) else {
            return false;
        };
        self.mac(data).verify_slice(&tag).is_ok()
    }
}
