//! Key derivation from the configured base string.

use std::fmt;

use sha2::{Digest, Sha256};

/// Keys used to protect exported messages.
///
/// Both come from a single SHA-256 digest of the base string: the cipher key
/// is its first 16 bytes, the signing key is the full 32 bytes. Clients that
/// know the base string derive the same pair.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub cipher_key: [u8; 16],
    pub sign_key: [u8; 32],
}

impl KeyMaterial {
    /// Derive keys from `base`. An empty base is accepted and yields weak keys.
    pub fn derive(base: &str) -> Self {
        let digest: [u8; 32] = Sha256::digest(base.as_bytes()).into();

        let mut cipher_key = [0u8; 16];
        cipher_key.copy_from_slice(&digest[..16]);

        Self {
            cipher_key,
            sign_key: digest,
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial").finish_non_exhaustive()
    }
}
