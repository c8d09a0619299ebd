//! AES-128-CBC payload encryption.
//!
//! Output format is `base64(iv || ciphertext)` with the standard alphabet.
//! Every call draws a fresh 16-byte IV. There is no authentication here;
//! integrity comes from [`super::HmacSigner`] over the encoded string.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use cbc::cipher::{
    block_padding::{NoPadding, Pkcs7},
    BlockDecryptMut, BlockEncryptMut, KeyIvInit,
};
use rand::{rngs::OsRng, RngCore};

use crate::error::DecryptError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES block size in bytes. Also the IV length.
pub const BLOCK_SIZE: usize = 16;

/// Source of cryptographically secure random bytes.
pub trait RandomSource: Send + Sync {
    fn bytes(&self, n: usize) -> Vec<u8>;
}

/// Operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn bytes(&self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        OsRng.fill_bytes(&mut buf);
        buf
    }
}

/// Encrypts and decrypts export payloads with a fixed 128-bit key.
#[derive(Clone)]
pub struct PayloadCipher {
    key: [u8; 16],
    rng: Arc<dyn RandomSource>,
}

impl PayloadCipher {
    pub fn new(key: [u8; 16], rng: Arc<dyn RandomSource>) -> Self {
        Self { key, rng }
    }

    /// Encrypt `plaintext` under a fresh IV and return the base64 envelope data.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&self.rng.bytes(BLOCK_SIZE)[..BLOCK_SIZE]);

        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut out = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        BASE64.encode(out)
    }

    /// Reverse of [`PayloadCipher::encrypt`].
    ///
    /// Fails on bad base64, on input that is not a whole number of blocks
    /// after the IV, and on a padding length of zero, longer than one block,
    /// or longer than the data.
    pub fn decrypt(&self, encoded: &str) -> Result<String, DecryptError> {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| DecryptError::Base64(e.to_string()))?;

        if decoded.len() < BLOCK_SIZE {
            return Err(DecryptError::TooShort(decoded.len()));
        }
        if decoded.len() % BLOCK_SIZE != 0 || decoded.len() == BLOCK_SIZE {
            return Err(DecryptError::Misaligned(decoded.len()));
        }

        let (iv_bytes, ciphertext) = decoded.split_at(BLOCK_SIZE);
        let mut iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(iv_bytes);

        let padded = Aes128CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| DecryptError::Misaligned(decoded.len()))?;

        let plaintext = strip_padding(padded)?;
        String::from_utf8(plaintext).map_err(|_| DecryptError::Utf8)
    }
}

/// Remove trailing padding whose length is given by the last byte.
fn strip_padding(mut data: Vec<u8>) -> Result<Vec<u8>, DecryptError> {
    let pad = match data.last() {
        Some(&b) => b,
        None => return Err(DecryptError::Padding(0)),
    };

    if pad == 0 || pad as usize > BLOCK_SIZE || pad as usize > data.len() {
        return Err(DecryptError::Padding(pad));
    }

    data.truncate(data.len() - pad as usize);
    Ok(data)
}
