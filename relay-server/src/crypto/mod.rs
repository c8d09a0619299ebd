//! Cryptographic building blocks for the export path.
//!
//! - `keys`: derives the cipher and signing keys from the configured base string
//! - `cipher`: AES-128-CBC with a random IV per message
//! - `signer`: HMAC-SHA256 over the encoded ciphertext

pub mod cipher;
pub mod keys;
pub mod signer;

pub use cipher::{OsRandom, PayloadCipher, RandomSource, BLOCK_SIZE};
pub use keys::KeyMaterial;
pub use signer::HmacSigner;
