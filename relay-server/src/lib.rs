//! SMS Relay - webhook receiver for forwarded SMS.
//!
//! Phones running an SMS forwarding app call the webhook with each message.
//! Calls are checked for freshness and an HMAC signature, then stored.
//! Logged-in users fetch the stored messages as an AES-CBC encrypted,
//! HMAC-signed envelope.
//!
//! ## Architecture
//!
//! ```text
//! Webhook → IngestPipeline (parse → timestamp → signature) → MessageStore
//! MessageStore → Exporter (JSON → encrypt → sign) → /messages
//! ```

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod export;
pub mod ingest;
pub mod storage;
pub mod template;
pub mod web;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use crypto::{KeyMaterial, OsRandom, RandomSource};
pub use error::{DecryptError, ExportError, IngestError, StorageError};
pub use export::{EncryptedEnvelope, Exporter};
pub use ingest::{IngestOutcome, IngestPipeline, IngestRequest};
pub use storage::{MemoryMessageStore, MessageStore, NewMessage, SqliteMessageStore, StoredMessage};
pub use web::AppState;
