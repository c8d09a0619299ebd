//! Configuration module for environment variable parsing.
//!
//! All settings are read once at startup into an immutable [`Config`] that is
//! shared by reference with every component.

use std::env;
use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::web::signature::DEFAULT_MAX_AGE_MS;

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// SQLite connection string
    pub database_url: String,

    /// Shared secret for webhook signature verification (unset disables it)
    pub shared_secret: Option<String>,

    /// Base string the export keys are derived from
    pub base_decryption_string: String,

    /// Path the webhook handler listens on
    pub webhook_path: String,

    /// Allowed clock skew for webhook timestamps, in milliseconds
    pub signature_max_age_ms: u64,

    // =========================================================================
    // Web Login
    // =========================================================================

    /// Username for the web interface
    pub web_username: String,

    /// Password for the web interface (unset rejects every login)
    pub web_password: Option<String>,

    /// Secret used to sign session cookies (unset generates one per process)
    pub session_secret: Option<String>,

    /// Optional template rendered for every stored message
    pub message_template: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: parse_env("PORT", 5000),

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:sms_webhook.db".to_string()),

            shared_secret: optional_env("SECRET_KEY"),

            base_decryption_string: env::var("BASE_DECRYPTION_STRING").unwrap_or_default(),

            webhook_path: normalize_path(
                &env::var("WEBHOOK_PATH").unwrap_or_else(|_| "/webhook".to_string()),
            ),

            signature_max_age_ms: parse_env("SIGNATURE_MAX_AGE_MS", DEFAULT_MAX_AGE_MS),

            web_username: env::var("WEB_USERNAME").unwrap_or_else(|_| "admin".to_string()),

            web_password: optional_env("WEB_PASSWORD"),

            session_secret: optional_env("SESSION_SECRET"),

            message_template: optional_env("MESSAGE_TEMPLATE"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 5000,
            database_url: "sqlite:sms_webhook.db".to_string(),
            shared_secret: None,
            base_decryption_string: String::new(),
            webhook_path: "/webhook".to_string(),
            signature_max_age_ms: DEFAULT_MAX_AGE_MS,
            web_username: "admin".to_string(),
            web_password: None,
            session_secret: None,
            message_template: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("shared_secret_set", &self.shared_secret.is_some())
            .field("base_decryption_string_set", &!self.base_decryption_string.is_empty())
            .field("webhook_path", &self.webhook_path)
            .field("signature_max_age_ms", &self.signature_max_age_ms)
            .field("web_username", &self.web_username)
            .field("web_password_set", &self.web_password.is_some())
            .field("session_secret_set", &self.session_secret.is_some())
            .field("message_template", &self.message_template)
            .finish()
    }
}

/// Parse a variable, falling back to `default` when unset or invalid.
fn parse_env<T: FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Read a variable, treating empty values as unset.
fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Ensure a route path starts with `/`.
fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
