//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,

    // Database
    pub database_url: String,

    // Authentication (tokens are issued by the external auth provider;
    // we only verify them and extract the account id)
    pub jwt_secret: String,

    // Object storage
    pub storage_endpoint: String,
    pub storage_bucket: String,
    pub storage_api_key: String,
    pub max_upload_bytes: usize,

    // Payment webhook signatures
    pub card_webhook_secret: String,
    pub crypto_webhook_secret: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                // A short HMAC key makes every session token forgeable
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },

            // Object storage
            storage_endpoint: env::var("STORAGE_ENDPOINT")
                .map_err(|_| ConfigError::Missing("STORAGE_ENDPOINT"))?,
            storage_bucket: env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| "link_files".to_string()),
            storage_api_key: env::var("STORAGE_API_KEY")
                .map_err(|_| ConfigError::Missing("STORAGE_API_KEY"))?,
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| "52428800".to_string()) // 50MB default
                .parse()
                .unwrap_or(52_428_800),

            // Payment webhooks
            card_webhook_secret: env::var("CARD_WEBHOOK_SECRET").unwrap_or_default(),
            crypto_webhook_secret: env::var("CRYPTO_WEBHOOK_SECRET").unwrap_or_default(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}
