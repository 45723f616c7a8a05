use crate::config::Config;
use jsonwebtoken::{DecodingKey, EncodingKey};
use sqlx::PgPool;
use std::sync::Arc;

/// HMAC keys derived once from `JWT_SECRET` instead of on every request.
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub expiry_hours: i64,
}

impl SessionKeys {
    pub fn from_config(config: &Config) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            expiry_hours: config.jwt_expiry_hours,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub keys: Arc<SessionKeys>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let keys = SessionKeys::from_config(&config);
        Self {
            db,
            config: Arc::new(config),
            keys: Arc::new(keys),
        }
    }
}
