use std::env;

use crate::error::{AppError, AppResult};

/// Runtime configuration, read once at startup from the environment
/// (with `.env` support for local development).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub jwt_secret: String,
    pub static_dir: String,
    pub tls_cert_path: String,
    pub tls_key_path: String,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| AppError::Config(format!("invalid PORT value: {raw}")))?,
            Err(_) => 2052,
        };

        // Token issuance lives in the auth service; this service only needs
        // the shared verification secret and refuses to start without it.
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET is not set".to_string()))?;
        if jwt_secret.is_empty() {
            return Err(AppError::Config("JWT_SECRET is empty".to_string()));
        }

        Ok(Config {
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "roomly.db".to_string()),
            jwt_secret,
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "public".to_string()),
            tls_cert_path: env::var("TLS_CERT")
                .unwrap_or_else(|_| "ssl/roomly/certificate.pem".to_string()),
            tls_key_path: env::var("TLS_KEY")
                .unwrap_or_else(|_| "ssl/roomly/private.key".to_string()),
        })
    }
}
