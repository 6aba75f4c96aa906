//! Configuration module for item-service.

use rls_core::RlsSettings;
use secrecy::Secret;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service_name: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub rls: RlsSettings,
    pub seed: SeedConfig,
    pub allowed_origins: Vec<String>,
    pub log_level: String,
    pub log_json: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Secret<String>,
    pub access_token_expire_minutes: i64,
}

/// First users created at startup when they do not exist yet.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub first_superuser: Option<String>,
    pub first_superuser_password: Option<Secret<String>>,
    pub first_user: Option<String>,
    pub first_user_password: Option<Secret<String>>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "item-service".to_string()),
            server: ServerConfig {
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8000),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            jwt: JwtConfig {
                secret: Secret::new(env::var("JWT_SECRET").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("JWT_SECRET is required"))
                })?),
                access_token_expire_minutes: env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60 * 24 * 8),
            },
            rls: RlsSettings::from_env(),
            seed: SeedConfig {
                first_superuser: env::var("FIRST_SUPERUSER").ok(),
                first_superuser_password: env::var("FIRST_SUPERUSER_PASSWORD").ok().map(Secret::new),
                first_user: env::var("FIRST_USER").ok(),
                first_user_password: env::var("FIRST_USER_PASSWORD").ok().map(Secret::new),
            },
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_JSON")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
        })
    }
}
