use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result};

use crate::api::ApiUrls;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub api: ApiUrls,
    pub checkout: CheckoutConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct CheckoutConfig {
    /// Lifetime of a staged checkout token.
    pub pending_ttl: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct DeliveryConfig {
    pub code_ttl: Duration,
    /// Used when an assignment does not carry its own expected time.
    pub expected_delivery: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            code_ttl: Duration::from_secs(24 * 60 * 60),
            expected_delivery: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// Loads configuration from the process environment (after `.env`, see `bootstrap::init_env`).
pub fn load() -> Result<Config> {
    Ok(Config {
        server: ServerConfig {
            host: env_or("SERVER_HOST", "0.0.0.0".to_string())?,
            port: env_or("SERVER_PORT", 3000)?,
        },
        database: DatabaseConfig {
            url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
        },
        api: ApiUrls::init()?,
        checkout: CheckoutConfig {
            pending_ttl: Duration::from_secs(env_or::<u64>("CHECKOUT_TTL_SECS", 15 * 60)?),
        },
        delivery: DeliveryConfig {
            code_ttl: Duration::from_secs(
                env_or::<u64>("DELIVERY_CODE_TTL_MINUTES", 24 * 60)? * 60,
            ),
            expected_delivery: Duration::from_secs(
                env_or::<u64>("EXPECTED_DELIVERY_MINUTES", 120)? * 60,
            ),
        },
    })
}

pub(crate) fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("Invalid value for {key}: {value:?}")),
        Err(_) => Ok(default),
    }
}
