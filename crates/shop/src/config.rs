//! Shop configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOP_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)
//! - `STRIPE_SECRET_KEY` - Payment provider secret key
//!
//! ## Optional
//! - `SHOP_HOST` - Bind address (default: 127.0.0.1)
//! - `SHOP_PORT` - Listen port (default: 3000)
//! - `STRIPE_API_BASE` - Override the provider endpoint (test stubs)
//! - `CHARGE_MAX_ATTEMPTS` - Charge attempts per order (default: 3)
//! - `CHARGE_BASE_BACKOFF_MS` - First retry delay (default: 500)
//! - `PAYMENT_WORKERS` - Concurrent payment workers (default: 2)
//! - `PAYMENT_PENDING_TIMEOUT_SECS` - Age at which a pending payment is
//!   expired (default: 300)
//! - `PAYMENT_SWEEP_INTERVAL_SECS` - How often to sweep for stale pending
//!   payments (default: 60)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag (default: development)

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::payments::RetryPolicy;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Shop application configuration.
#[derive(Debug, Clone)]
pub struct ShopConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Payment gateway configuration
    pub gateway: GatewayConfig,
    /// Payment pipeline tuning
    pub payments: PaymentsConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: String,
}

/// Payment gateway configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Provider secret key
    pub secret_key: SecretString,
    /// Endpoint override; `None` means the provider's production API
    pub base_url: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("secret_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Payment pipeline tuning.
#[derive(Debug, Clone, Copy)]
pub struct PaymentsConfig {
    /// Charge attempts per order, the first included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_backoff: Duration,
    /// Concurrent payment workers draining the charge queue
    pub workers: u32,
    /// Age at which a `payment_pending` order is expired
    pub pending_timeout: Duration,
    /// Interval between stale-payment sweeps
    pub sweep_interval: Duration,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            workers: 2,
            pending_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl PaymentsConfig {
    /// The retry schedule the payment worker should run with.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: self.base_backoff,
        }
    }
}

impl ShopConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("SHOP_DATABASE_URL")?;
        let host = get_env_or_default("SHOP_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("SHOP_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("SHOP_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SHOP_PORT".to_string(), e.to_string()))?;

        let gateway = GatewayConfig {
            secret_key: get_required_secret("STRIPE_SECRET_KEY")?,
            base_url: get_optional_env("STRIPE_API_BASE"),
        };
        let payments = PaymentsConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_env_or_default("SENTRY_ENVIRONMENT", "development");

        Ok(Self {
            database_url,
            host,
            port,
            gateway,
            payments,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl PaymentsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_attempts: get_parsed_or("CHARGE_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_backoff: Duration::from_millis(get_parsed_or(
                "CHARGE_BASE_BACKOFF_MS",
                500_u64,
            )?),
            workers: get_parsed_or("PAYMENT_WORKERS", defaults.workers)?,
            pending_timeout: Duration::from_secs(get_parsed_or(
                "PAYMENT_PENDING_TIMEOUT_SECS",
                300_u64,
            )?),
            sweep_interval: Duration::from_secs(get_parsed_or(
                "PAYMENT_SWEEP_INTERVAL_SECS",
                60_u64,
            )?),
        })
    }
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, using the default when unset.
fn get_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_debug_redacts_secret() {
        let config = GatewayConfig {
            secret_key: SecretString::from("sk_live_abc123"),
            base_url: None,
        };
        let rendered = format!("{config:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("sk_live_abc123"));
    }

    #[test]
    fn test_socket_addr_combines_host_and_port() {
        let config = ShopConfig {
            database_url: SecretString::from("postgres://localhost/shop"),
            host: "0.0.0.0".parse().expect("addr"),
            port: 8080,
            gateway: GatewayConfig {
                secret_key: SecretString::from("sk_test"),
                base_url: None,
            },
            payments: PaymentsConfig::default(),
            sentry_dsn: None,
            sentry_environment: "test".to_owned(),
        };
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_retry_policy_mirrors_payment_config() {
        let payments = PaymentsConfig {
            max_attempts: 5,
            base_backoff: Duration::from_millis(100),
            ..PaymentsConfig::default()
        };
        let policy = payments.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_backoff, Duration::from_millis(100));
    }
}
