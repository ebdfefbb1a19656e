//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::{RetryPolicy, SagaConfig};

/// Server and engine configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` - bind address (default: `"0.0.0.0"`)
/// - `PORT` - listen port (default: `3000`)
/// - `WEBHOOK_SECRET` - shared secret for gateway webhook signatures
/// - `CART_FRESHNESS_SECS` - max cart snapshot age at checkout (default: 300)
/// - `RESERVATION_TTL_SECS` - hold lifetime before the sweeper reclaims it
///   (default: 900)
/// - `SWEEPER_INTERVAL_SECS` - expiry sweep cadence (default: 30)
/// - `OUTBOX_INTERVAL_MS` - outbox drain cadence (default: 500)
/// - `RETRY_MAX_ATTEMPTS` / `RETRY_BASE_DELAY_MS` / `CALL_TIMEOUT_MS` -
///   outbound call retry budget (defaults: 3 / 100 / 5000)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub webhook_secret: String,
    pub cart_freshness_secs: i64,
    pub reservation_ttl_secs: i64,
    pub sweeper_interval_secs: u64,
    pub outbox_interval_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub call_timeout_ms: u64,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .unwrap_or_else(|_| "dev-webhook-secret".to_string()),
            cart_freshness_secs: env_parse("CART_FRESHNESS_SECS", 300),
            reservation_ttl_secs: env_parse("RESERVATION_TTL_SECS", 900),
            sweeper_interval_secs: env_parse("SWEEPER_INTERVAL_SECS", 30),
            outbox_interval_ms: env_parse("OUTBOX_INTERVAL_MS", 500),
            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", 3),
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", 100),
            call_timeout_ms: env_parse("CALL_TIMEOUT_MS", 5000),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The orchestrator tunables derived from this configuration.
    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            cart_freshness: chrono::Duration::seconds(self.cart_freshness_secs),
            retry: RetryPolicy {
                max_attempts: self.retry_max_attempts,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                call_timeout: Duration::from_millis(self.call_timeout_ms),
            },
            ..SagaConfig::default()
        }
    }

    /// Hold lifetime handed to the inventory engine.
    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reservation_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            webhook_secret: "dev-webhook-secret".to_string(),
            cart_freshness_secs: 300,
            reservation_ttl_secs: 900,
            sweeper_interval_secs: 30,
            outbox_interval_ms: 500,
            retry_max_attempts: 3,
            retry_base_delay_ms: 100,
            call_timeout_ms: 5000,
        }
    }
}
