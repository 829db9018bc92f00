use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::pricing::{DEFAULT_PLATFORM_FEE, DEFAULT_TAX_PERCENT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub payment: PaymentConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub booking: BookingConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    /// `text` или `json`
    pub log_format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(()),
        }
    }
}

// Настройки хранилища
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Обязателен для `postgres`
    pub database_url: Option<String>,
    pub pool_size: u32,
}

// Настройки Redis. Без URL отозванные токены хранятся в памяти процесса.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

// Настройки JWT
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    /// Роль, которой разрешено решать возвраты
    pub admin_role: String,
}

// Настройки платежного шлюза
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub merchant_id: String,
    pub merchant_password: String,
    pub gateway_url: String,
    pub currency: String,
    pub timeout_seconds: u64,
}

// Настройки Circuit Breaker
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

// Холды и цены
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    pub hold_ttl_seconds: i64,
    pub sweep_interval_seconds: u64,
    pub max_seats_per_hold: usize,
    pub platform_fee: i64,
    pub tax_percent: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Собирает конфигурацию из произвольного источника переменных.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let backend = vars.parsed("STORAGE_BACKEND", StorageBackend::Postgres)?;
        let database_url = vars.optional("DATABASE_URL");
        if backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let config = Config {
            app: AppConfig {
                host: vars.or("HOST", "0.0.0.0"),
                port: vars.parsed("PORT", 8000)?,
                environment: vars.or("ENVIRONMENT", "development"),
                rust_log: vars.or("RUST_LOG", "seat_booking=debug,tower_http=debug"),
                log_format: vars.or("LOG_FORMAT", "text"),
            },
            storage: StorageConfig {
                backend,
                database_url,
                pool_size: vars.parsed("DB_POOL_SIZE", 20)?,
            },
            redis: RedisConfig {
                url: vars.optional("REDIS_URL"),
            },
            jwt: JwtConfig {
                secret: vars.required("JWT_SECRET")?,
                admin_role: vars.or("JWT_ADMIN_ROLE", "admin"),
            },
            payment: PaymentConfig {
                merchant_id: vars.required("MERCHANT_ID")?,
                merchant_password: vars.required("MERCHANT_PASSWORD")?,
                gateway_url: vars.or("PAYMENT_GATEWAY_URL", "https://gateway.hackload.com"),
                currency: vars.or("PAYMENT_CURRENCY", "INR"),
                timeout_seconds: vars.parsed("PAYMENT_TIMEOUT_SECONDS", 30)?,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: vars.parsed("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5)?,
                timeout_seconds: vars.parsed("CIRCUIT_BREAKER_TIMEOUT_SECONDS", 60)?,
            },
            booking: BookingConfig {
                hold_ttl_seconds: vars.parsed("HOLD_TTL_SECONDS", 300)?,
                sweep_interval_seconds: vars.parsed("HOLD_SWEEP_INTERVAL_SECONDS", 30)?,
                max_seats_per_hold: vars.parsed("MAX_SEATS_PER_HOLD", 10)?,
                platform_fee: vars.parsed("PLATFORM_FEE", DEFAULT_PLATFORM_FEE)?,
                tax_percent: vars.parsed("TAX_PERCENT", DEFAULT_TAX_PERCENT)?,
            },
        };

        if config.booking.hold_ttl_seconds <= 0 {
            return Err(ConfigError::Invalid {
                key: "HOLD_TTL_SECONDS",
                value: config.booking.hold_ttl_seconds.to_string(),
            });
        }
        if config.booking.sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid { key: "HOLD_SWEEP_INTERVAL_SECONDS", value: "0".into() });
        }
        if config.booking.max_seats_per_hold == 0 {
            return Err(ConfigError::Invalid { key: "MAX_SEATS_PER_HOLD", value: "0".into() });
        }

        Ok(config)
    }

    /// Конфигурация из карты переменных, удобно в тестах.
    pub fn from_map(vars: &HashMap<&str, &str>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn parsed<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("STORAGE_BACKEND", "memory"),
            ("JWT_SECRET", "secret"),
            ("MERCHANT_ID", "cinema"),
            ("MERCHANT_PASSWORD", "pw"),
        ])
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_map(&base()).unwrap();
        assert_eq!(config.app.port, 8000);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.redis.url.is_none());
        assert_eq!(config.booking.hold_ttl_seconds, 300);
        assert_eq!(config.booking.sweep_interval_seconds, 30);
        assert_eq!(config.booking.max_seats_per_hold, 10);
        assert_eq!(config.booking.platform_fee, 4_000);
        assert_eq!(config.booking.tax_percent, 18);
        assert_eq!(config.app.rust_log, "seat_booking=debug,tower_http=debug");
    }

    #[test]
    fn postgres_requires_database_url() {
        let mut vars = base();
        vars.insert("STORAGE_BACKEND", "postgres");
        assert!(matches!(Config::from_map(&vars), Err(ConfigError::Missing("DATABASE_URL"))));

        vars.insert("DATABASE_URL", "postgres://localhost/seats");
        assert!(Config::from_map(&vars).is_ok());
    }

    #[test]
    fn missing_secret_is_reported() {
        let mut vars = base();
        vars.remove("JWT_SECRET");
        assert!(matches!(Config::from_map(&vars), Err(ConfigError::Missing("JWT_SECRET"))));
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let mut vars = base();
        vars.insert("PORT", "eighty");
        assert!(matches!(
            Config::from_map(&vars),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));

        let mut vars = base();
        vars.insert("HOLD_TTL_SECONDS", "0");
        assert!(matches!(
            Config::from_map(&vars),
            Err(ConfigError::Invalid { key: "HOLD_TTL_SECONDS", .. })
        ));
    }
}
