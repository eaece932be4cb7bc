//! Engine configuration loaded from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use tradeledger_observability::LogFormat;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Absent selects the in-memory store and sequence generator.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Upper bound on lock waits and statements inside one transaction.
    pub transaction_timeout: Duration,
    /// Zero-padding width of document numbers.
    pub document_number_width: usize,
    pub listen_addr: SocketAddr,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            transaction_timeout: Duration::from_millis(5_000),
            document_number_width: 4,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Json,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL");
        if database_url.is_none() {
            tracing::warn!("DATABASE_URL not set; using in-memory ledger store (dev only)");
        }

        let database_max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(v) => parse_positive::<u32>("DATABASE_MAX_CONNECTIONS", &v)?,
            None => defaults.database_max_connections,
        };

        let transaction_timeout = match get("TRANSACTION_TIMEOUT_MS") {
            Some(v) => Duration::from_millis(parse_positive::<u64>("TRANSACTION_TIMEOUT_MS", &v)?),
            None => defaults.transaction_timeout,
        };

        let document_number_width = match get("DOCUMENT_NUMBER_WIDTH") {
            Some(v) => {
                let width = parse_positive::<usize>("DOCUMENT_NUMBER_WIDTH", &v)?;
                if width > 12 {
                    return Err(invalid("DOCUMENT_NUMBER_WIDTH", &v, "must be at most 12"));
                }
                width
            }
            None => defaults.document_number_width,
        };

        let listen_addr = match get("LISTEN_ADDR") {
            Some(v) => v
                .trim()
                .parse::<SocketAddr>()
                .map_err(|e| invalid("LISTEN_ADDR", &v, e))?,
            None => defaults.listen_addr,
        };

        let log_format = match get("LOG_FORMAT") {
            Some(v) => v.parse::<LogFormat>().map_err(|e| invalid("LOG_FORMAT", &v, e))?,
            None => defaults.log_format,
        };

        Ok(Self {
            database_url,
            database_max_connections,
            transaction_timeout,
            document_number_width,
            listen_addr,
            log_format,
        })
    }
}

fn invalid(name: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_positive<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let parsed = value
        .trim()
        .parse::<T>()
        .map_err(|e| invalid(name, value, e))?;
    if parsed <= T::default() {
        return Err(invalid(name, value, "must be greater than zero"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(load(&[]).unwrap(), EngineConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = load(&[
            ("DATABASE_URL", "postgres://ledger@localhost/ledger"),
            ("DATABASE_MAX_CONNECTIONS", "32"),
            ("TRANSACTION_TIMEOUT_MS", "750"),
            ("DOCUMENT_NUMBER_WIDTH", "6"),
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("LOG_FORMAT", "pretty"),
        ])
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://ledger@localhost/ledger"));
        assert_eq!(config.database_max_connections, 32);
        assert_eq!(config.transaction_timeout, Duration::from_millis(750));
        assert_eq!(config.document_number_width, 6);
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = load(&[("TRANSACTION_TIMEOUT_MS", "0")]).unwrap_err();
        assert!(err.to_string().contains("TRANSACTION_TIMEOUT_MS"));
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert!(load(&[("DATABASE_MAX_CONNECTIONS", "many")]).is_err());
        assert!(load(&[("LISTEN_ADDR", "not-an-address")]).is_err());
        assert!(load(&[("LOG_FORMAT", "xml")]).is_err());
    }
}
