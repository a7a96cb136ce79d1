//! Process configuration, read from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PORT` | `8080` |
//! | `ENV` | `development` |
//! | `LOG_LEVEL` | `info` |
//! | `DATABASE_URL` | required |
//! | `DB_TIMEOUT_SEC` | `5` |
//! | `DB_MAX_CONNECTIONS` | `25` |
//! | `DB_MIN_CONNECTIONS` | `10` |
//! | `DB_MAX_LIFETIME_SEC` | `300` |
//! | `DB_IDLE_TIMEOUT_SEC` | `120` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    /// Upper bound on one adjustment transaction and on pool acquisition.
    pub timeout: Duration,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub port: u16,
    pub environment: String,
    pub log_level: String,
    pub database: DatabaseConfig,
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            port: parse_or(&lookup, "PORT", 8080),
            environment: text("ENV", "development"),
            log_level: text("LOG_LEVEL", "info"),
            database: DatabaseConfig {
                url,
                timeout: Duration::from_secs(parse_or(&lookup, "DB_TIMEOUT_SEC", 5)),
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 25),
                min_connections: parse_or(&lookup, "DB_MIN_CONNECTIONS", 10),
                max_lifetime: Duration::from_secs(parse_or(&lookup, "DB_MAX_LIFETIME_SEC", 300)),
                idle_timeout: Duration::from_secs(parse_or(&lookup, "DB_IDLE_TIMEOUT_SEC", 120)),
            },
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, %default, "invalid number; using default");
            default
        }),
    }
}
