use db::models::page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to resolve the asset directory: {0}")]
    AssetDir(#[from] std::io::Error),
}

/// Process settings read from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub page_size: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`AppConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url = match read("DATABASE_URL") {
            Some(url) => url,
            None => utils::assets::default_database_url()?,
        };
        let host = read("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = read("BACKEND_PORT")
            .or_else(|| read("PORT"))
            .map(|raw| parse_or_default("PORT", &raw, DEFAULT_PORT))
            .unwrap_or(DEFAULT_PORT);
        let page_size = read("PAGE_SIZE")
            .map(|raw| parse_or_default("PAGE_SIZE", &raw, DEFAULT_PAGE_SIZE))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let page_size = if (1..=MAX_PAGE_SIZE).contains(&page_size) {
            page_size
        } else {
            tracing::warn!(
                "PAGE_SIZE={} is outside 1..={}; using {}",
                page_size,
                MAX_PAGE_SIZE,
                DEFAULT_PAGE_SIZE
            );
            DEFAULT_PAGE_SIZE
        };

        Ok(Self {
            database_url,
            host,
            port,
            page_size,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or_default<T>(name: &str, raw: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match raw.parse::<T>() {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(value = raw, error = %err, "Invalid {name}; using {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
    }

    #[test]
    fn explicit_values_are_used() {
        let config = config_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("HOST", "0.0.0.0"),
            ("PORT", "9000"),
            ("PAGE_SIZE", "25"),
        ]);
        assert_eq!(
            config,
            AppConfig {
                database_url: "sqlite::memory:".to_string(),
                host: "0.0.0.0".to_string(),
                port: 9000,
                page_size: 25,
            }
        );
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn backend_port_wins_over_port() {
        let config = config_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("BACKEND_PORT", "7001"),
            ("PORT", "7002"),
        ]);
        assert_eq!(config.port, 7001);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("HOST", "  "),
            ("PORT", "eighty"),
            ("PAGE_SIZE", "0"),
        ]);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }
}
