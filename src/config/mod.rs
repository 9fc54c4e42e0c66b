//! Engine and database settings, read from the environment (after `.env`).

use crate::error::ConfigError;
use crate::filter::FilterMode;
use std::str::FromStr;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 1000;
pub const LIST_ALL_LIMIT: u64 = 1000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Knobs of the generic record service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Page size when a list request gives none (or one below 1).
    pub default_page_size: u64,
    /// Upper bound on any requested page size.
    pub max_page_size: u64,
    /// Rows returned by `list_all`.
    pub list_all_limit: u64,
    pub filter_mode: FilterMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            list_all_limit: LIST_ALL_LIMIT,
            filter_mode: FilterMode::Lenient,
        }
    }
}

impl EngineConfig {
    /// `CRUD_DEFAULT_PAGE_SIZE`, `CRUD_MAX_PAGE_SIZE`, `CRUD_LIST_ALL_LIMIT`, `CRUD_FILTER_MODE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            default_page_size: parse_or(&lookup, "CRUD_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: parse_or(&lookup, "CRUD_MAX_PAGE_SIZE", defaults.max_page_size)?,
            list_all_limit: parse_or(&lookup, "CRUD_LIST_ALL_LIMIT", defaults.list_all_limit)?,
            filter_mode: match lookup("CRUD_FILTER_MODE") {
                Some(v) => v.parse().map_err(|_| invalid("CRUD_FILTER_MODE", &v))?,
                None => defaults.filter_mode,
            },
        };
        for (key, value) in [
            ("CRUD_DEFAULT_PAGE_SIZE", config.default_page_size),
            ("CRUD_MAX_PAGE_SIZE", config.max_page_size),
            ("CRUD_LIST_ALL_LIMIT", config.list_all_limit),
        ] {
            if value == 0 {
                return Err(invalid(key, "0"));
            }
        }
        if config.default_page_size > config.max_page_size {
            return Err(invalid("CRUD_DEFAULT_PAGE_SIZE", &config.default_page_size.to_string()));
        }
        Ok(config)
    }
}

/// PostgreSQL connection settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// `DATABASE_URL` (required), `DATABASE_MAX_CONNECTIONS` (default 5).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup("DATABASE_URL")
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("DATABASE_URL".into()))?;
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(invalid("DATABASE_MAX_CONNECTIONS", "0"));
        }
        Ok(DatabaseConfig { url, max_connections })
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(key, &raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn engine_defaults_apply_when_unset() {
        assert_eq!(EngineConfig::from_lookup(lookup(&[])).unwrap(), EngineConfig::default());
    }

    #[test]
    fn engine_values_parse() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CRUD_DEFAULT_PAGE_SIZE", "50"),
            ("CRUD_MAX_PAGE_SIZE", "200"),
            ("CRUD_FILTER_MODE", "Strict"),
        ]))
        .unwrap();
        assert_eq!(config.default_page_size, 50);
        assert_eq!(config.max_page_size, 200);
        assert_eq!(config.list_all_limit, LIST_ALL_LIMIT);
        assert_eq!(config.filter_mode, FilterMode::Strict);
    }

    #[test]
    fn engine_rejects_bad_values() {
        let err = EngineConfig::from_lookup(lookup(&[("CRUD_MAX_PAGE_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "CRUD_MAX_PAGE_SIZE"));
        assert!(EngineConfig::from_lookup(lookup(&[("CRUD_DEFAULT_PAGE_SIZE", "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("CRUD_DEFAULT_PAGE_SIZE", "2000")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("CRUD_FILTER_MODE", "loose")])).is_err());
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(
            DatabaseConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing(_))
        ));
        let db = DatabaseConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/records")])).unwrap();
        assert_eq!(db.max_connections, DEFAULT_MAX_CONNECTIONS);
    }
}
