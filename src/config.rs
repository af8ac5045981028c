//! Connection parameters for the storage backends.
//!
//! Callers hand the factory a flat [`ConfigMap`] (the same shape whether it
//! came from a settings file, a DSN, or the environment). Each backend picks
//! the keys it understands into a typed config and rejects the map before
//! any I/O happens if something required is missing.

use crate::backend::{BackendKind, ConfigError};
use crate::env::{
    env_or, LOG_STORE_DATABASE_ENV, LOG_STORE_DB_TYPE_ENV, LOG_STORE_HOST_ENV,
    LOG_STORE_PASSWORD_ENV, LOG_STORE_PORT_ENV, LOG_STORE_SQLITE_PATH_ENV, LOG_STORE_TABLE_ENV,
    LOG_STORE_USERNAME_ENV,
};
use crate::store::DEFAULT_TABLE_NAME;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Flat key/value connection configuration.
pub type ConfigMap = BTreeMap<String, String>;

pub const HOST_KEY: &str = "host";
pub const PORT_KEY: &str = "port";
pub const DATABASE_KEY: &str = "database";
pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";
pub const SQLITE_PATH_KEY: &str = "sqlite_path";

pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Connection parameters for [`PostgresStore`](crate::postgres::PostgresStore).
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl PostgresConfig {
    /// Read `host`, `port`, `database`, `username` and optional `password`.
    pub fn from_map(map: &ConfigMap) -> Result<Self, ConfigError> {
        let backend = BackendKind::Postgres;
        let port = require(map, backend, PORT_KEY)?;
        let port = port.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
            key: PORT_KEY,
            value: port.clone(),
            reason: e.to_string(),
        })?;

        Ok(PostgresConfig {
            host: require(map, backend, HOST_KEY)?,
            port,
            database: require(map, backend, DATABASE_KEY)?,
            username: require(map, backend, USERNAME_KEY)?,
            password: map.get(PASSWORD_KEY).cloned().unwrap_or_default(),
        })
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection parameters for [`SqliteStore`](crate::sqlite::SqliteStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Database file; parent directories are created on open.
    pub path: PathBuf,
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SqliteConfig { path: path.into() }
    }

    /// Read `sqlite_path`.
    ///
    /// In-memory databases are rejected: every operation opens its own
    /// connection, so nothing written would ever be visible again.
    pub fn from_map(map: &ConfigMap) -> Result<Self, ConfigError> {
        let path = require(map, BackendKind::Sqlite, SQLITE_PATH_KEY)?;
        if path.trim().is_empty() || path.contains(":memory:") || path.contains("mode=memory") {
            return Err(ConfigError::InvalidValue {
                key: SQLITE_PATH_KEY,
                value: path,
                reason: "an on-disk database file is required".to_string(),
            });
        }
        Ok(SqliteConfig::new(path))
    }
}

fn require(map: &ConfigMap, backend: BackendKind, key: &'static str) -> Result<String, ConfigError> {
    match map.get(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.clone()),
        _ => Err(ConfigError::MissingKey { backend, key }),
    }
}

/// Complete store settings with defaults for every field.
///
/// Deserializable from any serde format; missing fields take their defaults.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub db_type: BackendKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub sqlite_path: PathBuf,
    pub table_name: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            db_type: BackendKind::Sqlite,
            host: "localhost".to_string(),
            port: DEFAULT_POSTGRES_PORT,
            database: "logs".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            sqlite_path: PathBuf::from("logs/app_logs.db"),
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl std::fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSettings")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sqlite_path", &self.sqlite_path)
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl StoreSettings {
    /// Build settings from `LOG_STORE_*` environment variables, falling back
    /// to the defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = StoreSettings::default();

        let db_type = match std::env::var(LOG_STORE_DB_TYPE_ENV) {
            Ok(value) => value.parse()?,
            Err(_) => defaults.db_type,
        };

        let port = match std::env::var(LOG_STORE_PORT_ENV) {
            Ok(value) => value.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: PORT_KEY,
                value: value.clone(),
                reason: e.to_string(),
            })?,
            Err(_) => defaults.port,
        };

        Ok(StoreSettings {
            db_type,
            host: env_or(LOG_STORE_HOST_ENV, &defaults.host),
            port,
            database: env_or(LOG_STORE_DATABASE_ENV, &defaults.database),
            username: env_or(LOG_STORE_USERNAME_ENV, &defaults.username),
            password: env_or(LOG_STORE_PASSWORD_ENV, &defaults.password),
            sqlite_path: std::env::var_os(LOG_STORE_SQLITE_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.sqlite_path),
            table_name: env_or(LOG_STORE_TABLE_ENV, &defaults.table_name),
        })
    }

    /// Connection keys for the selected `db_type`.
    pub fn to_config_map(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        match self.db_type {
            BackendKind::Postgres => {
                map.insert(HOST_KEY.into(), self.host.clone());
                map.insert(PORT_KEY.into(), self.port.to_string());
                map.insert(DATABASE_KEY.into(), self.database.clone());
                map.insert(USERNAME_KEY.into(), self.username.clone());
                map.insert(PASSWORD_KEY.into(), self.password.clone());
            }
            BackendKind::Sqlite => {
                map.insert(
                    SQLITE_PATH_KEY.into(),
                    self.sqlite_path.to_string_lossy().into_owned(),
                );
            }
        }
        map
    }
}
