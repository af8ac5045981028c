//! Environment variable names read by [`StoreSettings::from_env`].
//!
//! These are purely helpers; the store types themselves never touch the
//! environment.
//!
//! [`StoreSettings::from_env`]: crate::config::StoreSettings::from_env

/// Backend selector: `postgresql` or `sqlite`.
pub const LOG_STORE_DB_TYPE_ENV: &str = "LOG_STORE_DB_TYPE";

/// PostgreSQL host name.
pub const LOG_STORE_HOST_ENV: &str = "LOG_STORE_HOST";

/// PostgreSQL port.
pub const LOG_STORE_PORT_ENV: &str = "LOG_STORE_PORT";

/// PostgreSQL database name.
pub const LOG_STORE_DATABASE_ENV: &str = "LOG_STORE_DATABASE";

/// PostgreSQL user name.
pub const LOG_STORE_USERNAME_ENV: &str = "LOG_STORE_USERNAME";

/// PostgreSQL password.
pub const LOG_STORE_PASSWORD_ENV: &str = "LOG_STORE_PASSWORD";

/// SQLite database file.
pub const LOG_STORE_SQLITE_PATH_ENV: &str = "LOG_STORE_SQLITE_PATH";

/// Target table name, shared by both backends.
pub const LOG_STORE_TABLE_ENV: &str = "LOG_STORE_TABLE";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_when_unset() {
        assert_eq!(env_or("LOG_STORE_SURELY_UNSET_VARIABLE", "fallback"), "fallback");
    }
}
