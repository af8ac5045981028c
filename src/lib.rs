pub mod record;
pub mod store;
pub mod backend;
pub mod config;
pub mod env;
pub mod error;
pub mod diagnostics;
pub mod sql;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use backend::{
    create_store, create_store_by_name, create_store_from_dsn, create_store_from_settings,
    parse_dsn, BackendKind, ConfigError,
};
pub use config::{ConfigMap, StoreSettings};
pub use diagnostics::{Diagnostic, DiagnosticSink, MemoryDiagnostics, TracingDiagnostics};
pub use error::{FaultKind, StoreError};
pub use record::{LogQuery, LogRecord};
pub use store::{LogStore, DEFAULT_RETENTION_DAYS, DEFAULT_TABLE_NAME};
