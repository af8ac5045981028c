use crate::backend::{validate_table_name, BackendKind, ConfigError};
use crate::config::SqliteConfig;
use crate::diagnostics::{Diagnostic, Operation, SharedDiagnostics};
use crate::error::StoreError;
use crate::record::{LogQuery, LogRecord};
use crate::sql::{
    capped_retention_days, index_statements, insert_prefix, select_statement, Placeholder,
};
use crate::store::LogStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Connection, QueryBuilder, Row};
use std::collections::BTreeMap;
use std::path::Path;

/// Stay well below SQLite's 32766 bind-parameter limit.
const MAX_ROWS_PER_STATEMENT: usize = 2048;

/// Fixed-width UTC text form of `timestamp`.
///
/// Sorts lexicographically in time order and compares correctly against
/// `strftime('%Y-%m-%d %H:%M:%f', ...)`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Retention cutoff in [`TIMESTAMP_FORMAT`], bound to a `-N days` modifier.
///
/// SQLite's clock only has millisecond resolution, so `%f` yields three
/// digits; padding to six keeps the cutoff the same width as stored values.
const CUTOFF_EXPR: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now', ?) || '000'";

/// [`LogStore`] backed by a single SQLite database file.
///
/// `extra_data` is kept as JSON text and decoded again on read, so records
/// come back in the same shape as from the PostgreSQL store.
pub struct SqliteStore {
    options: SqliteConnectOptions,
    config: SqliteConfig,
    table: String,
    diagnostics: SharedDiagnostics,
}

impl SqliteStore {
    /// Create the parent directories of the database file, then bootstrap
    /// the table.
    ///
    /// Only an invalid table name is an error. A path that cannot be created
    /// or opened is reported to `diagnostics`; the store is still returned
    /// and every later call degrades the same way.
    pub async fn open(
        config: SqliteConfig,
        table: impl Into<String>,
        diagnostics: SharedDiagnostics,
    ) -> Result<Self, ConfigError> {
        let table = table.into();
        validate_table_name(&table)?;

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true);

        let store = SqliteStore {
            options,
            config,
            table,
            diagnostics,
        };

        if let Err(e) = ensure_parent_dir(&store.config.path).await {
            store.report(Operation::Bootstrap, &e);
        }
        store.bootstrap_table().await;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    async fn connect(&self) -> Result<SqliteConnection, StoreError> {
        SqliteConnection::connect_with(&self.options)
            .await
            .map_err(StoreError::Connect)
    }

    fn report(&self, operation: Operation, error: &StoreError) {
        self.diagnostics
            .report(Diagnostic::fault(BackendKind::Sqlite, &self.table, operation, error));
    }

    pub async fn try_bootstrap(&self) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;

        sqlx::query(&create_table_statement(&self.table))
            .execute(&mut *tx)
            .await?;
        for stmt in index_statements(&self.table) {
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        release(conn).await;
        Ok(())
    }

    /// Insert `records` in one transaction and return the number of rows written.
    pub async fn try_insert_batch(&self, records: &[LogRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            record.validate()?;
            let extra = record
                .extra_data
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            rows.push((record, format_timestamp(&record.timestamp), extra));
        }

        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;
        let mut inserted = 0;

        for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Sqlite>::new(insert_prefix(&self.table));
            builder.push_values(chunk, |mut row, (record, timestamp, extra)| {
                row.push_bind(timestamp.as_str())
                    .push_bind(record.level.as_str())
                    .push_bind(record.logger.as_str())
                    .push_bind(record.module.as_deref())
                    .push_bind(record.function.as_deref())
                    .push_bind(record.line_column())
                    .push_bind(record.message.as_str())
                    .push_bind(record.thread_name.as_deref())
                    .push_bind(record.process_id)
                    .push_bind(record.exception.as_deref())
                    .push_bind(extra.as_deref());
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        release(conn).await;
        Ok(inserted)
    }

    pub async fn try_query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, StoreError> {
        let stmt = select_statement(&self.table, query, Placeholder::Positional);

        let mut conn = self.connect().await?;
        let mut q = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            q = q.bind(param);
        }
        let rows = q
            .bind(i64::from(query.limit))
            .bind(i64::from(query.offset))
            .fetch_all(&mut conn)
            .await?;
        release(conn).await;

        rows.iter().map(record_from_row).collect()
    }

    /// Delete records older than `retention_days` and return how many went.
    ///
    /// The cutoff is taken at millisecond precision, so a record within the
    /// same millisecond as the cutoff may survive one more run.
    pub async fn try_cleanup(&self, retention_days: u32) -> Result<u64, StoreError> {
        let stmt = format!("DELETE FROM {} WHERE timestamp < {}", self.table, CUTOFF_EXPR);

        let mut conn = self.connect().await?;
        let deleted = sqlx::query(&stmt)
            .bind(retention_modifier(retention_days))
            .execute(&mut conn)
            .await?
            .rows_affected();
        release(conn).await;
        Ok(deleted)
    }

    pub async fn try_ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        conn.ping().await?;
        conn.close().await?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for SqliteStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    async fn bootstrap_table(&self) {
        match self.try_bootstrap().await {
            Ok(()) => tracing::debug!(
                table = %self.table,
                path = %self.config.path.display(),
                "sqlite log table ready"
            ),
            Err(e) => self.report(Operation::Bootstrap, &e),
        }
    }

    async fn insert_batch(&self, records: &[LogRecord]) -> bool {
        match self.try_insert_batch(records).await {
            Ok(inserted) => {
                tracing::debug!(table = %self.table, inserted, "stored log batch");
                true
            }
            Err(e) => {
                self.report(Operation::Insert, &e);
                false
            }
        }
    }

    async fn query(&self, query: &LogQuery) -> Vec<LogRecord> {
        self.try_query(query).await.unwrap_or_else(|e| {
            self.report(Operation::Query, &e);
            Vec::new()
        })
    }

    async fn cleanup(&self, retention_days: u32) -> bool {
        match self.try_cleanup(retention_days).await {
            Ok(deleted) => {
                self.diagnostics.report(Diagnostic::Purged {
                    backend: BackendKind::Sqlite,
                    table: self.table.clone(),
                    retention_days,
                    deleted,
                });
                true
            }
            Err(e) => {
                self.report(Operation::Cleanup, &e);
                false
            }
        }
    }

    async fn test_connection(&self) -> bool {
        match self.try_ping().await {
            Ok(()) => true,
            Err(e) => {
                self.report(Operation::TestConnection, &e);
                false
            }
        }
    }
}

async fn ensure_parent_dir(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            tokio::fs::create_dir_all(parent).await?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn create_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            level VARCHAR(20) NOT NULL,
            logger VARCHAR(255) NOT NULL,
            module VARCHAR(255),
            function VARCHAR(255),
            line INTEGER,
            message TEXT NOT NULL,
            thread_name VARCHAR(255),
            process_id INTEGER,
            exception TEXT,
            extra_data TEXT
        )",
        table
    )
}

fn retention_modifier(retention_days: u32) -> String {
    format!("-{} days", capped_retention_days(retention_days))
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp; RFC 3339 text written by other tools is accepted too.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StoreError::CorruptRow(format!("unparseable timestamp `{}`", raw)))
}

fn record_from_row(row: &SqliteRow) -> Result<LogRecord, StoreError> {
    let timestamp: String = row.try_get("timestamp")?;
    let line: Option<i64> = row.try_get("line")?;
    let line = line
        .map(|l| u32::try_from(l).map_err(|_| StoreError::CorruptRow(format!("bad line {}", l))))
        .transpose()?;
    let process_id: Option<i64> = row.try_get("process_id")?;
    let process_id = process_id
        .map(|p| i32::try_from(p).map_err(|_| StoreError::CorruptRow(format!("bad process id {}", p))))
        .transpose()?;
    let extra: Option<String> = row.try_get("extra_data")?;
    let extra_data = extra
        .map(|text| serde_json::from_str::<BTreeMap<String, Value>>(&text))
        .transpose()?;

    Ok(LogRecord {
        timestamp: parse_timestamp(&timestamp)?,
        level: row.try_get("level")?,
        logger: row.try_get("logger")?,
        module: row.try_get("module")?,
        function: row.try_get("function")?,
        line,
        message: row.try_get("message")?,
        thread_name: row.try_get("thread_name")?,
        process_id,
        exception: row.try_get("exception")?,
        extra_data,
    })
}

async fn release(conn: SqliteConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "failed to close sqlite connection cleanly");
    }
}
