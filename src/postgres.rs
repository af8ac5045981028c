use crate::backend::{validate_table_name, BackendKind, ConfigError};
use crate::config::PostgresConfig;
use crate::diagnostics::{Diagnostic, Operation, SharedDiagnostics};
use crate::error::StoreError;
use crate::record::{LogQuery, LogRecord};
use crate::sql::{
    capped_retention_days, index_statements, insert_prefix, select_statement, Placeholder,
    BINDS_PER_ROW,
};
use crate::store::LogStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, Postgres};
use sqlx::types::Json;
use sqlx::{Connection, QueryBuilder, Row};
use std::collections::BTreeMap;

/// PostgreSQL caps a statement at 65535 bind parameters.
const MAX_ROWS_PER_STATEMENT: usize = 4096;

const _: () = assert!(MAX_ROWS_PER_STATEMENT * BINDS_PER_ROW <= u16::MAX as usize);

/// [`LogStore`] backed by a PostgreSQL table.
///
/// `extra_data` lives in a `JSONB` column and round-trips as structured
/// data. There is no pool: each call opens its own connection and closes it
/// before returning. Put a pooler in front of the server if connection setup
/// cost matters.
pub struct PostgresStore {
    options: PgConnectOptions,
    config: PostgresConfig,
    table: String,
    diagnostics: SharedDiagnostics,
}

impl PostgresStore {
    /// Build the store and bootstrap its table.
    ///
    /// Only an invalid table name is an error. An unreachable server is not:
    /// the bootstrap fault is reported to `diagnostics` and the store is
    /// returned anyway, so later calls can succeed once the server is up.
    pub async fn connect(
        config: PostgresConfig,
        table: impl Into<String>,
        diagnostics: SharedDiagnostics,
    ) -> Result<Self, ConfigError> {
        let table = table.into();
        validate_table_name(&table)?;

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .password(&config.password)
            .application_name(env!("CARGO_PKG_NAME"));

        let store = PostgresStore {
            options,
            config,
            table,
            diagnostics,
        };
        store.bootstrap_table().await;
        Ok(store)
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    async fn open(&self) -> Result<PgConnection, StoreError> {
        PgConnection::connect_with(&self.options)
            .await
            .map_err(StoreError::Connect)
    }

    fn report(&self, operation: Operation, error: &StoreError) {
        self.diagnostics
            .report(Diagnostic::fault(BackendKind::Postgres, &self.table, operation, error));
    }

    /// Create the table and indexes, returning the fault instead of reporting it.
    pub async fn try_bootstrap(&self) -> Result<(), StoreError> {
        let mut conn = self.open().await?;
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
        for record in records {
            record.validate()?;
        }

        let mut conn = self.open().await?;
        let mut tx = conn.begin().await?;
        let mut inserted = 0;

        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Postgres>::new(insert_prefix(&self.table));
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.timestamp)
                    .push_bind(record.level.as_str())
                    .push_bind(record.logger.as_str())
                    .push_bind(record.module.as_deref())
                    .push_bind(record.function.as_deref())
                    .push_bind(record.line_column())
                    .push_bind(record.message.as_str())
                    .push_bind(record.thread_name.as_deref())
                    .push_bind(record.process_id)
                    .push_bind(record.exception.as_deref())
                    .push_bind(record.extra_data.as_ref().map(Json));
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        release(conn).await;
        Ok(inserted)
    }

    pub async fn try_query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, StoreError> {
        let stmt = select_statement(&self.table, query, Placeholder::Numbered);

        let mut conn = self.open().await?;
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
    /// Retention is capped at [`MAX_RETENTION_DAYS`](crate::sql::MAX_RETENTION_DAYS)
    /// so the interval arithmetic never leaves the timestamp range.
    pub async fn try_cleanup(&self, retention_days: u32) -> Result<u64, StoreError> {
        let days = i32::try_from(capped_retention_days(retention_days)).unwrap_or(i32::MAX);
        let stmt = format!(
            "DELETE FROM {} WHERE timestamp < NOW() - make_interval(days => $1)",
            self.table
        );

        let mut conn = self.open().await?;
        let deleted = sqlx::query(&stmt)
            .bind(days)
            .execute(&mut conn)
            .await?
            .rows_affected();
        release(conn).await;
        Ok(deleted)
    }

    pub async fn try_ping(&self) -> Result<(), StoreError> {
        let mut conn = self.open().await?;
        conn.ping().await?;
        conn.close().await?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for PostgresStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    async fn bootstrap_table(&self) {
        match self.try_bootstrap().await {
            Ok(()) => tracing::debug!(table = %self.table, "postgres log table ready"),
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
                    backend: BackendKind::Postgres,
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

fn create_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id SERIAL PRIMARY KEY,
            timestamp TIMESTAMP WITH TIME ZONE NOT NULL,
            level VARCHAR(20) NOT NULL,
            logger VARCHAR(255) NOT NULL,
            module VARCHAR(255),
            function VARCHAR(255),
            line INTEGER,
            message TEXT NOT NULL,
            thread_name VARCHAR(255),
            process_id INTEGER,
            exception TEXT,
            extra_data JSONB
        )",
        table
    )
}

fn record_from_row(row: &PgRow) -> Result<LogRecord, StoreError> {
    let line: Option<i32> = row.try_get("line")?;
    let line = line
        .map(|l| u32::try_from(l).map_err(|_| StoreError::CorruptRow(format!("negative line {}", l))))
        .transpose()?;
    let extra: Option<Json<BTreeMap<String, Value>>> = row.try_get("extra_data")?;

    Ok(LogRecord {
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
        level: row.try_get("level")?,
        logger: row.try_get("logger")?,
        module: row.try_get("module")?,
        function: row.try_get("function")?,
        line,
        message: row.try_get("message")?,
        thread_name: row.try_get("thread_name")?,
        process_id: row.try_get("process_id")?,
        exception: row.try_get("exception")?,
        extra_data: extra.map(|Json(map)| map),
    })
}

/// Close a connection after a successful operation.
///
/// The work is already done at this point, so a failed goodbye is only
/// worth a debug line.
async fn release(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "failed to close postgres connection cleanly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_has_every_column() {
        let stmt = create_table_statement("application_logs");
        assert!(stmt.starts_with("CREATE TABLE IF NOT EXISTS application_logs ("));
        for column in [
            "id SERIAL PRIMARY KEY",
            "timestamp TIMESTAMP WITH TIME ZONE NOT NULL",
            "level VARCHAR(20) NOT NULL",
            "message TEXT NOT NULL",
            "extra_data JSONB",
        ] {
            assert!(stmt.contains(column), "missing `{}`", column);
        }
    }
}
