use crate::backend::BackendKind;
use crate::record::{LogQuery, LogRecord};
use async_trait::async_trait;

/// Table used when the caller does not name one.
pub const DEFAULT_TABLE_NAME: &str = "application_logs";

/// Retention used by callers that do not configure their own.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Persistent destination for [`LogRecord`]s.
///
/// Implementations own one table in one database and open a fresh
/// connection for every call. None of the operations return an error: a
/// failing store reports the fault to its diagnostic sink and answers with
/// `false` or an empty result, so that log persistence can never take the
/// host application down with it.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Which backend this store talks to.
    fn kind(&self) -> BackendKind;

    /// Name of the table this store reads and writes.
    fn table_name(&self) -> &str;

    /// Create the table and its indexes if they do not exist yet.
    ///
    /// Constructors already call this once; calling it again is harmless.
    /// Failures are reported, never returned.
    async fn bootstrap_table(&self);

    /// Insert all `records` in one transaction.
    ///
    /// **Returns**
    /// - `true` if every record was written, or `records` is empty.
    /// - `false` if anything failed; in that case nothing was written.
    async fn insert_batch(&self, records: &[LogRecord]) -> bool;

    /// Read records newest first, filtered and paginated by `query`.
    ///
    /// Returns an empty vector if the read failed.
    async fn query(&self, query: &LogQuery) -> Vec<LogRecord>;

    /// Delete every record older than `retention_days` days.
    ///
    /// The deleted row count goes to the diagnostic sink.
    async fn cleanup(&self, retention_days: u32) -> bool;

    /// Open and close a connection.
    async fn test_connection(&self) -> bool;
}
