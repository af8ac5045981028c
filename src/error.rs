use crate::record::RecordError;

/// Fault raised by a storage operation.
///
/// These never escape a [`LogStore`](crate::store::LogStore) trait call: the
/// store reports them through its [`DiagnosticSink`](crate::diagnostics::DiagnosticSink)
/// and degrades to `false` or an empty result. The fallible `try_*` methods on
/// the concrete stores return them directly.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("failed to connect: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("statement failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("failed to serialize extra data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("unreadable row: {0}")]
    CorruptRow(String),
}

/// Coarse classification of a [`StoreError`] for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Backend unreachable, credentials rejected, file not writable.
    Connection,
    /// Statement rejected, schema mismatch, bad data.
    Query,
}

impl StoreError {
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            StoreError::Connect(_) | StoreError::Io(_) => FaultKind::Connection,
            StoreError::Query(sqlx::Error::Io(_))
            | StoreError::Query(sqlx::Error::Tls(_))
            | StoreError::Query(sqlx::Error::PoolTimedOut)
            | StoreError::Query(sqlx::Error::PoolClosed) => FaultKind::Connection,
            _ => FaultKind::Query,
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultKind::Connection => f.write_str("connection"),
            FaultKind::Query => f.write_str("query"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_io_faults_are_connection_faults() {
        let err = StoreError::Connect(sqlx::Error::PoolTimedOut);
        assert_eq!(err.fault_kind(), FaultKind::Connection);

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        assert_eq!(StoreError::Io(io).fault_kind(), FaultKind::Connection);

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "reset");
        assert_eq!(
            StoreError::Query(sqlx::Error::Io(io)).fault_kind(),
            FaultKind::Connection
        );
    }

    #[test]
    fn statement_faults_are_query_faults() {
        let err = StoreError::Query(sqlx::Error::RowNotFound);
        assert_eq!(err.fault_kind(), FaultKind::Query);

        let err = StoreError::InvalidRecord(RecordError::Empty("message"));
        assert_eq!(err.fault_kind(), FaultKind::Query);
        assert_eq!(err.to_string(), "invalid record: required field `message` is empty");
    }
}
