use crate::backend::BackendKind;
use crate::error::{FaultKind, StoreError};
use std::sync::{Arc, Mutex};

/// Storage operation a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Bootstrap,
    Insert,
    Query,
    Cleanup,
    TestConnection,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Bootstrap => "bootstrap",
            Operation::Insert => "insert",
            Operation::Query => "query",
            Operation::Cleanup => "cleanup",
            Operation::TestConnection => "test_connection",
        }
    }
}

/// A storage fault that was absorbed by a store instead of being returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub backend: BackendKind,
    pub table: String,
    pub operation: Operation,
    pub kind: FaultKind,
    pub message: String,
}

/// Event emitted by a store on its diagnostic side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Fault(Fault),
    /// Retention cleanup finished and removed `deleted` rows.
    Purged {
        backend: BackendKind,
        table: String,
        retention_days: u32,
        deleted: u64,
    },
}

impl Diagnostic {
    pub(crate) fn fault(
        backend: BackendKind,
        table: &str,
        operation: Operation,
        error: &StoreError,
    ) -> Self {
        Diagnostic::Fault(Fault {
            backend,
            table: table.to_string(),
            operation,
            kind: error.fault_kind(),
            message: error.to_string(),
        })
    }
}

/// Receiver for the diagnostics stores emit while degrading gracefully.
///
/// Stores never call into a global logger of their own; whatever sink is
/// injected at construction decides where faults end up. `report` is called
/// inline on the calling task and should not block.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`. This is the default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::Fault(fault) => tracing::error!(
                backend = %fault.backend,
                table = %fault.table,
                operation = fault.operation.as_str(),
                fault = %fault.kind,
                "log store operation failed: {}",
                fault.message
            ),
            Diagnostic::Purged {
                backend,
                table,
                retention_days,
                deleted,
            } => tracing::info!(
                backend = %backend,
                table = %table,
                retention_days,
                deleted,
                "removed expired log records"
            ),
        }
    }
}

/// A sink that drops every diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnostics;

impl DiagnosticSink for NoopDiagnostics {
    fn report(&self, _diagnostic: Diagnostic) {}
}

/// Collects diagnostics in memory.
///
/// Clones share the same buffer, so one clone can be handed to a store while
/// another is kept for inspection (tests, health endpoints).
#[derive(Debug, Clone, Default)]
pub struct MemoryDiagnostics {
    events: Arc<Mutex<Vec<Diagnostic>>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }

    /// Only the faults reported so far.
    pub fn faults(&self) -> Vec<Fault> {
        self.lock()
            .iter()
            .filter_map(|d| match d {
                Diagnostic::Fault(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    /// Drain the buffer.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        // A panicking reporter must not disable diagnostics for everyone else.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticSink for MemoryDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        self.lock().push(diagnostic);
    }
}

/// Shared handle type stores keep for their sink.
pub type SharedDiagnostics = Arc<dyn DiagnosticSink>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fault() -> Diagnostic {
        let err = StoreError::Query(sqlx::Error::RowNotFound);
        Diagnostic::fault(BackendKind::Sqlite, "application_logs", Operation::Query, &err)
    }

    #[test]
    fn memory_sink_shares_buffer_between_clones() {
        let diagnostics = MemoryDiagnostics::new();
        let handle: SharedDiagnostics = Arc::new(diagnostics.clone());

        handle.report(sample_fault());
        handle.report(Diagnostic::Purged {
            backend: BackendKind::Sqlite,
            table: "application_logs".into(),
            retention_days: 30,
            deleted: 3,
        });

        assert_eq!(diagnostics.events().len(), 2);
        let faults = diagnostics.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].operation, Operation::Query);
        assert_eq!(faults[0].kind, FaultKind::Query);

        assert_eq!(diagnostics.take().len(), 2);
        assert!(diagnostics.events().is_empty());
    }

    #[test]
    fn tracing_and_noop_sinks_accept_everything() {
        TracingDiagnostics.report(sample_fault());
        NoopDiagnostics.report(sample_fault());
    }
}
