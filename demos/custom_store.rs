use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log_record_store::{BackendKind, LogQuery, LogRecord, LogStore};

/// Example of integrating a completely custom backend by implementing the
/// `LogStore` trait directly. Here it is a plain in-memory vector; a real
/// one would call the client library of the target database.
#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<LogRecord>>,
}

#[async_trait]
impl LogStore for MemoryStore {
    fn kind(&self) -> BackendKind {
        // Custom stores are not selectable through the factory; report the
        // closest built-in kind.
        BackendKind::Sqlite
    }

    fn table_name(&self) -> &str {
        "memory"
    }

    async fn bootstrap_table(&self) {}

    async fn insert_batch(&self, records: &[LogRecord]) -> bool {
        if records.iter().any(|r| r.validate().is_err()) {
            return false;
        }
        match self.rows.lock() {
            Ok(mut rows) => {
                rows.extend_from_slice(records);
                true
            }
            Err(_) => false,
        }
    }

    async fn query(&self, query: &LogQuery) -> Vec<LogRecord> {
        let Ok(rows) = self.rows.lock() else {
            return Vec::new();
        };
        let mut matching: Vec<_> = rows
            .iter()
            .filter(|r| query.level.as_ref().map_or(true, |l| &r.level == l))
            .filter(|r| query.logger.as_ref().map_or(true, |l| &r.logger == l))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect()
    }

    async fn cleanup(&self, retention_days: u32) -> bool {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        match self.rows.lock() {
            Ok(mut rows) => {
                rows.retain(|r| r.timestamp >= cutoff);
                true
            }
            Err(_) => false,
        }
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

#[tokio::main]
async fn main() {
    let store: Box<dyn LogStore> = Box::new(MemoryStore::default());

    store
        .insert_batch(&[
            LogRecord::new("ERROR", "custom", "simulated error").with_extra("db", "memory"),
            LogRecord::new("INFO", "custom", "old news")
                .with_timestamp(Utc::now() - Duration::days(90)),
        ])
        .await;

    store.cleanup(30).await;
    println!("[custom-store] {:?}", store.query(&LogQuery::default()).await);
}
