use std::sync::Arc;

use log_record_store::{
    create_store_by_name, ConfigMap, LogQuery, LogRecord, TracingDiagnostics,
    DEFAULT_RETENTION_DAYS,
};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Faults and cleanup counts from the store show up on the console.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "log_record_store=debug".into()),
        )
        .init();

    let path = std::env::var("SQLITE_PATH").unwrap_or_else(|_| "logs/app_logs.db".to_string());
    let mut config = ConfigMap::new();
    config.insert("sqlite_path".into(), path);

    let store = create_store_by_name("sqlite", &config, None, Arc::new(TracingDiagnostics)).await?;

    let batch = vec![
        LogRecord::new("INFO", "demo.http", "service started"),
        LogRecord::new("ERROR", "demo.orders", "order failed")
            .with_module("orders")
            .with_function("place_order")
            .with_line(42)
            .with_process_id(std::process::id() as i32)
            .with_extra("order_id", 123)
            .with_extra("customer", json!({"id": 7, "tier": "gold"})),
    ];
    store.insert_batch(&batch).await;

    for record in store.query(&LogQuery::default().level("ERROR").limit(10)).await {
        println!(
            "{} [{}] {}: {} {:?}",
            record.timestamp, record.level, record.logger, record.message, record.extra_data
        );
    }

    store.cleanup(DEFAULT_RETENTION_DAYS).await;
    Ok(())
}
