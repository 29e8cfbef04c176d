//! Basic example showing how to use sea-orm-query-logger.
//!
//! Run with: cargo run --example basic

use sea_orm::{
    ConnectionTrait, DbBackend, MockDatabase, MockExecResult, Statement, Value,
};
use sea_orm_query_logger::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sea_orm_query_logger=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A mock connection keeps the example self-contained; a real one from
    // `Database::connect` is wrapped the same way.
    let db = MockDatabase::new(DbBackend::MySql)
        .append_exec_results([MockExecResult {
            last_insert_id: 1,
            rows_affected: 1,
        }])
        .into_connection();

    // Option 1: default configuration, lines go to `tracing`
    let db = db.with_query_logger();

    // Option 2: custom sink
    // let db = attach(
    //     ObservedConnection::from(db),
    //     LoggerConfig::default().with_sink(sea_orm_query_logger::StdoutSink),
    // );

    db.execute(Statement::from_sql_and_values(
        DbBackend::MySql,
        "INSERT INTO users (name, age) VALUES (?, ?)",
        [
            Value::String(Some(Box::new("ann".to_string()))),
            Value::Int(Some(30)),
        ],
    ))
    .await?;

    // No exec result is queued for this one, so it fails and logs nothing.
    let failed = db.execute_unprepared("DELETE FROM users").await;
    tracing::info!(failed = failed.is_err(), "Second statement finished");

    Ok(())
}
