//! Live tests against a real PostgreSQL, gated behind an environment
//! variable so the default suite stays hermetic.
//!
//! Run with:
//!   ASKDB_TEST_DATABASE_URL=postgres://... cargo test -p askdb_executor -- --ignored

use askdb_core::{EngineConfig, EngineError, ErrorKind, QueryExecutor};
use askdb_executor::PgExecutor;

fn live_config() -> Option<EngineConfig> {
    let url = std::env::var("ASKDB_TEST_DATABASE_URL").ok()?;
    Some(EngineConfig {
        database_url: url,
        ..Default::default()
    })
}

#[tokio::test]
#[ignore = "requires a live PostgreSQL"]
async fn probe_returns_a_plan() {
    let Some(config) = live_config() else {
        return;
    };
    let executor = PgExecutor::new(&config);
    let plan = executor.probe("SELECT 1").await.unwrap();
    assert!(plan.is_array() || plan.is_object());
}

#[tokio::test]
#[ignore = "requires a live PostgreSQL"]
async fn probe_classifies_unknown_table() {
    let Some(config) = live_config() else {
        return;
    };
    let executor = PgExecutor::new(&config);
    let err = executor
        .probe("SELECT * FROM definitely_not_a_table")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTable);
}

#[tokio::test]
#[ignore = "requires a live PostgreSQL"]
async fn execute_reads_rows_within_cap() {
    let Some(config) = live_config() else {
        return;
    };
    let executor = PgExecutor::new(&config);
    let result = executor
        .execute("SELECT generate_series(1, 10) AS n", 5)
        .await
        .unwrap();
    assert_eq!(result.row_count, 5);
    assert!(result.truncated);
}

#[tokio::test]
#[ignore = "requires a live PostgreSQL"]
async fn writes_are_rejected_by_the_read_only_transaction() {
    let Some(config) = live_config() else {
        return;
    };
    let executor = PgExecutor::new(&config);
    let err = executor
        .execute("CREATE TABLE should_not_exist (id int)", 10)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Database(_)));
}
