//! EXPLAIN-first, read-only execution against PostgreSQL.

use askdb_core::{
    DbErrorInfo, DbFailure, EngineConfig, EngineError, ExecutedQuery, QueryExecutor,
};
use async_trait::async_trait;

use crate::convert::row_to_json;
use crate::pool::PgPool;

pub struct PgExecutor {
    pool: PgPool,
    probe_timeout_ms: u64,
    execute_timeout_ms: u64,
}

impl PgExecutor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pool: PgPool::new(&config.database_url, config.pool_size),
            probe_timeout_ms: config.probe_timeout_ms,
            execute_timeout_ms: config.execute_timeout_ms,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn probe(&self, sql: &str) -> Result<serde_json::Value, EngineError> {
        let mut client = self.pool.lease().await?;
        let txn = client
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .map_err(classify_pg_error)?;

        txn.batch_execute(&format!(
            "SET LOCAL statement_timeout = {}",
            self.probe_timeout_ms
        ))
        .await
        .map_err(classify_pg_error)?;

        let row = txn
            .query_one(&format!("EXPLAIN (FORMAT JSON) {sql}"), &[])
            .await
            .map_err(classify_pg_error)?;
        let plan: serde_json::Value = row.get(0);

        if let Err(e) = txn.rollback().await {
            log::warn!("probe rollback failed: {e}");
        }
        Ok(plan)
    }

    async fn execute(&self, sql: &str, max_rows: u32) -> Result<ExecutedQuery, EngineError> {
        let mut client = self.pool.lease().await?;
        let txn = client
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .map_err(classify_pg_error)?;

        txn.batch_execute(&format!(
            "SET LOCAL statement_timeout = {}",
            self.execute_timeout_ms
        ))
        .await
        .map_err(classify_pg_error)?;

        let rows = match txn.query(sql, &[]).await {
            Ok(rows) => rows,
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    log::warn!("rollback after failed execution also failed: {rollback}");
                }
                return Err(classify_pg_error(e));
            }
        };

        txn.commit().await.map_err(classify_pg_error)?;

        let cap = max_rows as usize;
        let truncated = rows.len() > cap;
        let json_rows: Vec<serde_json::Value> =
            rows.iter().take(cap).map(row_to_json).collect();

        Ok(ExecutedQuery {
            row_count: json_rows.len(),
            rows: json_rows,
            truncated,
        })
    }
}

/// Map a driver error to the classified engine error the repair controller
/// consumes. Errors without a server payload count as connection failures.
pub fn classify_pg_error(err: tokio_postgres::Error) -> EngineError {
    let info = match err.as_db_error() {
        Some(db) => {
            let mut info = DbErrorInfo::new(db.message()).with_sqlstate(db.code().code());
            if let Some(tokio_postgres::error::ErrorPosition::Original(p)) = db.position() {
                info = info.with_position(*p);
            }
            info
        }
        None => DbErrorInfo::new(err.to_string()),
    };
    EngineError::Database(DbFailure::new(info))
}
