use std::sync::Mutex;

use askdb_core::{
    DbErrorInfo, DbFailure, EngineError, ExecutedQuery, QueryExecutor,
};
use async_trait::async_trait;

/// Outcome a probe or execution rule produces when its fragment matches.
#[derive(Debug, Clone)]
pub enum FakeDbOutcome {
    Pass,
    Fail { sqlstate: String, message: String },
}

/// Deterministic executor: SQL containing a rule's fragment gets that rule's
/// outcome; everything else passes. Execution returns the configured rows.
#[derive(Default)]
pub struct FakeExecutor {
    rules: Mutex<Vec<(String, FakeDbOutcome)>>,
    execute_rules: Mutex<Vec<(String, FakeDbOutcome)>>,
    rows: Mutex<Vec<serde_json::Value>>,
    probes: Mutex<Vec<String>>,
    executions: Mutex<Vec<(String, u32)>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any SQL containing `fragment` with the given SQLSTATE, on both
    /// probe and execution.
    pub fn fail_on(&self, fragment: &str, sqlstate: &str, message: &str) {
        self.rules.lock().unwrap().push((
            fragment.to_string(),
            FakeDbOutcome::Fail {
                sqlstate: sqlstate.to_string(),
                message: message.to_string(),
            },
        ));
    }

    /// Fail only the real execution, letting the EXPLAIN probe pass.
    pub fn fail_execute_on(&self, fragment: &str, sqlstate: &str, message: &str) {
        self.execute_rules.lock().unwrap().push((
            fragment.to_string(),
            FakeDbOutcome::Fail {
                sqlstate: sqlstate.to_string(),
                message: message.to_string(),
            },
        ));
    }

    /// Remove a failure rule, simulating a fix between attempts.
    pub fn clear_rules(&self) {
        self.rules.lock().unwrap().clear();
    }

    pub fn set_rows(&self, rows: Vec<serde_json::Value>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn probed_sql(&self) -> Vec<String> {
        self.probes.lock().unwrap().clone()
    }

    pub fn executed_sql(&self) -> Vec<(String, u32)> {
        self.executions.lock().unwrap().clone()
    }

    fn outcome_for(&self, sql: &str) -> FakeDbOutcome {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or(FakeDbOutcome::Pass)
    }
}

fn failure(sqlstate: &str, message: &str) -> EngineError {
    EngineError::Database(DbFailure::new(
        DbErrorInfo::new(message).with_sqlstate(sqlstate),
    ))
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn probe(&self, sql: &str) -> Result<serde_json::Value, EngineError> {
        self.probes.lock().unwrap().push(sql.to_string());
        match self.outcome_for(sql) {
            FakeDbOutcome::Pass => Ok(serde_json::json!([{"Plan": {"Node Type": "Seq Scan"}}])),
            FakeDbOutcome::Fail { sqlstate, message } => Err(failure(&sqlstate, &message)),
        }
    }

    async fn execute(&self, sql: &str, max_rows: u32) -> Result<ExecutedQuery, EngineError> {
        self.executions
            .lock()
            .unwrap()
            .push((sql.to_string(), max_rows));
        let execute_rule = self
            .execute_rules
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, outcome)| outcome.clone());
        if let Some(FakeDbOutcome::Fail { sqlstate, message }) = execute_rule {
            return Err(failure(&sqlstate, &message));
        }
        match self.outcome_for(sql) {
            FakeDbOutcome::Fail { sqlstate, message } => Err(failure(&sqlstate, &message)),
            FakeDbOutcome::Pass => {
                let all = self.rows.lock().unwrap().clone();
                let cap = max_rows as usize;
                let truncated = all.len() > cap;
                let rows: Vec<serde_json::Value> = all.into_iter().take(cap).collect();
                Ok(ExecutedQuery {
                    row_count: rows.len(),
                    rows,
                    truncated,
                })
            }
        }
    }
}
