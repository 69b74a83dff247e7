//! Batch evaluator: run a file of questions through the pipeline against a
//! live stack and report per-question outcomes.

use std::fs;

use askdb_core::{AskRequest, EngineConfig, EngineError};
use serde::Deserialize;

use crate::bootstrap::EngineState;

#[derive(Debug, Deserialize)]
pub struct BenchQuestion {
    pub question: String,
    /// When present, the run checks the executed SQL touched these tables.
    #[serde(default)]
    pub expect_tables: Vec<String>,
}

#[derive(Debug, Default)]
pub struct BenchSummary {
    pub total: usize,
    pub executed: usize,
    pub refused: usize,
    pub failed: usize,
    pub table_mismatches: usize,
}

pub async fn run(config: EngineConfig, questions_path: &str) -> Result<BenchSummary, EngineError> {
    let content = fs::read_to_string(questions_path).map_err(|e| {
        EngineError::config(format!("cannot read question file {questions_path}: {e}"))
    })?;
    let questions: Vec<BenchQuestion> = serde_json::from_str(&content)
        .map_err(|e| EngineError::config(format!("malformed question file: {e}")))?;

    let state = EngineState::connect(config).await?;
    let mut summary = BenchSummary {
        total: questions.len(),
        ..Default::default()
    };

    for (i, entry) in questions.iter().enumerate() {
        let response = state
            .orchestrator
            .ask(AskRequest::new(entry.question.clone()))
            .await;

        if response.executed {
            summary.executed += 1;
            if !entry.expect_tables.is_empty() {
                let ok = entry
                    .expect_tables
                    .iter()
                    .all(|t| response.tables_used.contains(t));
                if !ok {
                    summary.table_mismatches += 1;
                }
            }
        } else if response.error.as_ref().is_some_and(|e| {
            matches!(
                e.kind,
                askdb_core::ErrorKind::ValidationFailFast | askdb_core::ErrorKind::NoRelevantSchema
            )
        }) {
            summary.refused += 1;
        } else {
            summary.failed += 1;
        }

        println!(
            "[{}/{}] executed={} question={:?} sql={:?}",
            i + 1,
            summary.total,
            response.executed,
            entry.question,
            response.sql_generated
        );
    }

    println!(
        "bench: {} total, {} executed, {} refused, {} failed, {} table mismatches",
        summary.total,
        summary.executed,
        summary.refused,
        summary.failed,
        summary.table_mismatches
    );
    Ok(summary)
}
