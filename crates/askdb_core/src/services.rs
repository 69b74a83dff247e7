//! Seams to the external collaborators.
//!
//! The engine talks to the generation and embedding services only through
//! these traits; HTTP implementations live in `askdb_llm` and test fakes in
//! `askdb_test_support`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Body of `POST /generate_sql`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub question: String,
    pub database_id: String,
    /// Composed base prompt context plus any appended deltas.
    pub schema_context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_candidate_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Sampling temperature for this call; 0 requests a deterministic
    /// completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Database-error context inside `POST /repair_sql`.
#[derive(Debug, Clone, Serialize)]
pub struct RepairDbError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlstate: Option<String>,
    pub message: String,
    /// Surgical column whitelist for the table the error points at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimal_whitelist: Option<Vec<String>>,
}

/// Body of `POST /repair_sql`.
#[derive(Debug, Clone, Serialize)]
pub struct RepairRequest {
    pub question: String,
    pub database_id: String,
    pub previous_sql: String,
    /// Rendered repair deltas, in composition order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validator_issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_error: Option<RepairDbError>,
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Response of both generation endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationOutput {
    pub sql_generated: String,
    #[serde(default)]
    pub sql_candidates: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl GenerationOutput {
    /// Primary SQL plus any extra candidates, in response order.
    pub fn all_candidates(&self) -> Vec<String> {
        let mut all = Vec::with_capacity(1 + self.sql_candidates.len());
        if !self.sql_generated.trim().is_empty() {
            all.push(self.sql_generated.clone());
        }
        all.extend(
            self.sql_candidates
                .iter()
                .filter(|s| !s.trim().is_empty())
                .cloned(),
        );
        all
    }
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate_sql(&self, request: &GenerateRequest)
    -> Result<GenerationOutput, EngineError>;

    async fn repair_sql(&self, request: &RepairRequest) -> Result<GenerationOutput, EngineError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each text into a fixed-dimension vector, one per input.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;
}

/// Rows read by the safe executor, as JSON objects keyed by column name.
#[derive(Debug, Clone, Default)]
pub struct ExecutedQuery {
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
    /// More rows existed than the cap allowed.
    pub truncated: bool,
}

/// The database seam: plan probes and read-only execution.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// `EXPLAIN (FORMAT JSON)` under a tight statement timeout. Returns the
    /// plan, or a classified `EngineError::Database`.
    async fn probe(&self, sql: &str) -> Result<serde_json::Value, EngineError>;

    /// Run the SQL in a read-only transaction and read at most `max_rows`
    /// rows.
    async fn execute(&self, sql: &str, max_rows: u32) -> Result<ExecutedQuery, EngineError>;
}
