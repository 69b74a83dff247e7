use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, ErrorKind};

/// One question to answer with one SELECT.
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Row cap for the final execution; clamped to the configured ceiling.
    pub max_rows: Option<u32>,
    /// End-to-end deadline override.
    pub timeout_ms: Option<u64>,
    /// Include per-stage timings and attempt details in the response.
    #[serde(default)]
    pub trace: bool,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            max_rows: None,
            timeout_ms: None,
            trace: false,
        }
    }
}

/// Error payload inside a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
}

impl From<&EngineError> for ResponseError {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            recoverable: err.recoverable(),
        }
    }
}

/// The response written back to the tool caller.
///
/// Exactly one of `rows` (with `executed = true`) or `error` is meaningful;
/// the orchestrator guarantees the invariant.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub query_id: Uuid,
    pub sql_generated: String,
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
    pub tables_used: Vec<String>,
    /// 0–1; winner score scaled down by repair attempts consumed.
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<serde_json::Value>,
}

impl QueryResponse {
    pub fn failure(err: &EngineError, notes: Option<String>) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            sql_generated: String::new(),
            rows: Vec::new(),
            row_count: 0,
            tables_used: Vec::new(),
            confidence: 0.0,
            notes,
            executed: false,
            error: Some(ResponseError::from(err)),
            trace: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_response_carries_classified_error() {
        let err = EngineError::NoRelevantSchema;
        let response = QueryResponse::failure(&err, Some("0 attempts".to_string()));
        assert!(!response.executed);
        let payload = response.error.unwrap();
        assert_eq!(payload.kind, ErrorKind::NoRelevantSchema);
        assert!(!payload.recoverable);
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ValidationFailFast).unwrap();
        assert_eq!(json, "\"validation_fail_fast\"");
    }
}
