use std::collections::VecDeque;
use std::sync::Mutex;

use askdb_core::{
    EngineError, GenerateRequest, GenerationOutput, GenerationService, RepairRequest,
};
use async_trait::async_trait;

/// What a generate call looked like, for assertions.
#[derive(Debug, Clone)]
pub struct RecordedGenerate {
    pub attempt: Option<u32>,
    pub multi_candidate_k: Option<u32>,
    pub temperature: Option<f64>,
    pub schema_context: String,
}

/// What a repair call looked like, for assertions.
#[derive(Debug, Clone)]
pub struct RecordedRepair {
    pub previous_sql: String,
    pub validator_issues: Vec<String>,
    pub db_error_sqlstate: Option<String>,
    pub minimal_whitelist: Option<Vec<String>>,
    pub attempt: u32,
}

/// Deterministic generation service: responses are scripted up front and
/// consumed in order. An exhausted queue fails the call, which exercises
/// the fan-out's partial-failure tolerance.
#[derive(Default)]
pub struct ScriptedGenerator {
    generate_queue: Mutex<VecDeque<Result<GenerationOutput, String>>>,
    repair_queue: Mutex<VecDeque<Result<GenerationOutput, String>>>,
    generate_calls: Mutex<Vec<RecordedGenerate>>,
    repair_calls: Mutex<Vec<RecordedRepair>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_generate_sql(&self, sql: &str) {
        self.generate_queue
            .lock()
            .unwrap()
            .push_back(Ok(output(sql)));
    }

    pub fn push_generate_error(&self, message: &str) {
        self.generate_queue
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn push_repair_sql(&self, sql: &str) {
        self.repair_queue.lock().unwrap().push_back(Ok(output(sql)));
    }

    pub fn generate_calls(&self) -> Vec<RecordedGenerate> {
        self.generate_calls.lock().unwrap().clone()
    }

    pub fn repair_calls(&self) -> Vec<RecordedRepair> {
        self.repair_calls.lock().unwrap().clone()
    }
}

fn output(sql: &str) -> GenerationOutput {
    GenerationOutput {
        sql_generated: sql.to_string(),
        sql_candidates: Vec::new(),
        confidence: 0.9,
        notes: None,
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate_sql(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerationOutput, EngineError> {
        self.generate_calls.lock().unwrap().push(RecordedGenerate {
            attempt: request.attempt,
            multi_candidate_k: request.multi_candidate_k,
            temperature: request.temperature,
            schema_context: request.schema_context.clone(),
        });

        match self.generate_queue.lock().unwrap().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(EngineError::GenerationFailed(message)),
            None => Err(EngineError::GenerationFailed(
                "generation script exhausted".to_string(),
            )),
        }
    }

    async fn repair_sql(&self, request: &RepairRequest) -> Result<GenerationOutput, EngineError> {
        self.repair_calls.lock().unwrap().push(RecordedRepair {
            previous_sql: request.previous_sql.clone(),
            validator_issues: request.validator_issues.clone(),
            db_error_sqlstate: request
                .db_error
                .as_ref()
                .and_then(|e| e.sqlstate.clone()),
            minimal_whitelist: request
                .db_error
                .as_ref()
                .and_then(|e| e.minimal_whitelist.clone()),
            attempt: request.attempt,
        });

        match self.repair_queue.lock().unwrap().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(EngineError::GenerationFailed(message)),
            None => Err(EngineError::GenerationFailed(
                "repair script exhausted".to_string(),
            )),
        }
    }
}
