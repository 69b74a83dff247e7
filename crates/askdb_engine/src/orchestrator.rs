//! Per-request pipeline: retrieve, generate, evaluate, repair, execute.
//!
//! Stateless across requests; everything the request produced is owned here
//! and released when the response is written. The overall deadline wraps the
//! whole pipeline; dropping the in-flight futures aborts outstanding HTTP
//! calls and rolls back any open transaction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use askdb_core::{
    AskRequest, DbFailure, EngineConfig, EngineError, ErrorKind, GenerateRequest,
    GenerationService, QueryExecutor, QueryResponse, QuestionIntent, RepairRequest, ResponseError,
    SchemaPacket, classify_question, extract_table_refs, tokenizer,
};
use askdb_llm::{
    PromptComposer, RepairDelta, classify_difficulty, generate_candidates, k_for,
};
use askdb_retrieval::SchemaRetriever;
use uuid::Uuid;

use crate::audit::{AttemptRecord, AuditCounters, RequestAudit};
use crate::evaluator::{Candidate, Evaluation, evaluate_candidates};
use crate::repair::build_repair_context;

pub struct Orchestrator {
    config: EngineConfig,
    retriever: Arc<SchemaRetriever>,
    generator: Arc<dyn GenerationService>,
    executor: Arc<dyn QueryExecutor>,
    composer: PromptComposer,
    counters: Arc<AuditCounters>,
}

struct PipelineSuccess {
    sql: String,
    rows: Vec<serde_json::Value>,
    row_count: usize,
    truncated: bool,
    tables_used: Vec<String>,
    confidence: f64,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        retriever: Arc<SchemaRetriever>,
        generator: Arc<dyn GenerationService>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        let composer = PromptComposer::new(&config.dialect);
        Self {
            config,
            retriever,
            generator,
            executor,
            composer,
            counters: Arc::new(AuditCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<AuditCounters> {
        Arc::clone(&self.counters)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Answer one question. Always returns a response with either rows or a
    /// classified error, never both.
    pub async fn ask(&self, request: AskRequest) -> QueryResponse {
        AuditCounters::bump(&self.counters.requests);
        let query_id = Uuid::new_v4();
        let mut audit = RequestAudit::new(query_id);

        let deadline = Duration::from_millis(
            request
                .timeout_ms
                .unwrap_or(self.config.request_timeout_ms),
        );

        let response = match tokio::time::timeout(deadline, self.run(&request, &mut audit)).await
        {
            Ok(Ok(success)) => {
                audit.log_completion("ok");
                self.success_response(query_id, success, &request, &audit)
            }
            Ok(Err(err)) => {
                self.count_failure(&err);
                audit.log_completion(err.kind().as_str());
                self.failure_response(query_id, &err, &request, &audit)
            }
            Err(_elapsed) => {
                let err = EngineError::DeadlineExceeded;
                self.count_failure(&err);
                audit.log_completion(err.kind().as_str());
                self.failure_response(query_id, &err, &request, &audit)
            }
        };

        let (requests, refusals, repairs, failures) = self.counters.snapshot();
        log::debug!(
            "totals: requests={requests} refusals={refusals} repairs={repairs} failures={failures}"
        );
        response
    }

    async fn run(
        &self,
        request: &AskRequest,
        audit: &mut RequestAudit,
    ) -> Result<PipelineSuccess, EngineError> {
        let intent = classify_question(&request.question);
        if let Some(verb) = &intent.write_verb {
            return Err(EngineError::ValidationFailFast(format!(
                "the question asks to {verb} data; only read queries are answered"
            )));
        }

        let stage = Instant::now();
        let packet = self.retriever.retrieve(&request.question).await?;
        audit.stage("retrieve", stage);

        let base_context = self.composer.base_context(&packet);
        let difficulty = classify_difficulty(&request.question, &packet);
        let k = k_for(difficulty, &self.config).max(1);

        let max_rows = request
            .max_rows
            .unwrap_or(self.config.default_max_rows)
            .min(self.config.max_rows_ceiling);

        let stage = Instant::now();
        let mut deltas: Vec<RepairDelta> = Vec::new();
        if k > 1 {
            deltas.push(RepairDelta::MultiCandidate { k });
        }
        let template = GenerateRequest {
            question: request.question.clone(),
            database_id: self.config.database_id(),
            schema_context: self.composer.compose(&base_context, &deltas),
            multi_candidate_k: (k > 1).then_some(k),
            attempt: Some(1),
            temperature: None,
        };
        let raw = generate_candidates(self.generator.as_ref(), &template, k).await?;
        audit.stage("generate", stage);

        let mut attempt = 1u32;
        let stage = Instant::now();
        let mut evaluation = evaluate_candidates(
            raw,
            &packet,
            &intent,
            self.executor.as_ref(),
            &self.config,
            attempt,
        )
        .await;
        audit.stage("evaluate", stage);
        audit.record_attempt(AttemptRecord {
            attempt,
            prior_sql: None,
            candidate_count: evaluation.candidates.len(),
            best_score: evaluation.candidates.first().map(|c| c.score),
            repair_delta: None,
            db_error: None,
        });

        loop {
            if evaluation.all_refused {
                return Err(EngineError::ValidationFailFast(
                    "every generated candidate violated a safety rule".to_string(),
                ));
            }

            if let Some(idx) = evaluation.winner {
                let candidate = evaluation.candidates[idx].clone();
                let stage = Instant::now();
                match self.executor.execute(&candidate.sql, max_rows).await {
                    Ok(result) => {
                        audit.stage("execute", stage);
                        return Ok(PipelineSuccess {
                            tables_used: tables_used(&candidate),
                            confidence: confidence(candidate.score, attempt),
                            sql: candidate.sql,
                            rows: result.rows,
                            row_count: result.row_count,
                            truncated: result.truncated,
                        });
                    }
                    Err(err) => {
                        audit.stage("execute", stage);
                        let repairable = err
                            .db_failure()
                            .is_some_and(|f| f.class.repairable())
                            && attempt < self.config.max_attempts;
                        if !repairable {
                            return Err(err);
                        }
                        let mut failed = candidate;
                        failed.explain_error = err.db_failure().cloned();
                        evaluation = self
                            .repair_round(&mut attempt, &failed, &packet, &intent, request, audit)
                            .await?;
                    }
                }
            } else if let Some(idx) = evaluation.fallback {
                let candidate = evaluation.candidates[idx].clone();
                if attempt >= self.config.max_attempts {
                    return Err(candidate_error(&candidate));
                }
                evaluation = self
                    .repair_round(&mut attempt, &candidate, &packet, &intent, request, audit)
                    .await?;
            } else {
                return Err(EngineError::GenerationFailed(
                    "no candidate survived evaluation".to_string(),
                ));
            }
        }
    }

    /// One serial repair round: build the targeted delta, call the repair
    /// endpoint with K=1, and re-evaluate. The allowed-table set never
    /// widens across rounds because the packet is immutable.
    async fn repair_round(
        &self,
        attempt: &mut u32,
        failed: &Candidate,
        packet: &SchemaPacket,
        intent: &QuestionIntent,
        request: &AskRequest,
        audit: &mut RequestAudit,
    ) -> Result<Evaluation, EngineError> {
        let Some(context) = build_repair_context(failed, packet) else {
            return Err(candidate_error(failed));
        };

        *attempt += 1;
        AuditCounters::bump(&self.counters.repairs);

        let repair_request = RepairRequest {
            question: request.question.clone(),
            database_id: self.config.database_id(),
            previous_sql: failed.sql.clone(),
            validator_issues: context.rendered_issues(),
            db_error: context.db_error.clone(),
            attempt: *attempt,
            max_attempts: self.config.max_attempts,
        };

        let stage = Instant::now();
        let output = self.generator.repair_sql(&repair_request).await?;
        audit.stage("repair_generate", stage);

        let stage = Instant::now();
        let evaluation = evaluate_candidates(
            output.all_candidates(),
            packet,
            intent,
            self.executor.as_ref(),
            &self.config,
            *attempt,
        )
        .await;
        audit.stage("repair_evaluate", stage);

        audit.record_attempt(AttemptRecord {
            attempt: *attempt,
            prior_sql: Some(failed.sql.clone()),
            candidate_count: evaluation.candidates.len(),
            best_score: evaluation.candidates.first().map(|c| c.score),
            repair_delta: Some(context.summary()),
            db_error: context
                .db_error
                .as_ref()
                .map(|e| e.sqlstate.clone().unwrap_or_else(|| e.message.clone())),
        });

        Ok(evaluation)
    }

    fn count_failure(&self, err: &EngineError) {
        match err.kind() {
            ErrorKind::ValidationFailFast | ErrorKind::NoRelevantSchema => {
                AuditCounters::bump(&self.counters.refusals);
            }
            _ => AuditCounters::bump(&self.counters.failures),
        }
    }

    fn success_response(
        &self,
        query_id: Uuid,
        success: PipelineSuccess,
        request: &AskRequest,
        audit: &RequestAudit,
    ) -> QueryResponse {
        let mut notes = audit.notes();
        if success.truncated {
            notes.push_str("; result truncated to the row cap");
        }
        QueryResponse {
            query_id,
            sql_generated: success.sql,
            rows: success.rows,
            row_count: success.row_count,
            tables_used: success.tables_used,
            confidence: success.confidence,
            notes: Some(notes),
            executed: true,
            error: None,
            trace: request.trace.then(|| audit.trace_json()),
        }
    }

    fn failure_response(
        &self,
        query_id: Uuid,
        err: &EngineError,
        request: &AskRequest,
        audit: &RequestAudit,
    ) -> QueryResponse {
        QueryResponse {
            query_id,
            sql_generated: String::new(),
            rows: Vec::new(),
            row_count: 0,
            tables_used: Vec::new(),
            confidence: 0.0,
            notes: Some(audit.notes()),
            executed: false,
            error: Some(ResponseError::from(err)),
            trace: request.trace.then(|| audit.trace_json()),
        }
    }
}

/// The classified error a candidate that cannot be repaired surfaces.
fn candidate_error(candidate: &Candidate) -> EngineError {
    if let Some(failure) = &candidate.explain_error {
        return EngineError::Database(failure.clone());
    }
    if let Some(table) = candidate.unknown_tables.first() {
        return EngineError::Database(DbFailure {
            info: askdb_core::DbErrorInfo::new(format!(
                "table \"{table}\" is not in the allowed set"
            )),
            class: askdb_core::DbErrorClass::UndefinedTable,
        });
    }
    EngineError::GenerationFailed("candidate could not be repaired".to_string())
}

fn confidence(score: i32, attempt: u32) -> f64 {
    let base = (f64::from(score) / 100.0).clamp(0.0, 1.0);
    (base - 0.1 * f64::from(attempt.saturating_sub(1))).clamp(0.0, 1.0)
}

fn tables_used(candidate: &Candidate) -> Vec<String> {
    let atoms = tokenizer::code_atoms(&tokenizer::tokenize(&candidate.sql));
    let mut names: Vec<String> = extract_table_refs(&atoms)
        .iter()
        .map(|r| r.bare_name())
        .collect();
    names.sort();
    names.dedup();
    names
}
