//! Per-request audit trail and process-wide counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde_json::json;
use uuid::Uuid;

/// Lock-free process totals; never touched on the per-candidate hot path.
#[derive(Debug, Default)]
pub struct AuditCounters {
    pub requests: AtomicU64,
    pub refusals: AtomicU64,
    pub repairs: AtomicU64,
    pub failures: AtomicU64,
}

impl AuditCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.requests.load(Ordering::Relaxed),
            self.refusals.load(Ordering::Relaxed),
            self.repairs.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }
}

/// One generation-evaluation round.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub prior_sql: Option<String>,
    pub candidate_count: usize,
    pub best_score: Option<i32>,
    pub repair_delta: Option<String>,
    pub db_error: Option<String>,
}

/// Accumulates stage timings and attempts for one request; rendered into
/// the `notes` field, the optional trace payload, and one audit log line.
pub struct RequestAudit {
    pub request_id: Uuid,
    started: Instant,
    stages: Vec<(&'static str, u64)>,
    attempts: Vec<AttemptRecord>,
}

impl RequestAudit {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            started: Instant::now(),
            stages: Vec::new(),
            attempts: Vec::new(),
        }
    }

    pub fn stage(&mut self, name: &'static str, since: Instant) {
        self.stages.push((name, since.elapsed().as_millis() as u64));
    }

    pub fn record_attempt(&mut self, record: AttemptRecord) {
        self.attempts.push(record);
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Human-readable summary: how many attempts ran and which repair
    /// deltas were applied.
    pub fn notes(&self) -> String {
        if self.attempts.is_empty() {
            return "no generation attempts".to_string();
        }
        let deltas: Vec<&str> = self
            .attempts
            .iter()
            .filter_map(|a| a.repair_delta.as_deref())
            .collect();
        if deltas.is_empty() {
            format!("{} attempt(s), no repairs", self.attempts.len())
        } else {
            format!(
                "{} attempt(s); repairs applied: {}",
                self.attempts.len(),
                deltas.join("; ")
            )
        }
    }

    pub fn trace_json(&self) -> serde_json::Value {
        json!({
            "request_id": self.request_id,
            "total_ms": self.started.elapsed().as_millis() as u64,
            "stages": self
                .stages
                .iter()
                .map(|(name, ms)| json!({"stage": name, "ms": ms}))
                .collect::<Vec<_>>(),
            "attempts": self
                .attempts
                .iter()
                .map(|a| json!({
                    "attempt": a.attempt,
                    "candidates": a.candidate_count,
                    "best_score": a.best_score,
                    "repair_delta": a.repair_delta,
                    "db_error": a.db_error,
                }))
                .collect::<Vec<_>>(),
        })
    }

    pub fn log_completion(&self, outcome: &str) {
        log::info!(
            "request {} finished: outcome={} attempts={} stages={:?} total_ms={}",
            self.request_id,
            outcome,
            self.attempts.len(),
            self.stages,
            self.started.elapsed().as_millis()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_mention_repair_deltas() {
        let mut audit = RequestAudit::new(Uuid::new_v4());
        audit.record_attempt(AttemptRecord {
            attempt: 1,
            prior_sql: None,
            candidate_count: 4,
            best_score: Some(100),
            repair_delta: None,
            db_error: None,
        });
        audit.record_attempt(AttemptRecord {
            attempt: 2,
            prior_sql: Some("SELECT 1".to_string()),
            candidate_count: 1,
            best_score: Some(90),
            repair_delta: Some("column_whitelist:companies".to_string()),
            db_error: Some("42703".to_string()),
        });

        let notes = audit.notes();
        assert!(notes.contains("2 attempt(s)"));
        assert!(notes.contains("column_whitelist:companies"));
    }

    #[test]
    fn counters_accumulate() {
        let counters = AuditCounters::default();
        AuditCounters::bump(&counters.requests);
        AuditCounters::bump(&counters.requests);
        AuditCounters::bump(&counters.failures);
        assert_eq!(counters.snapshot(), (2, 0, 0, 1));
    }
}
