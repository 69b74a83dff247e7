//! Candidate scoring and ranking.
//!
//! Each deduplicated candidate runs through autocorrect, structural
//! validation, lint, and a concurrent EXPLAIN probe; the ranking is fully
//! deterministic given identical inputs.

use askdb_core::{
    DbFailure, EngineConfig, EngineError, LintReport, QueryExecutor, QuestionIntent, SchemaPacket,
    ValidateOptions, analyze_shape, autocorrect, lint, normalize_sql, validate,
};
use futures::future::join_all;

const BASE_SCORE: i32 = 100;
const LINT_PENALTY: i32 = 25;
const EXPLAIN_PENALTY: i32 = 50;
const GROUP_BY_BONUS: i32 = 10;
const ORDER_LIMIT_BONUS: i32 = 10;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub sql: String,
    pub normalized: String,
    pub lint: LintReport,
    /// Tables referenced but missing from the packet; non-empty means the
    /// candidate must go back to the generator.
    pub unknown_tables: Vec<String>,
    pub explain_error: Option<DbFailure>,
    pub probed: bool,
    pub score: i32,
    pub source_attempt: u32,
}

impl Candidate {
    pub fn passed_explain(&self) -> bool {
        self.probed && self.explain_error.is_none()
    }

    pub fn executable(&self) -> bool {
        self.unknown_tables.is_empty()
    }
}

/// Ranked candidates plus the selection decision.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub candidates: Vec<Candidate>,
    /// Highest-ranked candidate that passed EXPLAIN.
    pub winner: Option<usize>,
    /// Highest-ranked candidate to repair from when nothing passed.
    pub fallback: Option<usize>,
    /// Every raw candidate violated a fail-fast rule.
    pub all_refused: bool,
}

pub async fn evaluate_candidates(
    raw_candidates: Vec<String>,
    packet: &SchemaPacket,
    intent: &QuestionIntent,
    executor: &dyn QueryExecutor,
    config: &EngineConfig,
    source_attempt: u32,
) -> Evaluation {
    let allowed = packet.allowed_tables();
    let options = ValidateOptions {
        allowed_tables: Some(&allowed),
        default_limit: config.default_max_rows,
        limit_ceiling: config.max_rows_ceiling,
        function_blocklist: &config.function_blocklist,
    };

    let total = raw_candidates.len();
    let mut candidates: Vec<Candidate> = Vec::new();
    for sql in raw_candidates {
        let sql = autocorrect(&sql).unwrap_or(sql);
        let validation = validate(&sql, &options);

        if let Some(violation) = validation.fail_fast() {
            log::debug!("candidate dropped: {}", violation.message);
            continue;
        }

        let report = lint(&validation.sql, intent);
        candidates.push(Candidate {
            normalized: normalize_sql(&validation.sql),
            unknown_tables: validation
                .unknown_tables()
                .into_iter()
                .map(String::from)
                .collect(),
            sql: validation.sql,
            lint: report,
            explain_error: None,
            probed: false,
            score: 0,
            source_attempt,
        });
    }

    if candidates.is_empty() {
        return Evaluation {
            all_refused: total > 0,
            ..Default::default()
        };
    }

    probe_concurrently(&mut candidates, executor).await;

    for candidate in &mut candidates {
        candidate.score = score(candidate, intent);
    }

    rank(&mut candidates);

    let winner = candidates
        .iter()
        .position(|c| c.executable() && c.passed_explain());
    let fallback = candidates.iter().position(|c| !c.passed_explain() || !c.executable());

    Evaluation {
        winner,
        fallback: if winner.is_none() { fallback } else { None },
        candidates,
        all_refused: false,
    }
}

/// Probe every executable candidate in parallel with the short timeout.
async fn probe_concurrently(candidates: &mut [Candidate], executor: &dyn QueryExecutor) {
    let probes = candidates.iter().map(|candidate| {
        let eligible = candidate.executable();
        let sql = candidate.sql.clone();
        async move {
            if !eligible {
                return None;
            }
            Some(executor.probe(&sql).await)
        }
    });

    let outcomes = join_all(probes).await;
    for (candidate, outcome) in candidates.iter_mut().zip(outcomes) {
        match outcome {
            None => {}
            Some(Ok(_plan)) => {
                candidate.probed = true;
            }
            Some(Err(err)) => {
                candidate.probed = true;
                candidate.explain_error = match err {
                    EngineError::Database(failure) => Some(failure),
                    other => Some(DbFailure::new(askdb_core::DbErrorInfo::new(
                        other.to_string(),
                    ))),
                };
            }
        }
    }
}

fn score(candidate: &Candidate, intent: &QuestionIntent) -> i32 {
    let shape = analyze_shape(&candidate.sql);
    let mut score = BASE_SCORE;
    score -= LINT_PENALTY * candidate.lint.error_count() as i32;
    if candidate.probed && candidate.explain_error.is_some() {
        score -= EXPLAIN_PENALTY;
    }
    if intent.grouping && shape.has_group_by {
        score += GROUP_BY_BONUS;
    }
    if intent.superlative && shape.has_order_by && shape.has_limit {
        score += ORDER_LIMIT_BONUS;
    }
    score
}

/// Score desc; ties by fewer lint errors, shorter SQL, lexical order.
fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.lint.error_count().cmp(&b.lint.error_count()))
            .then_with(|| a.sql.len().cmp(&b.sql.len()))
            .then_with(|| a.sql.cmp(&b.sql))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_core::{
        DbErrorInfo, ExecutedQuery, PacketTable, SchemaTable, classify_question,
    };
    use async_trait::async_trait;

    struct StubExecutor {
        failing_fragment: Option<String>,
    }

    #[async_trait]
    impl QueryExecutor for StubExecutor {
        async fn probe(&self, sql: &str) -> Result<serde_json::Value, EngineError> {
            if let Some(fragment) = &self.failing_fragment
                && sql.contains(fragment.as_str())
            {
                return Err(EngineError::Database(DbFailure::new(
                    DbErrorInfo::new("column c.company_name does not exist")
                        .with_sqlstate("42703"),
                )));
            }
            Ok(serde_json::json!([{"Plan": {}}]))
        }

        async fn execute(&self, _sql: &str, _max_rows: u32) -> Result<ExecutedQuery, EngineError> {
            Ok(ExecutedQuery::default())
        }
    }

    fn packet(names: &[&str]) -> SchemaPacket {
        SchemaPacket {
            tables: names
                .iter()
                .map(|name| PacketTable {
                    table: SchemaTable {
                        schema_name: "public".to_string(),
                        table_name: name.to_string(),
                        module: "m".to_string(),
                        gloss: None,
                        fk_degree: 0,
                        is_hub: false,
                        fingerprint: String::new(),
                    },
                    columns: Vec::new(),
                    compact_ddl: String::new(),
                    score: 1.0,
                })
                .collect(),
            modules: Vec::new(),
            edges: Vec::new(),
        }
    }

    #[tokio::test]
    async fn winner_is_the_best_probed_candidate() {
        let intent = classify_question("how many accounts");
        let evaluation = evaluate_candidates(
            vec![
                "SELECT COUNT(*) FROM accounts LIMIT 1".to_string(),
                "SELECT * FROM accounts".to_string(),
            ],
            &packet(&["accounts"]),
            &intent,
            &StubExecutor {
                failing_fragment: None,
            },
            &EngineConfig::default(),
            1,
        )
        .await;

        let winner = evaluation.winner.expect("a winner");
        assert!(evaluation.candidates[winner].passed_explain());
    }

    #[tokio::test]
    async fn fail_fast_candidates_are_dropped() {
        let intent = QuestionIntent::default();
        let evaluation = evaluate_candidates(
            vec!["DROP TABLE accounts".to_string()],
            &packet(&["accounts"]),
            &intent,
            &StubExecutor {
                failing_fragment: None,
            },
            &EngineConfig::default(),
            1,
        )
        .await;
        assert!(evaluation.candidates.is_empty());
        assert!(evaluation.all_refused);
    }

    #[tokio::test]
    async fn explain_failure_drops_the_score_and_sets_fallback() {
        let intent = QuestionIntent::default();
        let evaluation = evaluate_candidates(
            vec!["SELECT c.company_name FROM companies c LIMIT 5".to_string()],
            &packet(&["companies"]),
            &intent,
            &StubExecutor {
                failing_fragment: Some("company_name".to_string()),
            },
            &EngineConfig::default(),
            1,
        )
        .await;

        assert!(evaluation.winner.is_none());
        let fallback = evaluation.fallback.expect("fallback");
        let candidate = &evaluation.candidates[fallback];
        assert!(candidate.explain_error.is_some());
        assert!(candidate.score <= 50);
    }

    #[tokio::test]
    async fn unknown_table_candidate_is_kept_but_not_executable() {
        let intent = QuestionIntent::default();
        let evaluation = evaluate_candidates(
            vec!["SELECT * FROM acounts LIMIT 5".to_string()],
            &packet(&["accounts"]),
            &intent,
            &StubExecutor {
                failing_fragment: None,
            },
            &EngineConfig::default(),
            1,
        )
        .await;

        assert!(evaluation.winner.is_none());
        let fallback = evaluation.fallback.expect("fallback");
        assert_eq!(
            evaluation.candidates[fallback].unknown_tables,
            vec!["acounts"]
        );
    }

    #[tokio::test]
    async fn superlative_bonus_prefers_ordered_candidates() {
        let intent = classify_question("top company by revenue");
        let evaluation = evaluate_candidates(
            vec![
                "SELECT name FROM companies LIMIT 1".to_string(),
                "SELECT name FROM companies ORDER BY revenue DESC LIMIT 1".to_string(),
            ],
            &packet(&["companies"]),
            &intent,
            &StubExecutor {
                failing_fragment: None,
            },
            &EngineConfig::default(),
            1,
        )
        .await;

        let winner = evaluation.winner.unwrap();
        assert!(evaluation.candidates[winner].sql.contains("ORDER BY"));
    }
}
