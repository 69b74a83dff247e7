//! K-parallel candidate generation with deduplication.

use askdb_core::{EngineError, GenerateRequest, GenerationService, normalize_sql};
use futures::future::join_all;

/// Temperature schedule across the fan-out. The very first call of the
/// first attempt runs deterministic; later calls spread out for diversity.
pub fn temperature_for(attempt: u32, call_index: u32) -> f64 {
    if attempt <= 1 && call_index == 0 {
        0.0
    } else {
        (0.6 + 0.15 * f64::from(call_index)).min(1.0)
    }
}

/// Issue `k` concurrent generation calls and return the deduplicated
/// candidates in call order. Partial failures are tolerated; only a fully
/// failed fan-out is an error.
pub async fn generate_candidates(
    service: &dyn GenerationService,
    template: &GenerateRequest,
    k: u32,
) -> Result<Vec<String>, EngineError> {
    let attempt = template.attempt.unwrap_or(1);

    let calls = (0..k.max(1)).map(|i| {
        let request = GenerateRequest {
            temperature: Some(temperature_for(attempt, i)),
            ..template.clone()
        };
        async move { service.generate_sql(&request).await }
    });

    let outcomes = join_all(calls).await;

    let mut candidates: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let mut last_error: Option<EngineError> = None;
    let mut failures = 0usize;

    for outcome in outcomes {
        match outcome {
            Ok(output) => {
                for sql in output.all_candidates() {
                    let normalized = normalize_sql(&sql);
                    if normalized.is_empty() || seen.contains(&normalized) {
                        continue;
                    }
                    seen.push(normalized);
                    candidates.push(sql);
                }
            }
            Err(err) => {
                failures += 1;
                last_error = Some(err);
            }
        }
    }

    if candidates.is_empty() {
        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no candidate returned".to_string());
        return Err(EngineError::GenerationFailed(detail));
    }

    if failures > 0 {
        log::warn!("{failures} of {k} generation calls failed; continuing with partial results");
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_core::{GenerationOutput, RepairRequest};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedService {
        responses: Mutex<Vec<Result<GenerationOutput, EngineError>>>,
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        async fn generate_sql(
            &self,
            _request: &GenerateRequest,
        ) -> Result<GenerationOutput, EngineError> {
            self.responses
                .lock()
                .unwrap()
                .remove(0)
        }

        async fn repair_sql(
            &self,
            _request: &RepairRequest,
        ) -> Result<GenerationOutput, EngineError> {
            unreachable!("fan-out never repairs")
        }
    }

    fn output(sql: &str) -> Result<GenerationOutput, EngineError> {
        Ok(GenerationOutput {
            sql_generated: sql.to_string(),
            ..Default::default()
        })
    }

    fn template() -> GenerateRequest {
        GenerateRequest {
            question: "q".to_string(),
            database_id: "db".to_string(),
            schema_context: String::new(),
            multi_candidate_k: None,
            attempt: Some(1),
            temperature: None,
        }
    }

    #[tokio::test]
    async fn dedups_by_normalized_sql() {
        let service = ScriptedService {
            responses: Mutex::new(vec![
                output("SELECT * FROM t LIMIT 1"),
                output("select  *  from T limit 1"),
                output("SELECT id FROM t LIMIT 1"),
            ]),
        };
        let candidates = generate_candidates(&service, &template(), 3).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], "SELECT * FROM t LIMIT 1");
    }

    #[tokio::test]
    async fn partial_failure_is_tolerated() {
        let service = ScriptedService {
            responses: Mutex::new(vec![
                Err(EngineError::GenerationFailed("boom".to_string())),
                output("SELECT 1 LIMIT 1"),
            ]),
        };
        let candidates = generate_candidates(&service, &template(), 2).await.unwrap();
        assert_eq!(candidates, vec!["SELECT 1 LIMIT 1"]);
    }

    #[tokio::test]
    async fn total_failure_is_an_error() {
        let service = ScriptedService {
            responses: Mutex::new(vec![
                Err(EngineError::GenerationFailed("a".to_string())),
                Err(EngineError::GenerationFailed("b".to_string())),
            ]),
        };
        let err = generate_candidates(&service, &template(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::GenerationFailed(_)));
    }

    #[test]
    fn first_call_of_first_attempt_is_deterministic() {
        assert_eq!(temperature_for(1, 0), 0.0);
        assert!(temperature_for(1, 1) > 0.0);
        assert!(temperature_for(2, 0) > 0.0);
    }
}
