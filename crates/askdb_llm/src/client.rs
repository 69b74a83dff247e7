//! HTTP client for the generation and embedding service.

use std::time::Duration;

use askdb_core::{
    Embedder, EngineError, GenerateRequest, GenerationOutput, GenerationService, RepairRequest,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub struct HttpGenerationClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGenerationClient {
    pub fn new(base_url: &str, call_timeout_ms: u64) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(call_timeout_ms))
            .build()
            .map_err(|e| EngineError::config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("{path}: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("{path}: HTTP {status}: {text}"));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| format!("{path}: malformed response: {e}"))
    }
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    vectors: Vec<Vec<f32>>,
}

#[async_trait]
impl GenerationService for HttpGenerationClient {
    async fn generate_sql(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerationOutput, EngineError> {
        self.post("/generate_sql", request)
            .await
            .map_err(EngineError::GenerationFailed)
    }

    async fn repair_sql(&self, request: &RepairRequest) -> Result<GenerationOutput, EngineError> {
        self.post("/repair_sql", request)
            .await
            .map_err(EngineError::GenerationFailed)
    }
}

#[async_trait]
impl Embedder for HttpGenerationClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        let response: EmbedResponse = self
            .post("/embed", &EmbedBody { texts })
            .await
            .map_err(EngineError::RetrievalUnavailable)?;

        if response.vectors.len() != texts.len() {
            return Err(EngineError::RetrievalUnavailable(format!(
                "embedding count mismatch: sent {}, got {}",
                texts.len(),
                response.vectors.len()
            )));
        }
        Ok(response.vectors)
    }
}
