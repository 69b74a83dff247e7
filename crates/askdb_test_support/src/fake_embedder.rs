use askdb_core::{Embedder, EngineError};
use async_trait::async_trait;

/// Embedder mapping keywords to fixed vectors. The first rule whose keyword
/// occurs in the text wins; unmatched texts get the default vector.
pub struct KeywordEmbedder {
    rules: Vec<(String, Vec<f32>)>,
    default: Vec<f32>,
    fail: bool,
}

impl KeywordEmbedder {
    pub fn new(rules: Vec<(&str, Vec<f32>)>, default: Vec<f32>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            default,
            fail: false,
        }
    }

    /// An embedder that refuses every call, simulating an outage.
    pub fn unavailable() -> Self {
        Self {
            rules: Vec::new(),
            default: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        if self.fail {
            return Err(EngineError::RetrievalUnavailable(
                "embedding service unreachable".to_string(),
            ));
        }
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                self.rules
                    .iter()
                    .find(|(keyword, _)| lower.contains(keyword.as_str()))
                    .map(|(_, vector)| vector.clone())
                    .unwrap_or_else(|| self.default.clone())
            })
            .collect())
    }
}
