//! Wires the engine together from configuration.
//!
//! The schema index load is the expensive step; `EngineState` is built
//! lazily on the first tool call so that starting the server does not
//! require the database to be up yet.

use std::sync::Arc;

use askdb_core::{EngineConfig, EngineError, GenerationService, QueryExecutor};
use askdb_engine::Orchestrator;
use askdb_executor::PgExecutor;
use askdb_llm::HttpGenerationClient;
use askdb_retrieval::{RetrievalConfig, SchemaRetriever, load_schema_index};

/// Everything a tool call needs, shared behind `Arc`s.
pub struct EngineState {
    pub orchestrator: Arc<Orchestrator>,
    pub retriever: Arc<SchemaRetriever>,
    pub executor: Arc<dyn QueryExecutor>,
}

impl EngineState {
    /// Connect to the live collaborators and load the schema index once.
    pub async fn connect(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let client = Arc::new(HttpGenerationClient::new(
            &config.generation_url,
            config.call_timeout_ms,
        )?);
        let executor = Arc::new(PgExecutor::new(&config));

        let index = {
            let lease = executor.pool().lease().await?;
            load_schema_index(&lease, &config.database_id(), &config.embedding_model).await?
        };

        let retriever = Arc::new(SchemaRetriever::new(
            Arc::new(index),
            client.clone(),
            RetrievalConfig::from_engine(&config),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            config,
            Arc::clone(&retriever),
            client,
            Arc::clone(&executor) as Arc<dyn QueryExecutor>,
        ));

        Ok(Self {
            orchestrator,
            retriever,
            executor,
        })
    }

    /// Assemble from pre-built parts; used by the test suites to substitute
    /// deterministic fakes.
    pub fn from_parts(
        config: EngineConfig,
        retriever: Arc<SchemaRetriever>,
        generator: Arc<dyn GenerationService>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            Arc::clone(&retriever),
            generator,
            Arc::clone(&executor),
        ));
        Self {
            orchestrator,
            retriever,
            executor,
        }
    }
}
