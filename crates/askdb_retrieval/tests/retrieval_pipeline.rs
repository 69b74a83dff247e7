use std::sync::Arc;

use askdb_core::{Embedder, EngineError, ForeignKeyEdge, SchemaColumn, SchemaTable};
use askdb_retrieval::{RetrievalConfig, SchemaIndex, SchemaRetriever};
use async_trait::async_trait;

/// Embedder that maps known phrases to fixed vectors; everything else gets
/// a vector orthogonal to the whole index.
struct PhraseEmbedder;

#[async_trait]
impl Embedder for PhraseEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                if lower.contains("revenue") || lower.contains("company") {
                    vec![1.0, 0.0, 0.0]
                } else if lower.contains("employee") || lower.contains("salary") {
                    vec![0.0, 1.0, 0.0]
                } else {
                    vec![0.0, 0.0, 1.0]
                }
            })
            .collect())
    }
}

struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Err(EngineError::RetrievalUnavailable("connection refused".into()))
    }
}

fn table(name: &str, module: &str, fk_degree: u32) -> SchemaTable {
    SchemaTable {
        schema_name: "public".to_string(),
        table_name: name.to_string(),
        module: module.to_string(),
        gloss: None,
        fk_degree,
        is_hub: fk_degree >= 4,
        fingerprint: String::new(),
    }
}

fn column(table: &str, name: &str, data_type: &str, generic: bool) -> SchemaColumn {
    SchemaColumn {
        schema_name: "public".to_string(),
        table_name: table.to_string(),
        column_name: name.to_string(),
        data_type: data_type.to_string(),
        is_nullable: true,
        ordinal: 0,
        is_primary_key: false,
        is_foreign_key: false,
        fk_target_table: None,
        fk_target_column: None,
        is_generic: generic,
        gloss: None,
        fingerprint: String::new(),
    }
}

fn build_index() -> SchemaIndex {
    SchemaIndex::builder()
        .table(table("companies", "finance", 2))
        .table(table("company_revenue_annual", "finance", 1))
        .table(table("employees", "hr", 1))
        .column(column("companies", "id", "bigint", true))
        .column(column("companies", "name", "text", true))
        .column(column("companies", "founded_year", "integer", false))
        .column(column("company_revenue_annual", "company_id", "bigint", true))
        .column(column("company_revenue_annual", "year", "integer", false))
        .column(column("company_revenue_annual", "revenue", "numeric", false))
        .column(column("employees", "salary", "numeric", false))
        .edge(ForeignKeyEdge {
            from_table: "company_revenue_annual".to_string(),
            from_column: "company_id".to_string(),
            to_table: "companies".to_string(),
            to_column: "id".to_string(),
            constraint_name: "revenue_company_fk".to_string(),
        })
        .table_vector("companies", vec![1.0, 0.0, 0.0])
        .table_vector("company_revenue_annual", vec![0.9, 0.1, 0.0])
        .table_vector("employees", vec![0.0, 1.0, 0.0])
        .column_vector("company_revenue_annual", "revenue", vec![1.0, 0.0, 0.0])
        .column_vector("employees", "salary", vec![0.0, 1.0, 0.0])
        .module_keywords("finance", &["revenue", "company", "profit"])
        .module_keywords("hr", &["employee", "salary"])
        .glossary_entry("rev", "revenue")
        .build()
}

fn retriever(top_n: usize) -> SchemaRetriever {
    SchemaRetriever::new(
        Arc::new(build_index()),
        Arc::new(PhraseEmbedder),
        RetrievalConfig {
            top_n,
            min_score_floor: 0.18,
            allowed_modules: Vec::new(),
        },
    )
}

#[tokio::test]
async fn selects_finance_tables_for_revenue_question() {
    let packet = retriever(8)
        .retrieve("Top company by revenue in 2020")
        .await
        .unwrap();

    let names = packet.table_names();
    assert!(names.contains(&"companies".to_string()));
    assert!(names.contains(&"company_revenue_annual".to_string()));
    assert!(!names.contains(&"employees".to_string()));
    assert_eq!(packet.modules, vec!["finance"]);
    assert_eq!(packet.edges.len(), 1);
}

#[tokio::test]
async fn glossary_expansion_reaches_the_same_tables() {
    let packet = retriever(8).retrieve("total rev for Widget Co").await.unwrap();
    assert!(
        packet
            .table_names()
            .contains(&"company_revenue_annual".to_string())
    );
}

#[tokio::test]
async fn unrelated_question_is_refused() {
    let err = retriever(8)
        .retrieve("what is the meaning of life")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoRelevantSchema));
}

#[tokio::test]
async fn embedder_outage_is_retrieval_unavailable() {
    let retriever = SchemaRetriever::new(
        Arc::new(build_index()),
        Arc::new(DownEmbedder),
        RetrievalConfig {
            top_n: 8,
            min_score_floor: 0.18,
            allowed_modules: Vec::new(),
        },
    );
    let err = retriever.retrieve("company revenue").await.unwrap_err();
    assert!(matches!(err, EngineError::RetrievalUnavailable(_)));
}

#[tokio::test]
async fn retrieval_is_deterministic() {
    let question = "company revenue by year";
    let a = retriever(8).retrieve(question).await.unwrap();
    let b = retriever(8).retrieve(question).await.unwrap();
    assert_eq!(a.table_names(), b.table_names());
    assert_eq!(a.modules, b.modules);
}

#[tokio::test]
async fn top_n_caps_the_packet() {
    let packet = retriever(1).retrieve("company revenue").await.unwrap();
    assert_eq!(packet.tables.len(), 1);
}

#[tokio::test]
async fn fk_expansion_pulls_neighbor_with_matched_column() {
    // companies has no embedding, so it can only join the packet through the
    // FK edge from company_revenue_annual plus a lexical column match.
    let index = SchemaIndex::builder()
        .table(table("companies", "finance", 2))
        .table(table("company_revenue_annual", "finance", 1))
        .column(column("companies", "founded_year", "integer", false))
        .column(column("company_revenue_annual", "revenue", "numeric", false))
        .edge(ForeignKeyEdge {
            from_table: "company_revenue_annual".to_string(),
            from_column: "company_id".to_string(),
            to_table: "companies".to_string(),
            to_column: "id".to_string(),
            constraint_name: "revenue_company_fk".to_string(),
        })
        .table_vector("company_revenue_annual", vec![1.0, 0.0, 0.0])
        .module_keywords("finance", &["revenue"])
        .build();

    let retriever = SchemaRetriever::new(
        Arc::new(index),
        Arc::new(PhraseEmbedder),
        RetrievalConfig {
            top_n: 8,
            min_score_floor: 0.18,
            allowed_modules: Vec::new(),
        },
    );

    let packet = retriever
        .retrieve("revenue growth since founded year")
        .await
        .unwrap();
    let names = packet.table_names();
    assert!(names.contains(&"company_revenue_annual".to_string()));
    assert!(names.contains(&"companies".to_string()));
}

#[tokio::test]
async fn packet_ddl_mentions_fk_targets() {
    let packet = retriever(8).retrieve("company revenue").await.unwrap();
    let context = packet.schema_context();
    assert!(context.contains("TABLE public.companies"));
    assert!(context.contains("company_revenue_annual.company_id -> companies.id"));
}
