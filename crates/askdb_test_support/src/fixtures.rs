//! A small demo schema shared by the integration suites: a `core` module
//! with a plain `accounts` table and a `finance` module with companies and
//! their yearly revenue.

use std::sync::Arc;

use askdb_core::{ForeignKeyEdge, SchemaColumn, SchemaTable};
use askdb_retrieval::{RetrievalConfig, SchemaIndex, SchemaRetriever};

use crate::fake_embedder::KeywordEmbedder;

pub fn table(name: &str, module: &str, gloss: &str, fk_degree: u32) -> SchemaTable {
    SchemaTable {
        schema_name: "public".to_string(),
        table_name: name.to_string(),
        module: module.to_string(),
        gloss: Some(gloss.to_string()),
        fk_degree,
        is_hub: fk_degree >= 4,
        fingerprint: String::new(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn column(
    table: &str,
    name: &str,
    data_type: &str,
    ordinal: i32,
    primary: bool,
    fk_target: Option<(&str, &str)>,
    generic: bool,
) -> SchemaColumn {
    SchemaColumn {
        schema_name: "public".to_string(),
        table_name: table.to_string(),
        column_name: name.to_string(),
        data_type: data_type.to_string(),
        is_nullable: !primary,
        ordinal,
        is_primary_key: primary,
        is_foreign_key: fk_target.is_some(),
        fk_target_table: fk_target.map(|(t, _)| t.to_string()),
        fk_target_column: fk_target.map(|(_, c)| c.to_string()),
        is_generic: generic,
        gloss: None,
        fingerprint: String::new(),
    }
}

pub fn demo_index() -> SchemaIndex {
    SchemaIndex::builder()
        .table(table("accounts", "core", "user accounts", 0))
        .table(table("companies", "finance", "registered companies", 1))
        .table(table(
            "company_revenue_annual",
            "finance",
            "yearly revenue per company",
            1,
        ))
        .column(column("accounts", "id", "bigint", 1, true, None, true))
        .column(column("accounts", "email", "text", 2, false, None, false))
        .column(column(
            "accounts",
            "created_at",
            "timestamptz",
            3,
            false,
            None,
            true,
        ))
        .column(column("companies", "id", "bigint", 1, true, None, true))
        .column(column("companies", "name", "text", 2, false, None, true))
        .column(column(
            "companies",
            "founded_year",
            "integer",
            3,
            false,
            None,
            false,
        ))
        .column(column("companies", "ticker", "text", 4, false, None, false))
        .column(column(
            "company_revenue_annual",
            "company_id",
            "bigint",
            1,
            false,
            Some(("companies", "id")),
            true,
        ))
        .column(column(
            "company_revenue_annual",
            "year",
            "integer",
            2,
            false,
            None,
            false,
        ))
        .column(column(
            "company_revenue_annual",
            "revenue",
            "numeric",
            3,
            false,
            None,
            false,
        ))
        .edge(ForeignKeyEdge {
            from_table: "company_revenue_annual".to_string(),
            from_column: "company_id".to_string(),
            to_table: "companies".to_string(),
            to_column: "id".to_string(),
            constraint_name: "company_revenue_annual_company_fk".to_string(),
        })
        .table_vector("accounts", vec![1.0, 0.0, 0.0])
        .table_vector("companies", vec![0.0, 1.0, 0.0])
        .table_vector("company_revenue_annual", vec![0.0, 0.6, 0.8])
        .column_vector("company_revenue_annual", "revenue", vec![0.0, 0.3, 0.95])
        .column_vector("companies", "founded_year", vec![0.0, 0.9, 0.3])
        .module_keywords("core", &["account", "user", "record"])
        .module_keywords("finance", &["company", "revenue", "growth"])
        .glossary_entry("rev", "revenue")
        .build()
}

/// Embedder aligned with the demo vectors: questions about accounts land on
/// axis 0, companies on axis 1, revenue between axes 1 and 2.
pub fn demo_embedder() -> KeywordEmbedder {
    KeywordEmbedder::new(
        vec![
            ("revenue", vec![0.0, 0.5, 0.86]),
            ("account", vec![1.0, 0.0, 0.0]),
            ("compan", vec![0.0, 1.0, 0.0]),
        ],
        vec![0.0, 0.0, 0.0],
    )
}

pub fn demo_retriever() -> Arc<SchemaRetriever> {
    Arc::new(SchemaRetriever::new(
        Arc::new(demo_index()),
        Arc::new(demo_embedder()),
        RetrievalConfig {
            top_n: 8,
            min_score_floor: 0.18,
            allowed_modules: Vec::new(),
        },
    ))
}
