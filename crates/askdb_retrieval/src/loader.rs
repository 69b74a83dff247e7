//! Loads the schema index from the persisted introspection tables.
//!
//! Runs once per process on first use; the result is shared read-only.
//! Embedding rows whose fingerprint no longer matches the rendered source
//! text are skipped so a format change cannot serve stale vectors (the
//! offline backfill job re-embeds them).

use askdb_core::{
    DbErrorInfo, DbFailure, EngineError, ForeignKeyEdge, SchemaColumn, SchemaTable,
    is_generic_column,
};
use pgvector::Vector;
use tokio_postgres::Client;

use crate::index::{
    SchemaIndex, SchemaIndexBuilder, column_embed_text, embed_text_fingerprint, table_embed_text,
};

pub async fn load_schema_index(
    client: &Client,
    database_id: &str,
    embedding_model: &str,
) -> Result<SchemaIndex, EngineError> {
    let tables = load_tables(client).await?;
    let columns = load_columns(client).await?;
    let edges = load_edges(client).await?;
    let generic_patterns = load_generic_patterns(client).await?;

    let mut builder = SchemaIndex::builder().embedding_model(embedding_model);

    for table in &tables {
        builder = builder.table(table.clone());
    }
    for mut column in columns.clone() {
        column.is_generic = column.is_generic
            || is_generic_column(&column.column_name)
            || matches_any_pattern(&column.column_name, &generic_patterns);
        builder = builder.column(column);
    }
    for edge in edges {
        builder = builder.edge(edge);
    }

    for row in query(client, "SELECT module_name, keyword FROM module_mapping").await? {
        let module: String = row.get(0);
        let keyword: String = row.get(1);
        builder = builder.module_keywords(&module, &[keyword.as_str()]);
    }

    for row in query(client, "SELECT abbreviation, expansion FROM glossary").await? {
        let abbreviation: String = row.get(0);
        let expansion: String = row.get(1);
        builder = builder.glossary_entry(&abbreviation, &expansion);
    }

    builder = load_embeddings(client, database_id, embedding_model, &tables, &columns, builder)
        .await?;

    let index = builder.build();
    log::info!(
        "schema index loaded: {} tables, {} modules",
        index.len(),
        index.modules().len()
    );
    Ok(index)
}

async fn load_tables(client: &Client) -> Result<Vec<SchemaTable>, EngineError> {
    let rows = query(
        client,
        "SELECT schema_name, table_name, module_tag, gloss, fk_degree, is_hub, fingerprint \
         FROM schema_tables",
    )
    .await?;

    Ok(rows
        .iter()
        .map(|row| SchemaTable {
            schema_name: row.get(0),
            table_name: row.get(1),
            module: row.get(2),
            gloss: row.get(3),
            fk_degree: row.get::<_, i32>(4).max(0) as u32,
            is_hub: row.get(5),
            fingerprint: row.get(6),
        })
        .collect())
}

async fn load_columns(client: &Client) -> Result<Vec<SchemaColumn>, EngineError> {
    let rows = query(
        client,
        "SELECT schema_name, table_name, column_name, data_type, is_nullable, ordinal, \
                is_primary_key, is_foreign_key, fk_target_table, fk_target_column, \
                is_generic, gloss, fingerprint \
         FROM schema_columns",
    )
    .await?;

    Ok(rows
        .iter()
        .map(|row| SchemaColumn {
            schema_name: row.get(0),
            table_name: row.get(1),
            column_name: row.get(2),
            data_type: row.get(3),
            is_nullable: row.get(4),
            ordinal: row.get(5),
            is_primary_key: row.get(6),
            is_foreign_key: row.get(7),
            fk_target_table: row.get(8),
            fk_target_column: row.get(9),
            is_generic: row.get(10),
            gloss: row.get(11),
            fingerprint: row.get(12),
        })
        .collect())
}

async fn load_edges(client: &Client) -> Result<Vec<ForeignKeyEdge>, EngineError> {
    let rows = query(
        client,
        "SELECT from_table, from_column, to_table, to_column, constraint_name FROM schema_fks",
    )
    .await?;

    Ok(rows
        .iter()
        .map(|row| ForeignKeyEdge {
            from_table: row.get(0),
            from_column: row.get(1),
            to_table: row.get(2),
            to_column: row.get(3),
            constraint_name: row.get(4),
        })
        .collect())
}

async fn load_generic_patterns(client: &Client) -> Result<Vec<String>, EngineError> {
    let rows = query(client, "SELECT pattern FROM generic_columns").await?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

async fn load_embeddings(
    client: &Client,
    database_id: &str,
    embedding_model: &str,
    tables: &[SchemaTable],
    columns: &[SchemaColumn],
    mut builder: SchemaIndexBuilder,
) -> Result<SchemaIndexBuilder, EngineError> {
    let rows = client
        .query(
            "SELECT entity_kind, table_name, column_name, vector, fingerprint \
             FROM schema_embeddings \
             WHERE database_id = $1 AND embedding_model_tag = $2",
            &[&database_id, &embedding_model],
        )
        .await
        .map_err(map_db_error)?;

    let mut stale = 0usize;
    for row in rows {
        let entity_kind: String = row.get(0);
        let table_name: String = row.get(1);
        let column_name: Option<String> = row.get(2);
        let vector: Vector = row.get(3);
        let row_fingerprint: String = row.get(4);

        let expected = match (entity_kind.as_str(), &column_name) {
            ("table", _) => tables
                .iter()
                .find(|t| t.table_name == table_name)
                .map(|t| {
                    let table_columns: Vec<SchemaColumn> = columns
                        .iter()
                        .filter(|c| c.table_name == table_name)
                        .cloned()
                        .collect();
                    embed_text_fingerprint(&table_embed_text(t, &table_columns))
                }),
            ("column", Some(column)) => columns
                .iter()
                .find(|c| c.table_name == table_name && &c.column_name == column)
                .map(|c| embed_text_fingerprint(&column_embed_text(c))),
            _ => None,
        };

        let Some(expected) = expected else {
            continue;
        };
        if expected != row_fingerprint {
            stale += 1;
            continue;
        }

        match (entity_kind.as_str(), column_name) {
            ("table", _) => {
                builder = builder.table_vector(&table_name, vector.to_vec());
            }
            ("column", Some(column)) => {
                builder = builder.column_vector(&table_name, &column, vector.to_vec());
            }
            _ => {}
        }
    }

    if stale > 0 {
        log::warn!("skipped {stale} stale embedding rows pending re-embedding");
    }
    Ok(builder)
}

/// LIKE-lite matching for the persisted generic-column patterns.
fn matches_any_pattern(column_name: &str, patterns: &[String]) -> bool {
    let name = column_name.to_lowercase();
    patterns.iter().any(|pattern| {
        let p = pattern.to_lowercase();
        match (p.strip_prefix('%'), p.strip_suffix('%')) {
            (Some(suffix), None) => name.ends_with(suffix),
            (None, Some(prefix)) => name.starts_with(prefix),
            (Some(_), Some(_)) => {
                let inner = p.trim_matches('%');
                name.contains(inner)
            }
            (None, None) => name == p,
        }
    })
}

async fn query(
    client: &Client,
    sql: &str,
) -> Result<Vec<tokio_postgres::Row>, EngineError> {
    client.query(sql, &[]).await.map_err(map_db_error)
}

fn map_db_error(err: tokio_postgres::Error) -> EngineError {
    let info = match err.as_db_error() {
        Some(db) => DbErrorInfo::new(db.message()).with_sqlstate(db.code().code()),
        None => DbErrorInfo::new(err.to_string()),
    };
    EngineError::Database(DbFailure::new(info))
}
