//! Process-wide schema index.
//!
//! Loaded once from the persisted introspection tables and read-only during
//! request processing. Tests assemble one with the builder instead of a
//! database.

use std::collections::HashMap;

use askdb_core::{ForeignKeyEdge, SchemaColumn, SchemaTable, fingerprint};

/// A module with its routing vocabulary and embedding centroid.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub keywords: Vec<String>,
    /// Mean of the member tables' embedding vectors; empty when no member
    /// has a vector.
    pub centroid: Vec<f32>,
}

#[derive(Debug, Default)]
pub struct SchemaIndex {
    tables: Vec<SchemaTable>,
    columns: HashMap<String, Vec<SchemaColumn>>,
    edges: Vec<ForeignKeyEdge>,
    modules: Vec<ModuleInfo>,
    glossary: Vec<(String, String)>,
    table_vectors: HashMap<String, Vec<f32>>,
    column_vectors: HashMap<(String, String), Vec<f32>>,
    embedding_model: String,
}

impl SchemaIndex {
    pub fn builder() -> SchemaIndexBuilder {
        SchemaIndexBuilder::default()
    }

    pub fn tables(&self) -> &[SchemaTable] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&SchemaTable> {
        let needle = name.to_lowercase();
        self.tables
            .iter()
            .find(|t| t.table_name.to_lowercase() == needle)
    }

    pub fn columns(&self, table: &str) -> &[SchemaColumn] {
        self.columns
            .get(&table.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn edges(&self) -> &[ForeignKeyEdge] {
        &self.edges
    }

    /// Neighbor table names over the FK graph, treated as undirected.
    pub fn neighbors(&self, table: &str) -> Vec<&str> {
        let needle = table.to_lowercase();
        let mut names: Vec<&str> = Vec::new();
        for edge in &self.edges {
            if edge.from_table.to_lowercase() == needle {
                names.push(edge.to_table.as_str());
            } else if edge.to_table.to_lowercase() == needle {
                names.push(edge.from_table.as_str());
            }
        }
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    pub fn glossary(&self) -> &[(String, String)] {
        &self.glossary
    }

    pub fn table_vector(&self, table: &str) -> Option<&[f32]> {
        self.table_vectors
            .get(&table.to_lowercase())
            .map(Vec::as_slice)
    }

    pub fn column_vector(&self, table: &str, column: &str) -> Option<&[f32]> {
        self.column_vectors
            .get(&(table.to_lowercase(), column.to_lowercase()))
            .map(Vec::as_slice)
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }
}

/// Text embedded for a table row. The fingerprint of an embedding covers
/// this exact rendering, so a format change invalidates stale rows.
pub fn table_embed_text(table: &SchemaTable, columns: &[SchemaColumn]) -> String {
    let column_list = columns
        .iter()
        .map(|c| format!("{} {}", c.column_name, c.data_type))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{}.{} | {} | {}",
        table.schema_name,
        table.table_name,
        table.gloss.as_deref().unwrap_or(""),
        column_list
    )
}

/// Text embedded for a column row.
pub fn column_embed_text(column: &SchemaColumn) -> String {
    format!(
        "{}.{}.{} {} | {}",
        column.schema_name,
        column.table_name,
        column.column_name,
        column.data_type,
        column.gloss.as_deref().unwrap_or("")
    )
}

pub fn embed_text_fingerprint(text: &str) -> String {
    fingerprint(&[text])
}

#[derive(Default)]
pub struct SchemaIndexBuilder {
    index: SchemaIndex,
    module_keywords: HashMap<String, Vec<String>>,
}

impl SchemaIndexBuilder {
    pub fn table(mut self, table: SchemaTable) -> Self {
        self.index.tables.push(table);
        self
    }

    pub fn column(mut self, column: SchemaColumn) -> Self {
        self.index
            .columns
            .entry(column.table_name.to_lowercase())
            .or_default()
            .push(column);
        self
    }

    pub fn edge(mut self, edge: ForeignKeyEdge) -> Self {
        self.index.edges.push(edge);
        self
    }

    pub fn module_keywords(mut self, module: &str, keywords: &[&str]) -> Self {
        self.module_keywords
            .entry(module.to_string())
            .or_default()
            .extend(keywords.iter().map(|k| k.to_lowercase()));
        self
    }

    pub fn glossary_entry(mut self, abbreviation: &str, expansion: &str) -> Self {
        self.index
            .glossary
            .push((abbreviation.to_lowercase(), expansion.to_lowercase()));
        self
    }

    pub fn table_vector(mut self, table: &str, vector: Vec<f32>) -> Self {
        self.index
            .table_vectors
            .insert(table.to_lowercase(), vector);
        self
    }

    pub fn column_vector(mut self, table: &str, column: &str, vector: Vec<f32>) -> Self {
        self.index
            .column_vectors
            .insert((table.to_lowercase(), column.to_lowercase()), vector);
        self
    }

    pub fn embedding_model(mut self, tag: &str) -> Self {
        self.index.embedding_model = tag.to_string();
        self
    }

    /// Finalize: sort for determinism, compute module centroids, attach
    /// vocabulary. Every module named by a table gets an entry even without
    /// curated keywords.
    pub fn build(mut self) -> SchemaIndex {
        self.index
            .tables
            .sort_by(|a, b| a.table_name.cmp(&b.table_name));
        for columns in self.index.columns.values_mut() {
            columns.sort_by_key(|c| c.ordinal);
        }
        self.index.glossary.sort();

        let mut module_names: Vec<String> = self
            .index
            .tables
            .iter()
            .map(|t| t.module.clone())
            .chain(self.module_keywords.keys().cloned())
            .collect();
        module_names.sort();
        module_names.dedup();

        self.index.modules = module_names
            .into_iter()
            .map(|name| {
                let members: Vec<&Vec<f32>> = self
                    .index
                    .tables
                    .iter()
                    .filter(|t| t.module == name)
                    .filter_map(|t| self.index.table_vectors.get(&t.table_name.to_lowercase()))
                    .collect();
                let centroid = mean_vector(&members);
                let mut keywords = self.module_keywords.remove(&name).unwrap_or_default();
                keywords.sort();
                keywords.dedup();
                ModuleInfo {
                    name,
                    keywords,
                    centroid,
                }
            })
            .collect();

        self.index
    }
}

fn mean_vector(vectors: &[&Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let dim = first.len();
    let mut sum = vec![0.0f32; dim];
    let mut count = 0usize;
    for vector in vectors {
        if vector.len() != dim {
            continue;
        }
        for (slot, value) in sum.iter_mut().zip(vector.iter()) {
            *slot += value;
        }
        count += 1;
    }
    if count == 0 {
        return Vec::new();
    }
    for slot in &mut sum {
        *slot /= count as f32;
    }
    sum
}
