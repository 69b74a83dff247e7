use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A table known to the schema index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaTable {
    pub schema_name: String,
    pub table_name: String,
    /// Coarse business-area grouping used to narrow retrieval.
    pub module: String,
    pub gloss: Option<String>,
    /// Number of FK edges touching this table, in either direction.
    pub fk_degree: u32,
    /// FK-degree exceeded the hub threshold at indexing time.
    pub is_hub: bool,
    pub fingerprint: String,
}

impl SchemaTable {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }
}

/// A column known to the schema index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub schema_name: String,
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub ordinal: i32,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub fk_target_table: Option<String>,
    pub fk_target_column: Option<String>,
    /// Matches one of the generic patterns; downweighted during retrieval.
    pub is_generic: bool,
    pub gloss: Option<String>,
    pub fingerprint: String,
}

/// A directed foreign-key edge. Both endpoints resolve to known columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub constraint_name: String,
}

/// Generic-column patterns: id-like, timestamps, audit fields, status, and
/// name/description columns. The set is closed; anything else is specific.
pub fn is_generic_column(column_name: &str) -> bool {
    let name = column_name.to_lowercase();

    name == "id"
        || name.ends_with("_id")
        || name.ends_with("_uuid")
        || name.ends_with("_at")
        || name.ends_with("_date")
        || name.ends_with("_time")
        || name.ends_with("_timestamp")
        || matches!(
            name.as_str(),
            "created"
                | "updated"
                | "deleted"
                | "created_by"
                | "updated_by"
                | "deleted_by"
                | "version"
                | "status"
                | "state"
                | "active"
                | "is_active"
                | "enabled"
                | "name"
                | "description"
                | "notes"
        )
}

/// One selected table inside a schema packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketTable {
    pub table: SchemaTable,
    pub columns: Vec<SchemaColumn>,
    /// Dense DDL-like rendering used inside the prompt.
    pub compact_ddl: String,
    /// Fused retrieval score that selected this table.
    pub score: f64,
}

/// The per-request bundle of selected tables, their FK edges, and the
/// modules they span. Immutable once built; the retriever returns a fresh
/// packet per request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaPacket {
    pub tables: Vec<PacketTable>,
    pub modules: Vec<String>,
    pub edges: Vec<ForeignKeyEdge>,
}

impl SchemaPacket {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(|t| t.table.table_name.clone())
            .collect()
    }

    /// Lowercased names accepted by the validator: bare and schema-qualified.
    pub fn allowed_tables(&self) -> HashSet<String> {
        let mut allowed = HashSet::new();
        for entry in &self.tables {
            allowed.insert(entry.table.table_name.to_lowercase());
            allowed.insert(entry.table.qualified_name().to_lowercase());
        }
        allowed
    }

    pub fn table(&self, name: &str) -> Option<&PacketTable> {
        let needle = name.to_lowercase();
        self.tables.iter().find(|t| {
            t.table.table_name.to_lowercase() == needle
                || t.table.qualified_name().to_lowercase() == needle
        })
    }

    /// The DDL block plus FK hints handed to the prompt composer.
    pub fn schema_context(&self) -> String {
        let mut out = String::new();
        for entry in &self.tables {
            out.push_str(&entry.compact_ddl);
            out.push('\n');
        }
        if !self.edges.is_empty() {
            out.push_str("-- foreign keys:\n");
            for edge in &self.edges {
                out.push_str(&format!(
                    "--   {}.{} -> {}.{}\n",
                    edge.from_table, edge.from_column, edge.to_table, edge.to_column
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> PacketTable {
        PacketTable {
            table: SchemaTable {
                schema_name: "public".to_string(),
                table_name: name.to_string(),
                module: "core".to_string(),
                gloss: None,
                fk_degree: 0,
                is_hub: false,
                fingerprint: String::new(),
            },
            columns: Vec::new(),
            compact_ddl: format!("TABLE public.{name} ()"),
            score: 1.0,
        }
    }

    #[test]
    fn allowed_tables_include_qualified_names() {
        let packet = SchemaPacket {
            tables: vec![table("accounts")],
            modules: vec!["core".to_string()],
            edges: Vec::new(),
        };
        let allowed = packet.allowed_tables();
        assert!(allowed.contains("accounts"));
        assert!(allowed.contains("public.accounts"));
    }

    #[test]
    fn generic_patterns() {
        for name in ["id", "company_id", "created_at", "status", "name"] {
            assert!(is_generic_column(name), "{name} should be generic");
        }
        for name in ["revenue", "founded_year", "ticker_symbol"] {
            assert!(!is_generic_column(name), "{name} should be specific");
        }
    }
}
