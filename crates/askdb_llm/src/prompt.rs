//! Prompt context composition.
//!
//! The base context is built once per request and never mutated; repair and
//! multi-candidate instructions are appended as delta blocks in a fixed
//! order, which keeps the prefix stable for provider-side prompt caching.

use askdb_core::SchemaPacket;

/// An appended prompt block. Rendering order is fixed regardless of the
/// order deltas were collected in.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairDelta {
    /// A dialect or syntax failure with the exact error text.
    DialectSyntax { class: String, message: String },
    /// The candidate referenced a table outside the packet.
    UnknownTable { allowed: Vec<String> },
    /// Surgical whitelist: exact columns of one table plus its one-hop FK
    /// neighbors.
    ColumnWhitelist {
        table: String,
        columns: Vec<String>,
        neighbors: Vec<String>,
    },
    /// Ask for K independent, diverse candidates.
    MultiCandidate { k: u32 },
}

impl RepairDelta {
    fn order(&self) -> u8 {
        match self {
            Self::DialectSyntax { .. } => 0,
            Self::UnknownTable { .. } => 1,
            Self::ColumnWhitelist { .. } => 2,
            Self::MultiCandidate { .. } => 3,
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::DialectSyntax { class, message } => {
                format!(
                    "The previous query failed with a {class} error:\n  {message}\n\
                     Fix exactly this problem and keep the rest of the query intact."
                )
            }
            Self::UnknownTable { allowed } => {
                format!(
                    "Only these tables exist; use no others:\n  {}",
                    allowed.join("\n  ")
                )
            }
            Self::ColumnWhitelist {
                table,
                columns,
                neighbors,
            } => {
                let mut block = format!(
                    "Table {table} has exactly these columns:\n  {}\n\
                     Do not invent columns; if a concept is missing, join a table that has it.",
                    columns.join(", ")
                );
                if !neighbors.is_empty() {
                    block.push_str(&format!(
                        "\nTables joinable from {table} via foreign keys: {}",
                        neighbors.join(", ")
                    ));
                }
                block
            }
            Self::MultiCandidate { k } => {
                format!(
                    "Produce {k} independent, diverse candidate queries. Each must be a \
                     complete standalone SELECT statement."
                )
            }
        }
    }
}

pub struct PromptComposer {
    dialect: String,
}

impl PromptComposer {
    pub fn new(dialect: &str) -> Self {
        Self {
            dialect: dialect.to_string(),
        }
    }

    /// The immutable base: role instruction, dialect, compact schema, style
    /// contract, and dialect-bound few-shot examples. The question travels
    /// in its own request field.
    pub fn base_context(&self, packet: &SchemaPacket) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Generate a single {} SELECT statement answering the question about the \
             database described below.\n\n",
            self.dialect
        ));
        out.push_str("Schema:\n");
        out.push_str(&packet.schema_context());
        out.push_str(
            "\nRules:\n\
             - one SELECT statement, nothing else\n\
             - alias every table and qualify every column\n\
             - always end with a LIMIT clause\n\
             - use only the tables and columns above\n",
        );
        out.push_str(&self.few_shot_examples());
        out
    }

    /// Append deltas to a base context, in fixed order, never removing base
    /// content.
    pub fn compose(&self, base: &str, deltas: &[RepairDelta]) -> String {
        let mut ordered: Vec<&RepairDelta> = deltas.iter().collect();
        ordered.sort_by_key(|d| d.order());

        let mut out = base.to_string();
        for delta in ordered {
            out.push('\n');
            out.push_str(&delta.render());
            out.push('\n');
        }
        out
    }

    fn few_shot_examples(&self) -> String {
        "\nExamples:\n\
         Q: how many customers are there\n\
         SQL: SELECT COUNT(*) AS customer_count FROM customers c LIMIT 1\n\
         Q: top 5 products by units sold\n\
         SQL: SELECT p.name, SUM(o.quantity) AS units FROM products p \
         JOIN order_items o ON o.product_id = p.id \
         GROUP BY p.name ORDER BY units DESC LIMIT 5\n"
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_render_in_fixed_order() {
        let composer = PromptComposer::new("postgresql");
        let deltas = vec![
            RepairDelta::MultiCandidate { k: 4 },
            RepairDelta::UnknownTable {
                allowed: vec!["accounts".to_string()],
            },
        ];
        let composed = composer.compose("BASE", &deltas);
        let tables_at = composed.find("Only these tables").unwrap();
        let multi_at = composed.find("independent, diverse").unwrap();
        assert!(composed.starts_with("BASE"));
        assert!(tables_at < multi_at);
    }

    #[test]
    fn base_is_never_mutated() {
        let composer = PromptComposer::new("postgresql");
        let base = composer.base_context(&SchemaPacket::default());
        let composed = composer.compose(&base, &[RepairDelta::MultiCandidate { k: 2 }]);
        assert!(composed.starts_with(&base));
    }

    #[test]
    fn whitelist_delta_lists_columns_and_neighbors() {
        let delta = RepairDelta::ColumnWhitelist {
            table: "companies".to_string(),
            columns: vec!["id".to_string(), "name".to_string()],
            neighbors: vec!["company_revenue_annual".to_string()],
        };
        let rendered = delta.render();
        assert!(rendered.contains("companies has exactly these columns"));
        assert!(rendered.contains("id, name"));
        assert!(rendered.contains("Do not invent columns"));
        assert!(rendered.contains("company_revenue_annual"));
    }
}
