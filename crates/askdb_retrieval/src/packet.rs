//! Compact DDL-like rendering of a table for the prompt.

use askdb_core::{SchemaColumn, SchemaTable};

/// Render one table as a dense single-table description: columns with
/// types, PK/FK markers, and concise glosses. Distinct from the embedding
/// source text; this is what the generator reads.
pub fn render_compact_ddl(table: &SchemaTable, columns: &[SchemaColumn]) -> String {
    let mut out = format!("TABLE {} (", table.qualified_name());

    let rendered: Vec<String> = columns.iter().map(render_column).collect();
    out.push_str(&rendered.join(", "));
    out.push(')');

    if let Some(gloss) = table.gloss.as_deref().filter(|g| !g.is_empty()) {
        out.push_str(" -- ");
        out.push_str(gloss);
    }
    out
}

fn render_column(column: &SchemaColumn) -> String {
    let mut rendered = format!("{} {}", column.column_name, column.data_type);
    if column.is_primary_key {
        rendered.push_str(" PK");
    }
    if column.is_foreign_key {
        match (&column.fk_target_table, &column.fk_target_column) {
            (Some(table), Some(target)) => {
                rendered.push_str(&format!(" FK->{table}.{target}"));
            }
            _ => rendered.push_str(" FK"),
        }
    }
    if !column.is_nullable {
        rendered.push_str(" NOT NULL");
    }
    if let Some(gloss) = column.gloss.as_deref().filter(|g| !g.is_empty()) {
        rendered.push_str(&format!(" [{gloss}]"));
    }
    rendered
}
