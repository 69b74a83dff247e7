//! Error classification and repair-context construction.
//!
//! Each repairable failure maps to one targeted prompt delta. The
//! undefined-column case is surgical: the offending alias is resolved
//! against the prior SQL so only the one real table's columns are listed,
//! without shrinking the schema packet.

use askdb_core::{
    DbErrorClass, DbFailure, RepairDbError, SchemaPacket, extract_table_refs, resolve_alias,
    tokenizer,
};
use askdb_llm::RepairDelta;
use regex::Regex;
use std::sync::OnceLock;

use crate::evaluator::Candidate;

/// What a repair round sends back to the generator.
#[derive(Debug, Clone)]
pub struct RepairContext {
    pub deltas: Vec<RepairDelta>,
    pub db_error: Option<RepairDbError>,
}

impl RepairContext {
    pub fn rendered_issues(&self) -> Vec<String> {
        self.deltas.iter().map(RepairDelta::render).collect()
    }

    pub fn summary(&self) -> String {
        self.deltas
            .iter()
            .map(|d| match d {
                RepairDelta::DialectSyntax { class, .. } => format!("syntax:{class}"),
                RepairDelta::UnknownTable { .. } => "unknown_table".to_string(),
                RepairDelta::ColumnWhitelist { table, .. } => format!("column_whitelist:{table}"),
                RepairDelta::MultiCandidate { .. } => "multi_candidate".to_string(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Build the repair context for a failed candidate, or `None` when the
/// failure is not repairable.
pub fn build_repair_context(candidate: &Candidate, packet: &SchemaPacket) -> Option<RepairContext> {
    let mut deltas = Vec::new();
    let mut db_error = None;

    if !candidate.unknown_tables.is_empty() {
        deltas.push(RepairDelta::UnknownTable {
            allowed: packet.table_names(),
        });
    }

    if let Some(failure) = &candidate.explain_error {
        if !failure.class.repairable() {
            return None;
        }
        db_error = Some(wire_error(failure, candidate, packet, &mut deltas));
    }

    if deltas.is_empty() && db_error.is_none() {
        return None;
    }
    Some(RepairContext { deltas, db_error })
}

fn wire_error(
    failure: &DbFailure,
    candidate: &Candidate,
    packet: &SchemaPacket,
    deltas: &mut Vec<RepairDelta>,
) -> RepairDbError {
    let mut minimal_whitelist = None;

    match failure.class {
        DbErrorClass::UndefinedColumn => {
            if let Some(delta) = undefined_column_delta(&failure.info.message, candidate, packet) {
                if let RepairDelta::ColumnWhitelist { columns, .. } = &delta {
                    minimal_whitelist = Some(columns.clone());
                }
                deltas.push(delta);
            } else {
                deltas.push(syntax_delta(failure));
            }
        }
        DbErrorClass::UndefinedTable => {
            deltas.push(RepairDelta::UnknownTable {
                allowed: packet.table_names(),
            });
        }
        _ => deltas.push(syntax_delta(failure)),
    }

    RepairDbError {
        sqlstate: failure.info.sqlstate.clone(),
        message: failure.info.message.clone(),
        minimal_whitelist,
    }
}

fn syntax_delta(failure: &DbFailure) -> RepairDelta {
    RepairDelta::DialectSyntax {
        class: failure.class.kind().as_str().to_string(),
        message: failure.info.to_string(),
    }
}

/// Build the surgical whitelist delta from an undefined-column error.
fn undefined_column_delta(
    message: &str,
    candidate: &Candidate,
    packet: &SchemaPacket,
) -> Option<RepairDelta> {
    let (alias, _column) = parse_undefined_column(message)?;

    let atoms = tokenizer::code_atoms(&tokenizer::tokenize(&candidate.sql));
    let refs = extract_table_refs(&atoms);

    let table_name = match alias {
        Some(alias) => resolve_alias(&refs, &alias)?.to_string(),
        // Unqualified error: only unambiguous when the query reads one table.
        None if refs.len() == 1 => refs[0].name.clone(),
        None => return None,
    };

    let entry = packet.table(&table_name)?;
    let columns: Vec<String> = entry
        .columns
        .iter()
        .map(|c| c.column_name.clone())
        .collect();

    let table = entry.table.table_name.clone();
    let needle = table.to_lowercase();
    let mut neighbors: Vec<String> = packet
        .edges
        .iter()
        .filter_map(|edge| {
            if edge.from_table.to_lowercase() == needle {
                Some(edge.to_table.clone())
            } else if edge.to_table.to_lowercase() == needle {
                Some(edge.from_table.clone())
            } else {
                None
            }
        })
        .collect();
    neighbors.sort();
    neighbors.dedup();

    Some(RepairDelta::ColumnWhitelist {
        table,
        columns,
        neighbors,
    })
}

/// Extract `alias.column` (or a bare column) from a PostgreSQL 42703-style
/// message such as `column c.company_name does not exist` or
/// `column "company_name" does not exist`.
pub fn parse_undefined_column(message: &str) -> Option<(Option<String>, String)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let regex = PATTERN.get_or_init(|| {
        Regex::new(
            r#"column "?([A-Za-z_][A-Za-z0-9_$]*)(?:\.([A-Za-z_][A-Za-z0-9_$]*))?"? does not exist"#,
        )
        .expect("static regex compiles")
    });

    let captures = regex.captures(message)?;
    let first = captures.get(1)?.as_str().to_string();
    match captures.get(2) {
        Some(column) => Some((Some(first), column.as_str().to_string())),
        None => Some((None, first)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_core::{DbErrorInfo, LintReport, PacketTable, SchemaColumn, SchemaTable};

    fn candidate(sql: &str, failure: Option<DbFailure>) -> Candidate {
        Candidate {
            sql: sql.to_string(),
            normalized: String::new(),
            lint: LintReport::default(),
            unknown_tables: Vec::new(),
            explain_error: failure,
            probed: true,
            score: 0,
            source_attempt: 1,
        }
    }

    fn companies_packet() -> SchemaPacket {
        let table = SchemaTable {
            schema_name: "public".to_string(),
            table_name: "companies".to_string(),
            module: "finance".to_string(),
            gloss: None,
            fk_degree: 1,
            is_hub: false,
            fingerprint: String::new(),
        };
        let columns = ["id", "name", "founded_year"]
            .iter()
            .map(|name| SchemaColumn {
                schema_name: "public".to_string(),
                table_name: "companies".to_string(),
                column_name: name.to_string(),
                data_type: "text".to_string(),
                is_nullable: true,
                ordinal: 0,
                is_primary_key: false,
                is_foreign_key: false,
                fk_target_table: None,
                fk_target_column: None,
                is_generic: false,
                gloss: None,
                fingerprint: String::new(),
            })
            .collect();

        SchemaPacket {
            tables: vec![PacketTable {
                table,
                columns,
                compact_ddl: String::new(),
                score: 1.0,
            }],
            modules: vec!["finance".to_string()],
            edges: vec![askdb_core::ForeignKeyEdge {
                from_table: "company_revenue_annual".to_string(),
                from_column: "company_id".to_string(),
                to_table: "companies".to_string(),
                to_column: "id".to_string(),
                constraint_name: "fk".to_string(),
            }],
        }
    }

    #[test]
    fn parses_qualified_and_bare_columns() {
        assert_eq!(
            parse_undefined_column("column c.company_name does not exist"),
            Some((Some("c".to_string()), "company_name".to_string()))
        );
        assert_eq!(
            parse_undefined_column("column \"company_name\" does not exist"),
            Some((None, "company_name".to_string()))
        );
        assert_eq!(parse_undefined_column("relation x does not exist"), None);
    }

    #[test]
    fn undefined_column_builds_surgical_whitelist() {
        let failure = DbFailure::new(
            DbErrorInfo::new("column c.company_name does not exist").with_sqlstate("42703"),
        );
        let candidate = candidate(
            "SELECT c.company_name FROM companies c LIMIT 5",
            Some(failure),
        );

        let context = build_repair_context(&candidate, &companies_packet()).expect("repairable");
        let whitelist = context
            .deltas
            .iter()
            .find_map(|d| match d {
                RepairDelta::ColumnWhitelist {
                    table,
                    columns,
                    neighbors,
                } => Some((table.clone(), columns.clone(), neighbors.clone())),
                _ => None,
            })
            .expect("whitelist delta");

        assert_eq!(whitelist.0, "companies");
        assert_eq!(whitelist.1, vec!["id", "name", "founded_year"]);
        assert_eq!(whitelist.2, vec!["company_revenue_annual"]);
        assert_eq!(
            context.db_error.unwrap().minimal_whitelist.unwrap(),
            vec!["id", "name", "founded_year"]
        );
    }

    #[test]
    fn permission_errors_are_not_repairable() {
        let failure = DbFailure::new(
            DbErrorInfo::new("permission denied for table companies").with_sqlstate("42501"),
        );
        let candidate = candidate("SELECT * FROM companies LIMIT 5", Some(failure));
        assert!(build_repair_context(&candidate, &companies_packet()).is_none());
    }

    #[test]
    fn unknown_table_candidate_gets_allowed_list() {
        let mut c = candidate("SELECT * FROM acounts LIMIT 5", None);
        c.unknown_tables = vec!["acounts".to_string()];
        let context = build_repair_context(&c, &companies_packet()).expect("repairable");
        assert!(matches!(
            context.deltas[0],
            RepairDelta::UnknownTable { .. }
        ));
    }

    #[test]
    fn syntax_error_maps_to_dialect_delta() {
        let failure =
            DbFailure::new(DbErrorInfo::new("syntax error at or near \"FORM\"").with_sqlstate("42601"));
        let candidate = candidate("SELECT * FORM companies", Some(failure));
        let context = build_repair_context(&candidate, &companies_packet()).expect("repairable");
        assert!(matches!(
            context.deltas[0],
            RepairDelta::DialectSyntax { .. }
        ));
    }
}
