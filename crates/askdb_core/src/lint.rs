//! Soft checks and mechanical rewrites.
//!
//! Lint issues lower a candidate's score but never reject it; autocorrect
//! applies only rewrites from a fixed whitelist where the result is provably
//! equivalent to the original.

use crate::intent::QuestionIntent;
use crate::tokenizer::{AtomKind, CodeAtom, code_atoms, tokenize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintRule {
    AggregateWithoutGroupBy,
    SuperlativeWithoutOrderLimit,
    DialectForeignSyntax,
}

#[derive(Debug, Clone)]
pub struct LintIssue {
    pub rule: LintRule,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct LintReport {
    pub issues: Vec<LintIssue>,
}

impl LintReport {
    pub fn error_count(&self) -> usize {
        self.issues.len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.message.clone()).collect()
    }
}

/// Structural facts about a statement used for scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlShape {
    pub has_group_by: bool,
    pub has_order_by: bool,
    pub has_limit: bool,
    pub has_aggregate: bool,
}

const AGGREGATE_FUNCTIONS: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX"];

/// Words in a select list that are syntax rather than column references.
const SELECT_LIST_KEYWORDS: &[&str] = &[
    "DISTINCT", "ALL", "AS", "CASE", "WHEN", "THEN", "ELSE", "END", "NULL", "TRUE", "FALSE",
    "CAST", "INTERVAL", "OVER", "PARTITION", "BY", "FILTER", "AND", "OR", "NOT", "IN", "IS",
    "BETWEEN", "LIKE", "ILIKE",
];

pub fn analyze_shape(sql: &str) -> SqlShape {
    let atoms = code_atoms(&tokenize(sql));
    SqlShape {
        has_group_by: has_clause(&atoms, "GROUP"),
        has_order_by: has_clause(&atoms, "ORDER"),
        has_limit: has_clause(&atoms, "LIMIT"),
        has_aggregate: select_list(&atoms)
            .iter()
            .any(|pair| is_aggregate_call(pair)),
    }
}

pub fn lint(sql: &str, intent: &QuestionIntent) -> LintReport {
    let atoms = code_atoms(&tokenize(sql));
    let mut issues = Vec::new();

    let list = select_list(&atoms);
    let has_aggregate = list.iter().any(|pair| is_aggregate_call(pair));
    let has_plain = plain_select_idents(&list);
    let grouped = has_clause(&atoms, "GROUP");

    if has_aggregate && has_plain && !grouped {
        issues.push(LintIssue {
            rule: LintRule::AggregateWithoutGroupBy,
            message: "aggregate mixed with plain columns but no GROUP BY".to_string(),
        });
    }

    if intent.superlative && !(has_clause(&atoms, "ORDER") && has_clause(&atoms, "LIMIT")) {
        issues.push(LintIssue {
            rule: LintRule::SuperlativeWithoutOrderLimit,
            message: "question asks for an extreme but the query has no ORDER BY with LIMIT"
                .to_string(),
        });
    }

    for message in foreign_syntax(&atoms) {
        issues.push(LintIssue {
            rule: LintRule::DialectForeignSyntax,
            message,
        });
    }

    LintReport { issues }
}

fn has_clause(atoms: &[CodeAtom], keyword: &str) -> bool {
    atoms.iter().any(|a| a.depth == 0 && a.is_word(keyword))
}

/// Atom pairs (each with its successor) between the outermost SELECT and its
/// FROM. The pairing keeps function-call detection a local check.
fn select_list<'a>(atoms: &'a [CodeAtom]) -> Vec<(&'a CodeAtom, Option<&'a CodeAtom>)> {
    let start = atoms
        .iter()
        .position(|a| a.depth == 0 && a.is_word("SELECT"));
    let Some(start) = start else {
        return Vec::new();
    };
    let end = atoms[start..]
        .iter()
        .position(|a| a.depth == 0 && a.is_word("FROM"))
        .map(|off| start + off)
        .unwrap_or(atoms.len());

    (start + 1..end)
        .map(|i| (&atoms[i], atoms.get(i + 1)))
        .collect()
}

fn is_aggregate_call(pair: &(&CodeAtom, Option<&CodeAtom>)) -> bool {
    let (atom, next) = pair;
    atom.kind == AtomKind::Word
        && AGGREGATE_FUNCTIONS.contains(&atom.upper.as_str())
        && next.is_some_and(|n| n.is_symbol('('))
}

fn plain_select_idents(list: &[(&CodeAtom, Option<&CodeAtom>)]) -> bool {
    let mut skip_next = false;
    for (atom, next) in list {
        if skip_next {
            skip_next = false;
            continue;
        }
        if atom.is_word("AS") {
            // The following word is an output alias, not a column.
            skip_next = true;
            continue;
        }
        if atom.depth == 0
            && atom.kind == AtomKind::Word
            && !SELECT_LIST_KEYWORDS.contains(&atom.upper.as_str())
            && !AGGREGATE_FUNCTIONS.contains(&atom.upper.as_str())
            && !next.is_some_and(|n| n.is_symbol('('))
        {
            return true;
        }
    }
    false
}

/// Dialect-foreign patterns that cannot be rewritten mechanically.
fn foreign_syntax(atoms: &[CodeAtom]) -> Vec<String> {
    let mut found = Vec::new();
    for (i, atom) in atoms.iter().enumerate() {
        if atom.kind != AtomKind::Word {
            continue;
        }
        let next_is_call = atoms.get(i + 1).is_some_and(|n| n.is_symbol('('));
        match atom.upper.as_str() {
            "TOP" if i > 0 && atoms[i - 1].is_word("SELECT") => {
                found.push("SELECT TOP is not PostgreSQL syntax, use LIMIT".to_string());
            }
            "DATE_FORMAT" | "STR_TO_DATE" | "GETDATE" | "DATEADD" | "DATEDIFF"
                if next_is_call =>
            {
                found.push(format!("{}() is not a PostgreSQL function", atom.text));
            }
            _ => {}
        }
    }
    found
}

/// Apply whitelisted mechanical rewrites; returns `Some(fixed)` when any
/// rewrite fired.
///
/// The whitelist, with the equivalence argument for each entry:
/// - `YEAR(e)` / `MONTH(e)` / `DAY(e)` → `EXTRACT(YEAR FROM e)` etc.; same
///   integer result for any date/timestamp argument.
/// - `IFNULL(a, b)` → `COALESCE(a, b)`; identical two-argument semantics.
/// - `` `ident` `` → `"ident"`; both quote the same identifier.
pub fn autocorrect(sql: &str) -> Option<String> {
    let atoms = code_atoms(&tokenize(sql));
    // (range, replacement), applied back-to-front so offsets stay valid.
    let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();

    let mut i = 0;
    while i < atoms.len() {
        let atom = &atoms[i];

        if atom.kind == AtomKind::Word
            && matches!(atom.upper.as_str(), "YEAR" | "MONTH" | "DAY")
            && atoms.get(i + 1).is_some_and(|n| n.is_symbol('('))
        {
            if let Some(close) = matching_close(&atoms, i + 1) {
                let open = &atoms[i + 1];
                let inner = sql[open.offset + open.len..atoms[close].offset].trim();
                edits.push((
                    atom.offset..atoms[close].offset + atoms[close].len,
                    format!("EXTRACT({} FROM {})", atom.upper, inner),
                ));
                i = close + 1;
                continue;
            }
        }

        if atom.kind == AtomKind::Word
            && atom.upper == "IFNULL"
            && atoms.get(i + 1).is_some_and(|n| n.is_symbol('('))
        {
            edits.push((atom.offset..atom.offset + atom.len, "COALESCE".to_string()));
        }

        if atom.is_symbol('`') {
            if let Some(off) = atoms[i + 1..]
                .iter()
                .position(|a| a.is_symbol('`'))
            {
                let close = &atoms[i + 1 + off];
                let inner = sql[atom.offset + 1..close.offset].trim();
                edits.push((
                    atom.offset..close.offset + close.len,
                    format!("\"{}\"", inner),
                ));
                i += off + 2;
                continue;
            }
        }

        i += 1;
    }

    if edits.is_empty() {
        return None;
    }

    let mut fixed = sql.to_string();
    edits.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));
    for (range, replacement) in edits {
        fixed.replace_range(range, &replacement);
    }
    Some(fixed)
}

fn matching_close(atoms: &[CodeAtom], open: usize) -> Option<usize> {
    let open_depth = atoms[open].depth;
    (open + 1..atoms.len()).find(|&j| atoms[j].is_symbol(')') && atoms[j].depth == open_depth)
}
