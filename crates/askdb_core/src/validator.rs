//! Structural validation of generated SQL.
//!
//! Hard safety rules (SELECT-only, single statement, keyword and function
//! blocklists) never reach the repair loop; allowlist misses go back to the
//! generator; LIMIT problems are patched in place.

use std::collections::HashSet;

use crate::tokenizer::{AtomKind, CodeAtom, code_atoms, has_unterminated, tokenize};

/// What the pipeline does about a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Refuse the request; never sent back to the generator.
    FailFast,
    /// Return to the generator with the violation in the repair delta.
    Rewrite,
    /// Patched in place; processing continues.
    AutoFix,
    /// Recorded but the candidate proceeds.
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCode {
    NoSelect,
    MultipleStatements,
    DangerousKeyword,
    DangerousFunction,
    UnterminatedLiteral,
    UnknownTable,
    MissingLimit,
    OversizedLimit,
}

impl RuleCode {
    pub fn action(&self) -> RuleAction {
        match self {
            Self::NoSelect
            | Self::MultipleStatements
            | Self::DangerousKeyword
            | Self::DangerousFunction
            | Self::UnterminatedLiteral => RuleAction::FailFast,
            Self::UnknownTable => RuleAction::Rewrite,
            Self::MissingLimit | Self::OversizedLimit => RuleAction::AutoFix,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Violation {
    pub code: RuleCode,
    pub action: RuleAction,
    pub message: String,
}

impl Violation {
    fn new(code: RuleCode, message: impl Into<String>) -> Self {
        Self {
            code,
            action: code.action(),
            message: message.into(),
        }
    }
}

/// A table referenced in FROM/JOIN position, with its alias if one was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Dotted name as written (`schema.table` or bare `table`).
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// Unqualified table name, lowercased.
    pub fn bare_name(&self) -> String {
        self.name
            .rsplit('.')
            .next()
            .unwrap_or(&self.name)
            .to_lowercase()
    }
}

/// Statement keywords that must never appear in code position.
pub const DANGEROUS_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE", "COPY",
];

pub struct ValidateOptions<'a> {
    /// Lowercased allowed table names (bare and schema-qualified). `None`
    /// disables the allowlist check (role-gated raw SQL path).
    pub allowed_tables: Option<&'a HashSet<String>>,
    pub default_limit: u32,
    pub limit_ceiling: u32,
    /// Lowercased function names that must never be called.
    pub function_blocklist: &'a [String],
}

/// Outcome of structural validation. `sql` carries any auto-fixes applied.
#[derive(Debug, Clone)]
pub struct Validation {
    pub sql: String,
    pub violations: Vec<Violation>,
    pub table_refs: Vec<TableRef>,
}

impl Validation {
    pub fn fail_fast(&self) -> Option<&Violation> {
        self.violations
            .iter()
            .find(|v| v.action == RuleAction::FailFast)
    }

    pub fn needs_rewrite(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.action == RuleAction::Rewrite)
    }

    /// No fail-fast and no rewrite violation; the SQL may be executed.
    pub fn is_executable(&self) -> bool {
        self.fail_fast().is_none() && !self.needs_rewrite()
    }

    pub fn unknown_tables(&self) -> Vec<&str> {
        self.violations
            .iter()
            .filter(|v| v.code == RuleCode::UnknownTable)
            .map(|v| v.message.as_str())
            .collect()
    }
}

/// Validate one SQL string against the structural rules.
pub fn validate(sql: &str, opts: &ValidateOptions) -> Validation {
    let tokens = tokenize(sql);

    if has_unterminated(&tokens) {
        return Validation {
            sql: sql.to_string(),
            violations: vec![Violation::new(
                RuleCode::UnterminatedLiteral,
                "unterminated string literal or comment",
            )],
            table_refs: Vec::new(),
        };
    }

    let atoms = code_atoms(&tokens);
    let mut violations = Vec::new();

    if atoms.is_empty() {
        return Validation {
            sql: sql.to_string(),
            violations: vec![Violation::new(RuleCode::NoSelect, "empty statement")],
            table_refs: Vec::new(),
        };
    }

    check_single_statement(&atoms, &mut violations);
    check_dangerous_keywords(&atoms, &mut violations);
    check_dangerous_functions(&atoms, opts.function_blocklist, &mut violations);
    check_select_only(&atoms, &mut violations);

    let ctes = cte_names(&atoms);
    let table_refs = extract_table_refs(&atoms);

    if violations
        .iter()
        .any(|v| v.action == RuleAction::FailFast)
    {
        return Validation {
            sql: sql.to_string(),
            violations,
            table_refs,
        };
    }

    if let Some(allowed) = opts.allowed_tables {
        check_table_allowlist(&table_refs, &ctes, allowed, &mut violations);
    }

    let fixed = apply_limit_policy(sql, &atoms, opts, &mut violations);

    Validation {
        sql: fixed,
        violations,
        table_refs,
    }
}

fn check_single_statement(atoms: &[CodeAtom], violations: &mut Vec<Violation>) {
    for (i, atom) in atoms.iter().enumerate() {
        if atom.is_symbol(';') && i + 1 < atoms.len() {
            violations.push(Violation::new(
                RuleCode::MultipleStatements,
                "only one statement is allowed",
            ));
            return;
        }
    }
}

fn check_select_only(atoms: &[CodeAtom], violations: &mut Vec<Violation>) {
    let first = &atoms[0];
    let starts_well = first.is_word("SELECT")
        || (first.is_word("WITH")
            && atoms
                .iter()
                .any(|a| a.depth == 0 && a.is_word("SELECT")));
    if !starts_well {
        violations.push(Violation::new(
            RuleCode::NoSelect,
            format!("statement must start with SELECT, found `{}`", first.text),
        ));
    }
}

fn check_dangerous_keywords(atoms: &[CodeAtom], violations: &mut Vec<Violation>) {
    for atom in atoms {
        if atom.kind == AtomKind::Word && DANGEROUS_KEYWORDS.contains(&atom.upper.as_str()) {
            violations.push(Violation::new(
                RuleCode::DangerousKeyword,
                format!("keyword {} is not allowed", atom.upper),
            ));
            return;
        }
    }
}

fn check_dangerous_functions(
    atoms: &[CodeAtom],
    blocklist: &[String],
    violations: &mut Vec<Violation>,
) {
    for pair in atoms.windows(2) {
        if pair[0].kind == AtomKind::Word
            && pair[1].is_symbol('(')
            && blocklist.iter().any(|f| f == &pair[0].text.to_lowercase())
        {
            violations.push(Violation::new(
                RuleCode::DangerousFunction,
                format!("function {}() is not allowed", pair[0].text),
            ));
            return;
        }
    }
}

fn check_table_allowlist(
    refs: &[TableRef],
    ctes: &[String],
    allowed: &HashSet<String>,
    violations: &mut Vec<Violation>,
) {
    for table_ref in refs {
        let full = table_ref.name.to_lowercase();
        let bare = table_ref.bare_name();
        let locally_allowed = ctes.iter().any(|c| c.to_lowercase() == bare);
        if locally_allowed || allowed.contains(&full) || allowed.contains(&bare) {
            continue;
        }
        violations.push(Violation::new(RuleCode::UnknownTable, table_ref.name.clone()));
    }
}

/// Append a missing top-level LIMIT, or cap one that exceeds the ceiling.
fn apply_limit_policy(
    sql: &str,
    atoms: &[CodeAtom],
    opts: &ValidateOptions,
    violations: &mut Vec<Violation>,
) -> String {
    let limit_pos = atoms
        .iter()
        .position(|a| a.depth == 0 && a.is_word("LIMIT"));

    let Some(pos) = limit_pos else {
        violations.push(Violation::new(
            RuleCode::MissingLimit,
            format!("appended LIMIT {}", opts.default_limit),
        ));
        // Insert after the last code atom so trailing semicolons or comments
        // stay where they are.
        let insert_at = atoms
            .iter()
            .rev()
            .find(|a| !a.is_symbol(';'))
            .map(|a| a.offset + a.len)
            .unwrap_or(sql.len());
        let mut fixed = sql.to_string();
        fixed.insert_str(insert_at, &format!(" LIMIT {}", opts.default_limit));
        return fixed;
    };

    match atoms.get(pos + 1) {
        Some(arg) if arg.kind == AtomKind::Number => {
            let value: u64 = arg.text.parse().unwrap_or(u64::MAX);
            if value > u64::from(opts.limit_ceiling) {
                violations.push(Violation::new(
                    RuleCode::OversizedLimit,
                    format!("LIMIT {} capped to {}", arg.text, opts.limit_ceiling),
                ));
                let mut fixed = sql.to_string();
                fixed.replace_range(
                    arg.offset..arg.offset + arg.len,
                    &opts.limit_ceiling.to_string(),
                );
                return fixed;
            }
        }
        Some(arg) if arg.is_word("ALL") => {
            violations.push(Violation::new(
                RuleCode::OversizedLimit,
                format!("LIMIT ALL capped to {}", opts.limit_ceiling),
            ));
            let mut fixed = sql.to_string();
            fixed.replace_range(
                arg.offset..arg.offset + arg.len,
                &opts.limit_ceiling.to_string(),
            );
            return fixed;
        }
        _ => {}
    }

    sql.to_string()
}

/// Clause keywords that terminate a table reference.
const REF_STOP_WORDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "WINDOW", "UNION", "EXCEPT",
    "INTERSECT", "ON", "USING", "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "FULL", "CROSS",
    "NATURAL", "LATERAL", "AS", "SET", "FETCH", "FOR", "SELECT", "WITH",
];

/// Functions whose argument list contains a FROM keyword that is not a
/// table clause (`EXTRACT(YEAR FROM x)`, `SUBSTRING(s FROM 2)`, ...).
const FROM_TAKING_FUNCTIONS: &[&str] = &["EXTRACT", "SUBSTRING", "TRIM", "POSITION", "OVERLAY"];

/// Extract table references from FROM/JOIN positions, resolving aliases.
///
/// Derived tables (subqueries) are skipped; their aliases are statement-local
/// and never hit the allowlist. Comma-separated FROM lists are walked.
pub fn extract_table_refs(atoms: &[CodeAtom]) -> Vec<TableRef> {
    let function_ranges = from_taking_call_ranges(atoms);
    let mut refs = Vec::new();
    let mut i = 0;

    while i < atoms.len() {
        let atom = &atoms[i];
        if !(atom.kind == AtomKind::Word && (atom.upper == "FROM" || atom.upper == "JOIN")) {
            i += 1;
            continue;
        }
        // FROM inside EXTRACT/SUBSTRING/... or in IS DISTINCT FROM separates
        // expressions, not tables.
        if atom.upper == "FROM"
            && (function_ranges.iter().any(|(open, close)| i > *open && i < *close)
                || (i > 0 && atoms[i - 1].is_word("DISTINCT")))
        {
            i += 1;
            continue;
        }
        let clause_depth = atom.depth;
        i += 1;

        loop {
            // LATERAL may precede either a name or a subquery.
            if atoms.get(i).is_some_and(|a| a.is_word("LATERAL")) {
                i += 1;
            }

            if atoms.get(i).is_some_and(|a| a.is_symbol('(')) {
                // Derived table: its alias is statement-local, but tables
                // referenced inside it still count.
                let after = skip_balanced(atoms, i);
                let inner_end = after.saturating_sub(1).max(i + 1);
                refs.extend(extract_table_refs(&atoms[i + 1..inner_end]));
                i = after;
                let _ = parse_alias(atoms, &mut i);
            } else if atoms.get(i).is_some_and(CodeAtom::is_name) {
                let name = parse_dotted_name(atoms, &mut i);
                let alias = parse_alias(atoms, &mut i);
                refs.push(TableRef { name, alias });
            } else {
                break;
            }

            // Comma continues a FROM list at the same depth.
            if atom.upper == "FROM"
                && atoms
                    .get(i)
                    .is_some_and(|a| a.is_symbol(',') && a.depth == clause_depth)
            {
                i += 1;
                continue;
            }
            break;
        }
    }

    refs
}

fn parse_dotted_name(atoms: &[CodeAtom], i: &mut usize) -> String {
    let mut parts = vec![atoms[*i].text.clone()];
    *i += 1;
    while atoms.get(*i).is_some_and(|a| a.is_symbol('.'))
        && atoms.get(*i + 1).is_some_and(CodeAtom::is_name)
    {
        parts.push(atoms[*i + 1].text.clone());
        *i += 2;
    }
    parts.join(".")
}

fn parse_alias(atoms: &[CodeAtom], i: &mut usize) -> Option<String> {
    if atoms.get(*i).is_some_and(|a| a.is_word("AS")) {
        *i += 1;
    }
    let candidate = atoms.get(*i)?;
    if candidate.is_name() && !REF_STOP_WORDS.contains(&candidate.upper.as_str()) {
        *i += 1;
        return Some(candidate.text.clone());
    }
    None
}

fn skip_balanced(atoms: &[CodeAtom], open: usize) -> usize {
    let open_depth = atoms[open].depth;
    let mut i = open + 1;
    while i < atoms.len() {
        if atoms[i].is_symbol(')') && atoms[i].depth == open_depth {
            return i + 1;
        }
        i += 1;
    }
    i
}

/// Argument ranges `(open_index, close_index)` of calls to functions whose
/// arguments use the FROM keyword.
fn from_taking_call_ranges(atoms: &[CodeAtom]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    for (i, atom) in atoms.iter().enumerate() {
        if atom.kind == AtomKind::Word
            && FROM_TAKING_FUNCTIONS.contains(&atom.upper.as_str())
            && atoms.get(i + 1).is_some_and(|a| a.is_symbol('('))
        {
            ranges.push((i + 1, skip_balanced(atoms, i + 1).saturating_sub(1)));
        }
    }
    ranges
}

/// Names introduced by a leading WITH clause; these are locally allowed.
pub fn cte_names(atoms: &[CodeAtom]) -> Vec<String> {
    let mut names = Vec::new();
    if !atoms.first().is_some_and(|a| a.is_word("WITH")) {
        return names;
    }

    let mut i = 1;
    if atoms.get(i).is_some_and(|a| a.is_word("RECURSIVE")) {
        i += 1;
    }

    loop {
        let Some(name_atom) = atoms.get(i).filter(|a| a.is_name()) else {
            break;
        };
        names.push(name_atom.text.clone());
        i += 1;

        // Optional column list before AS.
        if atoms.get(i).is_some_and(|a| a.is_symbol('(')) {
            i = skip_balanced(atoms, i);
        }
        if !atoms.get(i).is_some_and(|a| a.is_word("AS")) {
            break;
        }
        i += 1;
        if !atoms.get(i).is_some_and(|a| a.is_symbol('(')) {
            break;
        }
        i = skip_balanced(atoms, i);

        if atoms.get(i).is_some_and(|a| a.is_symbol(',')) {
            i += 1;
            continue;
        }
        break;
    }

    names
}

/// Resolve an alias (or bare table name) against extracted references.
pub fn resolve_alias<'a>(refs: &'a [TableRef], alias: &str) -> Option<&'a str> {
    let needle = alias.to_lowercase();
    refs.iter()
        .find(|r| {
            r.alias.as_deref().is_some_and(|a| a.to_lowercase() == needle)
                || r.bare_name() == needle
        })
        .map(|r| r.name.as_str())
}
