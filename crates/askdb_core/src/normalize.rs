use crate::tokenizer::{AtomKind, code_atoms, tokenize};

/// Canonical form of a SQL string used for candidate deduplication.
///
/// Keywords and bare identifiers are lowercased, whitespace and comments
/// collapse to single spaces, quoted identifiers and literal values are
/// preserved verbatim, and a trailing semicolon is dropped. Normalizing a
/// normalized string is a no-op.
pub fn normalize_sql(sql: &str) -> String {
    let atoms = code_atoms(&tokenize(sql));
    let mut parts: Vec<String> = Vec::with_capacity(atoms.len());

    for atom in &atoms {
        let rendered = match atom.kind {
            AtomKind::Word => atom.text.to_lowercase(),
            AtomKind::QuotedIdent => format!("\"{}\"", atom.text.replace('"', "\"\"")),
            AtomKind::Literal | AtomKind::Number | AtomKind::Symbol => atom.text.clone(),
        };
        parts.push(rendered);
    }

    if parts.last().map(String::as_str) == Some(";") {
        parts.pop();
    }

    parts.join(" ")
}
