//! Character-level SQL scanner.
//!
//! Separates code from string/comment/dollar-quoted regions so downstream
//! checks reason only over code. Every component that inspects SQL goes
//! through this module; nothing in the workspace scans raw SQL with string
//! matching.

/// The scanner state a token was produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    Normal,
    LineComment,
    BlockComment,
    SingleQuote,
    DoubleQuote,
    DollarQuote,
}

/// A maximal run of characters produced in one scanner state.
///
/// Concatenating `text` over a token stream reconstructs the input exactly.
#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    pub origin: TokenOrigin,
    /// Set on a literal or comment that reached end of input unclosed.
    pub unterminated: bool,
}

impl Token {
    pub fn is_code(&self) -> bool {
        self.origin == TokenOrigin::Normal
    }
}

enum State {
    Normal,
    LineComment,
    /// Block comments nest; depth counts unmatched `/*`.
    BlockComment(u32),
    SingleQuote,
    DoubleQuote,
    /// The tag between the dollar signs, including both delimiters.
    DollarQuote(String),
}

/// Scan `sql` into tokens annotated with their origin state.
pub fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let mut index = 0;

    let flush = |tokens: &mut Vec<Token>, text: &mut String, origin: TokenOrigin| {
        if !text.is_empty() {
            tokens.push(Token {
                text: std::mem::take(text),
                origin,
                unterminated: false,
            });
        }
    };

    while index < chars.len() {
        let ch = chars[index];
        let next = chars.get(index + 1).copied();

        match &mut state {
            State::Normal => {
                if ch == '-' && next == Some('-') {
                    flush(&mut tokens, &mut current, TokenOrigin::Normal);
                    current.push_str("--");
                    state = State::LineComment;
                    index += 2;
                    continue;
                }

                if ch == '/' && next == Some('*') {
                    flush(&mut tokens, &mut current, TokenOrigin::Normal);
                    current.push_str("/*");
                    state = State::BlockComment(1);
                    index += 2;
                    continue;
                }

                if ch == '\'' {
                    flush(&mut tokens, &mut current, TokenOrigin::Normal);
                    current.push(ch);
                    state = State::SingleQuote;
                    index += 1;
                    continue;
                }

                if ch == '"' {
                    flush(&mut tokens, &mut current, TokenOrigin::Normal);
                    current.push(ch);
                    state = State::DoubleQuote;
                    index += 1;
                    continue;
                }

                if ch == '$'
                    && let Some(tag) = dollar_tag(&chars, index)
                {
                    flush(&mut tokens, &mut current, TokenOrigin::Normal);
                    current.push_str(&tag);
                    index += tag.chars().count();
                    state = State::DollarQuote(tag);
                    continue;
                }

                current.push(ch);
                index += 1;
            }

            State::LineComment => {
                if ch == '\n' {
                    flush(&mut tokens, &mut current, TokenOrigin::LineComment);
                    current.push('\n');
                    state = State::Normal;
                } else {
                    current.push(ch);
                }
                index += 1;
            }

            State::BlockComment(depth) => {
                if ch == '/' && next == Some('*') {
                    *depth += 1;
                    current.push_str("/*");
                    index += 2;
                } else if ch == '*' && next == Some('/') {
                    *depth -= 1;
                    current.push_str("*/");
                    index += 2;
                    if *depth == 0 {
                        flush(&mut tokens, &mut current, TokenOrigin::BlockComment);
                        state = State::Normal;
                    }
                } else {
                    current.push(ch);
                    index += 1;
                }
            }

            State::SingleQuote => {
                current.push(ch);
                if ch == '\'' {
                    if next == Some('\'') {
                        current.push('\'');
                        index += 2;
                        continue;
                    }
                    flush(&mut tokens, &mut current, TokenOrigin::SingleQuote);
                    state = State::Normal;
                }
                index += 1;
            }

            State::DoubleQuote => {
                current.push(ch);
                if ch == '"' {
                    if next == Some('"') {
                        current.push('"');
                        index += 2;
                        continue;
                    }
                    flush(&mut tokens, &mut current, TokenOrigin::DoubleQuote);
                    state = State::Normal;
                }
                index += 1;
            }

            State::DollarQuote(tag) => {
                if ch == '$' && chars_match(&chars, index, tag) {
                    current.push_str(tag);
                    index += tag.chars().count();
                    flush(&mut tokens, &mut current, TokenOrigin::DollarQuote);
                    state = State::Normal;
                } else {
                    current.push(ch);
                    index += 1;
                }
            }
        }
    }

    // Whatever is left at end of input either closes cleanly (Normal, line
    // comment) or is an unterminated literal/comment.
    let (origin, unterminated) = match state {
        State::Normal => (TokenOrigin::Normal, false),
        State::LineComment => (TokenOrigin::LineComment, false),
        State::BlockComment(_) => (TokenOrigin::BlockComment, true),
        State::SingleQuote => (TokenOrigin::SingleQuote, true),
        State::DoubleQuote => (TokenOrigin::DoubleQuote, true),
        State::DollarQuote(_) => (TokenOrigin::DollarQuote, true),
    };
    if !current.is_empty() {
        tokens.push(Token {
            text: current,
            origin,
            unterminated,
        });
    }

    tokens
}

/// Whether any token ran off the end of the input unclosed.
pub fn has_unterminated(tokens: &[Token]) -> bool {
    tokens.iter().any(|t| t.unterminated)
}

/// Reassemble the original text from a token stream.
pub fn reconstruct(tokens: &[Token]) -> String {
    tokens.iter().map(|t| t.text.as_str()).collect()
}

/// Parse a `$tag$` opener at `index`. Returns the full delimiter including
/// both dollar signs, or `None` if this `$` does not start a dollar quote
/// (e.g. a positional parameter like `$1`).
fn dollar_tag(chars: &[char], index: usize) -> Option<String> {
    let mut tag = String::from('$');
    let mut i = index + 1;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '$' {
            tag.push('$');
            return Some(tag);
        }
        if ch.is_ascii_alphanumeric() || ch == '_' {
            tag.push(ch);
            i += 1;
        } else {
            return None;
        }
    }
    None
}

fn chars_match(chars: &[char], index: usize, needle: &str) -> bool {
    let mut i = index;
    for ch in needle.chars() {
        if chars.get(i) != Some(&ch) {
            return false;
        }
        i += 1;
    }
    true
}

/// Lexical atoms extracted from the code regions of a token stream.
///
/// Literals and quoted identifiers appear as single atoms so downstream
/// logic (validator, lint, normalizer) sees a uniform stream. `depth` is the
/// parenthesis nesting level; `offset` is the byte offset into the original
/// SQL, usable for in-place rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomKind {
    Word,
    QuotedIdent,
    Literal,
    Number,
    Symbol,
}

#[derive(Debug, Clone)]
pub struct CodeAtom {
    pub kind: AtomKind,
    /// For `QuotedIdent` this is the unescaped inner name; for everything
    /// else the original source text.
    pub text: String,
    pub upper: String,
    pub depth: u32,
    pub offset: usize,
    pub len: usize,
}

impl CodeAtom {
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == AtomKind::Word && self.upper == keyword
    }

    pub fn is_symbol(&self, symbol: char) -> bool {
        self.kind == AtomKind::Symbol && self.text.len() == 1 && self.text.starts_with(symbol)
    }

    /// Word or quoted identifier, as used in name positions.
    pub fn is_name(&self) -> bool {
        matches!(self.kind, AtomKind::Word | AtomKind::QuotedIdent)
    }
}

/// Split the code regions of a token stream into atoms.
pub fn code_atoms(tokens: &[Token]) -> Vec<CodeAtom> {
    let mut atoms = Vec::new();
    let mut depth: u32 = 0;
    let mut offset = 0usize;

    for token in tokens {
        match token.origin {
            TokenOrigin::Normal => {
                split_normal(&token.text, offset, &mut depth, &mut atoms);
            }
            TokenOrigin::DoubleQuote => {
                let inner = token
                    .text
                    .trim_start_matches('"')
                    .trim_end_matches('"')
                    .replace("\"\"", "\"");
                atoms.push(CodeAtom {
                    kind: AtomKind::QuotedIdent,
                    upper: inner.clone(),
                    text: inner,
                    depth,
                    offset,
                    len: token.text.len(),
                });
            }
            TokenOrigin::SingleQuote | TokenOrigin::DollarQuote => {
                atoms.push(CodeAtom {
                    kind: AtomKind::Literal,
                    text: token.text.clone(),
                    upper: String::new(),
                    depth,
                    offset,
                    len: token.text.len(),
                });
            }
            TokenOrigin::LineComment | TokenOrigin::BlockComment => {}
        }
        offset += token.text.len();
    }

    atoms
}

fn split_normal(text: &str, base: usize, depth: &mut u32, atoms: &mut Vec<CodeAtom>) {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let end = text.len();
    let byte_end = |idx: usize| chars.get(idx).map(|(o, _)| *o).unwrap_or(end);
    let mut i = 0;

    while i < chars.len() {
        let (start, ch) = chars[i];

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            while i < chars.len() {
                let c = chars[i].1;
                if c.is_alphanumeric() || c == '_' || c == '$' {
                    i += 1;
                } else {
                    break;
                }
            }
            let word = &text[start..byte_end(i)];
            atoms.push(CodeAtom {
                kind: AtomKind::Word,
                text: word.to_string(),
                upper: word.to_uppercase(),
                depth: *depth,
                offset: base + start,
                len: word.len(),
            });
            continue;
        }

        if ch.is_ascii_digit() {
            while i < chars.len() {
                let c = chars[i].1;
                if c.is_ascii_digit() || c == '.' {
                    i += 1;
                } else {
                    break;
                }
            }
            let num = &text[start..byte_end(i)];
            atoms.push(CodeAtom {
                kind: AtomKind::Number,
                text: num.to_string(),
                upper: num.to_string(),
                depth: *depth,
                offset: base + start,
                len: num.len(),
            });
            continue;
        }

        // Single-character symbol; parentheses adjust nesting so that the
        // opener sits at the outer depth and the closer at the restored one.
        let atom_depth = if ch == ')' {
            *depth = depth.saturating_sub(1);
            *depth
        } else {
            *depth
        };
        atoms.push(CodeAtom {
            kind: AtomKind::Symbol,
            text: ch.to_string(),
            upper: ch.to_string(),
            depth: atom_depth,
            offset: base + start,
            len: ch.len_utf8(),
        });
        if ch == '(' {
            *depth += 1;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_exactly() {
        let cases = [
            "SELECT * FROM users",
            "SELECT 'it''s' FROM t -- trailing\n",
            "/* outer /* inner */ still */ SELECT 1",
            "SELECT $$body$$, $tag$x$tag$ FROM t",
            "SELECT \"weird \"\"name\"\"\" FROM t;",
            "SELECT 1 -- no newline at end",
        ];
        for sql in cases {
            assert_eq!(reconstruct(&tokenize(sql)), sql, "case: {sql}");
        }
    }

    #[test]
    fn injection_text_stays_inside_the_literal() {
        let sql = "SELECT * FROM companies WHERE name = '''; DROP TABLE x; --'";
        let tokens = tokenize(sql);
        let literal: Vec<_> = tokens
            .iter()
            .filter(|t| t.origin == TokenOrigin::SingleQuote)
            .collect();
        assert_eq!(literal.len(), 1);
        assert!(literal[0].text.contains("DROP TABLE"));
        let code = tokens
            .iter()
            .filter(|t| t.is_code())
            .map(|t| t.text.as_str())
            .collect::<String>();
        assert!(!code.contains("DROP"));
    }

    #[test]
    fn flags_unterminated_literal() {
        let tokens = tokenize("SELECT 'oops FROM t");
        assert!(has_unterminated(&tokens));
        assert_eq!(reconstruct(&tokens), "SELECT 'oops FROM t");
    }

    #[test]
    fn flags_unterminated_block_comment() {
        assert!(has_unterminated(&tokenize("SELECT 1 /* open")));
    }

    #[test]
    fn dollar_quote_requires_closing_tag() {
        let tokens = tokenize("SELECT $fn$ body $other$ more");
        assert!(has_unterminated(&tokens));
    }

    #[test]
    fn positional_parameter_is_not_a_dollar_quote() {
        let tokens = tokenize("SELECT * FROM t WHERE id = $1");
        assert!(!has_unterminated(&tokens));
        assert!(tokens.iter().all(|t| t.is_code()));
    }

    #[test]
    fn atoms_carry_depth_and_offsets() {
        let sql = "SELECT a, SUM(b) FROM t LIMIT 5";
        let atoms = code_atoms(&tokenize(sql));
        let limit = atoms.iter().find(|a| a.is_word("LIMIT")).unwrap();
        assert_eq!(limit.depth, 0);
        let b = atoms.iter().find(|a| a.is_word("B")).unwrap();
        assert_eq!(b.depth, 1);
        let five = atoms.iter().find(|a| a.kind == AtomKind::Number).unwrap();
        assert_eq!(&sql[five.offset..five.offset + five.len], "5");
    }

    #[test]
    fn quoted_identifier_is_one_atom() {
        let atoms = code_atoms(&tokenize("SELECT \"the \"\"col\"\"\" FROM t"));
        let ident = atoms
            .iter()
            .find(|a| a.kind == AtomKind::QuotedIdent)
            .unwrap();
        assert_eq!(ident.text, "the \"col\"");
    }

    #[test]
    fn literal_atom_preserves_source_text() {
        let atoms = code_atoms(&tokenize("SELECT 'a''b' FROM t"));
        let lit = atoms.iter().find(|a| a.kind == AtomKind::Literal).unwrap();
        assert_eq!(lit.text, "'a''b'");
    }
}
