/// Heuristic signals read from the question text.
///
/// These never gate correctness on their own; they feed candidate scoring
/// and the write-intent pre-classifier.
#[derive(Debug, Clone, Default)]
pub struct QuestionIntent {
    /// "top", "highest", "most", ... — the answer should be ordered and cut.
    pub superlative: bool,
    /// "by year", "per country", "each region" — a GROUP BY is expected.
    pub grouping: bool,
    /// The question asks for a data modification; such requests are refused
    /// before any generation call.
    pub write_verb: Option<String>,
}

const SUPERLATIVE_WORDS: &[&str] = &[
    "top", "highest", "lowest", "largest", "smallest", "biggest", "most", "least", "best", "worst",
    "maximum", "minimum", "first", "last",
];

const WRITE_VERBS: &[&str] = &[
    "insert", "update", "delete", "remove", "drop", "truncate", "alter", "create", "grant",
    "revoke",
];

pub fn classify_question(question: &str) -> QuestionIntent {
    let lower = question.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let superlative = words.iter().any(|w| SUPERLATIVE_WORDS.contains(w));
    let grouping = words
        .windows(2)
        .any(|pair| pair[0] == "by" || pair[0] == "per" || pair[0] == "each")
        || lower.contains("break down")
        || lower.contains("breakdown");

    // Only a leading imperative counts; "who deleted the file" is a read.
    let write_verb = words
        .first()
        .filter(|w| WRITE_VERBS.contains(w))
        .map(|w| w.to_string());

    QuestionIntent {
        superlative,
        grouping,
        write_verb,
    }
}

#[cfg(test)]
mod tests {
    use super::classify_question;

    #[test]
    fn detects_superlative() {
        assert!(classify_question("Top company by revenue in 2020").superlative);
        assert!(classify_question("which product sold the most?").superlative);
        assert!(!classify_question("how many accounts are there").superlative);
    }

    #[test]
    fn detects_grouping() {
        assert!(classify_question("total revenue by year").grouping);
        assert!(classify_question("average order value per customer").grouping);
        assert!(!classify_question("how many records are in accounts").grouping);
    }

    #[test]
    fn leading_write_verb_is_flagged() {
        let intent = classify_question("Insert a new customer named Acme");
        assert_eq!(intent.write_verb.as_deref(), Some("insert"));
    }

    #[test]
    fn write_verb_mid_sentence_is_not_flagged() {
        assert!(
            classify_question("who deleted the most files last week")
                .write_verb
                .is_none()
        );
    }
}
