//! Question preprocessing and module routing.

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::embedding::cosine;
use crate::index::{ModuleInfo, SchemaIndex};

/// Replace glossary abbreviations with their expansions, whole words only.
pub fn expand_glossary(question: &str, glossary: &[(String, String)]) -> String {
    let mut out = Vec::new();
    for word in question.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
        let lower = trimmed.to_lowercase();
        match glossary.iter().find(|(abbr, _)| *abbr == lower) {
            Some((_, expansion)) if !trimmed.is_empty() => {
                out.push(word.replace(trimmed, expansion));
            }
            _ => out.push(word.to_string()),
        }
    }
    out.join(" ")
}

/// A routed module with its combined keyword + centroid score.
#[derive(Debug, Clone)]
pub struct ModuleScore {
    pub name: String,
    pub score: f64,
}

const MODULE_SCORE_THRESHOLD: f64 = 0.25;
const MAX_MODULES: usize = 3;

/// Score every module and keep the ones above the threshold, at least one
/// and at most three. The keyword side uses fuzzy word matching so plural
/// and inflected forms still hit; the vector side compares the question
/// against the module centroid.
pub fn route_modules(
    index: &SchemaIndex,
    question: &str,
    question_vector: &[f32],
    allowed_modules: &[String],
) -> Vec<ModuleScore> {
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<ModuleScore> = index
        .modules()
        .iter()
        .filter(|m| allowed_modules.is_empty() || allowed_modules.contains(&m.name))
        .map(|module| ModuleScore {
            name: module.name.clone(),
            score: combined_score(&matcher, module, question, question_vector),
        })
        .collect();

    // Deterministic: score desc, then name asc.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    let above: Vec<ModuleScore> = scored
        .iter()
        .filter(|m| m.score >= MODULE_SCORE_THRESHOLD)
        .take(MAX_MODULES)
        .cloned()
        .collect();

    if above.is_empty() {
        scored.into_iter().take(1).collect()
    } else {
        above
    }
}

fn combined_score(
    matcher: &SkimMatcherV2,
    module: &ModuleInfo,
    question: &str,
    question_vector: &[f32],
) -> f64 {
    let question_lower = question.to_lowercase();

    let mut hits = 0usize;
    for keyword in &module.keywords {
        // Scale the fuzzy score by keyword length so short keywords cannot
        // match on scattered characters.
        let threshold = (keyword.len() as i64) * 12;
        if matcher
            .fuzzy_match(&question_lower, keyword)
            .is_some_and(|s| s >= threshold)
        {
            hits += 1;
        }
    }
    let keyword_score = (hits as f64 / 2.0).min(1.0);

    let centroid_score = cosine(question_vector, &module.centroid).max(0.0);

    0.6 * keyword_score + 0.4 * centroid_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_core::SchemaTable;

    fn table(name: &str, module: &str) -> SchemaTable {
        SchemaTable {
            schema_name: "public".to_string(),
            table_name: name.to_string(),
            module: module.to_string(),
            gloss: None,
            fk_degree: 0,
            is_hub: false,
            fingerprint: String::new(),
        }
    }

    fn index() -> SchemaIndex {
        SchemaIndex::builder()
            .table(table("companies", "finance"))
            .table(table("employees", "hr"))
            .table_vector("companies", vec![1.0, 0.0])
            .table_vector("employees", vec![0.0, 1.0])
            .module_keywords("finance", &["revenue", "company", "profit"])
            .module_keywords("hr", &["employee", "salary", "hire"])
            .glossary_entry("rev", "revenue")
            .build()
    }

    #[test]
    fn expands_abbreviations_whole_word() {
        let index = index();
        let expanded = expand_glossary("total rev by year", index.glossary());
        assert_eq!(expanded, "total revenue by year");
        let untouched = expand_glossary("revenue trend", index.glossary());
        assert_eq!(untouched, "revenue trend");
    }

    #[test]
    fn routes_to_keyword_matching_module() {
        let index = index();
        let modules = route_modules(&index, "company revenue in 2020", &[1.0, 0.0], &[]);
        assert_eq!(modules[0].name, "finance");
    }

    #[test]
    fn always_returns_at_least_one_module() {
        let index = index();
        let modules = route_modules(&index, "unrelated gibberish", &[0.0, 0.0], &[]);
        assert_eq!(modules.len(), 1);
    }

    #[test]
    fn respects_allowed_modules_filter() {
        let index = index();
        let allowed = vec!["hr".to_string()];
        let modules = route_modules(&index, "company revenue", &[1.0, 0.0], &allowed);
        assert!(modules.iter().all(|m| m.name == "hr"));
    }
}
