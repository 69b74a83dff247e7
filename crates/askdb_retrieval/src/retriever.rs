//! Question-relevant schema selection.
//!
//! Dual retrieval over table and column embeddings inside routed modules,
//! reciprocal-rank fusion, FK expansion with a strict cap, and deterministic
//! ordering. Returns a fresh immutable packet per request.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use askdb_core::{Embedder, EngineConfig, EngineError, PacketTable, SchemaPacket};

use crate::embedding::cosine;
use crate::index::SchemaIndex;
use crate::packet::render_compact_ddl;
use crate::router::{expand_glossary, route_modules};

const RRF_K: f64 = 60.0;
const GENERIC_DOWNWEIGHT: f64 = 0.7;
const HUB_BONUS: f64 = 0.003;
const EXPANSION_CAP: usize = 3;
const EXPANSION_SCORE_FACTOR: f64 = 0.5;
const TOP_N_CEILING: usize = 20;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_n: usize,
    /// Cosine floor below which a table does not count as matched.
    pub min_score_floor: f64,
    pub allowed_modules: Vec<String>,
}

impl RetrievalConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            top_n: config.retrieval_top_n.min(TOP_N_CEILING),
            min_score_floor: config.min_score_floor,
            allowed_modules: config.allowed_modules.clone(),
        }
    }
}

pub struct SchemaRetriever {
    index: Arc<SchemaIndex>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

#[derive(Debug, Clone)]
struct ScoredTable {
    name: String,
    module: String,
    score: f64,
}

impl SchemaRetriever {
    pub fn new(index: Arc<SchemaIndex>, embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    pub fn index(&self) -> &SchemaIndex {
        &self.index
    }

    /// Select the schema packet for one question.
    ///
    /// Fails with `NoRelevantSchema` when nothing clears the similarity
    /// floor; the orchestrator turns that into a refusal instead of letting
    /// the generator guess at tables.
    pub async fn retrieve(&self, question: &str) -> Result<SchemaPacket, EngineError> {
        let expanded = expand_glossary(question, self.index.glossary());
        let question_vector = self.embed_question(&expanded).await?;

        let modules = route_modules(
            &self.index,
            &expanded,
            &question_vector,
            &self.config.allowed_modules,
        );
        let module_set: HashSet<&str> = modules.iter().map(|m| m.name.as_str()).collect();
        log::debug!(
            "routed question to modules {:?}",
            modules.iter().map(|m| &m.name).collect::<Vec<_>>()
        );

        let candidates: Vec<&askdb_core::SchemaTable> = self
            .index
            .tables()
            .iter()
            .filter(|t| module_set.contains(t.module.as_str()))
            .collect();

        let table_sims = self.table_similarities(&candidates, &question_vector);
        let column_sims = self.column_similarities(&candidates, &question_vector);

        let mut fused = self.fuse(&candidates, &table_sims, &column_sims);
        if fused.is_empty() {
            return Err(EngineError::NoRelevantSchema);
        }

        self.expand_foreign_keys(&mut fused, &expanded, &question_vector);

        sort_deterministic(&mut fused);
        fused.truncate(self.config.top_n);

        Ok(self.build_packet(fused))
    }

    async fn embed_question(&self, question: &str) -> Result<Vec<f32>, EngineError> {
        let mut vectors = self.embedder.embed(&[question.to_string()]).await?;
        if vectors.is_empty() {
            return Err(EngineError::RetrievalUnavailable(
                "embedding service returned no vector".to_string(),
            ));
        }
        Ok(vectors.remove(0))
    }

    fn table_similarities(
        &self,
        candidates: &[&askdb_core::SchemaTable],
        question_vector: &[f32],
    ) -> HashMap<String, f64> {
        candidates
            .iter()
            .filter_map(|t| {
                self.index
                    .table_vector(&t.table_name)
                    .map(|v| (t.table_name.clone(), cosine(question_vector, v)))
            })
            .collect()
    }

    /// Best column similarity per table, generic columns downweighted.
    fn column_similarities(
        &self,
        candidates: &[&askdb_core::SchemaTable],
        question_vector: &[f32],
    ) -> HashMap<String, f64> {
        let mut best: HashMap<String, f64> = HashMap::new();
        for table in candidates {
            for column in self.index.columns(&table.table_name) {
                let Some(vector) = self
                    .index
                    .column_vector(&table.table_name, &column.column_name)
                else {
                    continue;
                };
                let mut sim = cosine(question_vector, vector);
                if column.is_generic {
                    sim *= GENERIC_DOWNWEIGHT;
                }
                let entry = best.entry(table.table_name.clone()).or_insert(0.0);
                if sim > *entry {
                    *entry = sim;
                }
            }
        }
        best
    }

    /// Reciprocal-rank fusion of the two similarity lists, with the hub
    /// bonus, keeping only tables that clear the floor on either side.
    fn fuse(
        &self,
        candidates: &[&askdb_core::SchemaTable],
        table_sims: &HashMap<String, f64>,
        column_sims: &HashMap<String, f64>,
    ) -> Vec<ScoredTable> {
        let table_ranks = rank_map(table_sims);
        let column_ranks = rank_map(column_sims);

        candidates
            .iter()
            .filter_map(|table| {
                let table_sim = table_sims.get(&table.table_name).copied().unwrap_or(0.0);
                let column_sim = column_sims.get(&table.table_name).copied().unwrap_or(0.0);
                if table_sim < self.config.min_score_floor
                    && column_sim < self.config.min_score_floor
                {
                    return None;
                }

                let mut score = 0.0;
                if let Some(rank) = table_ranks.get(&table.table_name) {
                    score += 1.0 / (RRF_K + *rank as f64);
                }
                if let Some(rank) = column_ranks.get(&table.table_name) {
                    score += 1.0 / (RRF_K + *rank as f64);
                }
                if table.is_hub {
                    score += HUB_BONUS;
                }

                Some(ScoredTable {
                    name: table.table_name.clone(),
                    module: table.module.clone(),
                    score,
                })
            })
            .collect()
    }

    /// Walk FK edges (undirected, visited set) from the retained tables.
    /// A neighbor joins only when one of its columns is itself matched by
    /// the question, which keeps high-degree hubs from riding in for free.
    fn expand_foreign_keys(
        &self,
        fused: &mut Vec<ScoredTable>,
        question: &str,
        question_vector: &[f32],
    ) {
        let mut selected: HashSet<String> = fused.iter().map(|t| t.name.to_lowercase()).collect();
        let mut added = 0usize;

        let mut ordered = fused.clone();
        sort_deterministic(&mut ordered);

        for entry in ordered {
            if added >= EXPANSION_CAP {
                break;
            }
            for neighbor in self.index.neighbors(&entry.name) {
                if added >= EXPANSION_CAP {
                    break;
                }
                let key = neighbor.to_lowercase();
                if selected.contains(&key) {
                    continue;
                }
                let Some(neighbor_table) = self.index.table(neighbor) else {
                    continue;
                };
                if !self.question_matches_any_column(neighbor, question, question_vector) {
                    continue;
                }
                selected.insert(key);
                added += 1;
                fused.push(ScoredTable {
                    name: neighbor_table.table_name.clone(),
                    module: neighbor_table.module.clone(),
                    score: entry.score * EXPANSION_SCORE_FACTOR,
                });
            }
        }
    }

    fn question_matches_any_column(
        &self,
        table: &str,
        question: &str,
        question_vector: &[f32],
    ) -> bool {
        let question_words: HashSet<String> = question
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 3)
            .map(String::from)
            .collect();

        for column in self.index.columns(table) {
            if let Some(vector) = self.index.column_vector(table, &column.column_name)
                && cosine(question_vector, vector) >= self.config.min_score_floor
            {
                return true;
            }
            let lexical_hit = column
                .column_name
                .to_lowercase()
                .split('_')
                .any(|part| part.len() >= 4 && question_words.contains(part));
            if lexical_hit && !column.is_generic {
                return true;
            }
        }
        false
    }

    fn build_packet(&self, selected: Vec<ScoredTable>) -> SchemaPacket {
        let selected_names: HashSet<String> =
            selected.iter().map(|t| t.name.to_lowercase()).collect();

        let mut modules: Vec<String> = selected.iter().map(|t| t.module.clone()).collect();
        modules.sort();
        modules.dedup();

        let edges = self
            .index
            .edges()
            .iter()
            .filter(|e| {
                selected_names.contains(&e.from_table.to_lowercase())
                    && selected_names.contains(&e.to_table.to_lowercase())
            })
            .cloned()
            .collect();

        let tables = selected
            .into_iter()
            .filter_map(|scored| {
                let table = self.index.table(&scored.name)?.clone();
                let columns = self.index.columns(&scored.name).to_vec();
                let compact_ddl = render_compact_ddl(&table, &columns);
                Some(PacketTable {
                    table,
                    columns,
                    compact_ddl,
                    score: scored.score,
                })
            })
            .collect();

        SchemaPacket {
            tables,
            modules,
            edges,
        }
    }
}

/// 1-based ranks, highest similarity first, names breaking ties.
fn rank_map(sims: &HashMap<String, f64>) -> HashMap<String, usize> {
    let mut ordered: Vec<(&String, &f64)> = sims.iter().collect();
    ordered.sort_by(|a, b| {
        b.1.partial_cmp(a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, (name, _))| (name.clone(), i + 1))
        .collect()
}

/// Tie order: score desc, module asc, table name asc.
fn sort_deterministic(tables: &mut [ScoredTable]) {
    tables.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.module.cmp(&b.module))
            .then_with(|| a.name.cmp(&b.name))
    });
}
