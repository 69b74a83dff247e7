//! Difficulty classification driving the fan-out width.

use askdb_core::{EngineConfig, SchemaPacket, classify_question};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Classify from what is known before generation: the question shape and
/// how much schema retrieval pulled in.
pub fn classify_difficulty(question: &str, packet: &SchemaPacket) -> Difficulty {
    let intent = classify_question(question);
    let word_count = question.split_whitespace().count();
    let table_count = packet.tables.len();

    if table_count >= 4 || word_count > 18 {
        return Difficulty::Hard;
    }
    if table_count <= 1 && word_count <= 10 && !intent.grouping && !intent.superlative {
        return Difficulty::Easy;
    }
    Difficulty::Medium
}

pub fn k_for(difficulty: Difficulty, config: &EngineConfig) -> u32 {
    match difficulty {
        Difficulty::Easy => config.k_easy,
        Difficulty::Medium => config.k_medium,
        Difficulty::Hard => config.k_hard,
    }
}
