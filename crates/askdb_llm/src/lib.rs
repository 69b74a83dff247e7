mod client;
mod difficulty;
mod fanout;
mod prompt;

pub use client::HttpGenerationClient;
pub use difficulty::{Difficulty, classify_difficulty, k_for};
pub use fanout::{generate_candidates, temperature_for};
pub use prompt::{PromptComposer, RepairDelta};
