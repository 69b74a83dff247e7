pub mod bench;
mod bootstrap;
mod server;

pub use bootstrap::EngineState;
pub use server::{AskDatabaseParams, AskDbServer, RunSqlParams};
