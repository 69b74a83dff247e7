mod audit;
mod evaluator;
mod orchestrator;
mod repair;

pub use audit::{AttemptRecord, AuditCounters, RequestAudit};
pub use evaluator::{Candidate, Evaluation, evaluate_candidates};
pub use orchestrator::Orchestrator;
pub use repair::{RepairContext, build_repair_context, parse_undefined_column};
