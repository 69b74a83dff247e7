mod config;
mod error;
mod fingerprint;
mod intent;
mod lint;
mod normalize;
mod request;
mod schema;
mod services;
pub mod tokenizer;
mod validator;

pub use config::{ConfigStore, EngineConfig, apply_env_overrides};
pub use error::{DbErrorClass, DbErrorInfo, DbFailure, EngineError, ErrorKind};
pub use fingerprint::fingerprint;
pub use intent::{QuestionIntent, classify_question};
pub use lint::{LintIssue, LintReport, LintRule, SqlShape, analyze_shape, autocorrect, lint};
pub use normalize::normalize_sql;
pub use request::{AskRequest, QueryResponse, ResponseError};
pub use schema::{
    ForeignKeyEdge, PacketTable, SchemaColumn, SchemaPacket, SchemaTable, is_generic_column,
};
pub use services::{
    Embedder, ExecutedQuery, GenerateRequest, GenerationOutput, GenerationService, QueryExecutor,
    RepairDbError, RepairRequest,
};
pub use validator::{
    DANGEROUS_KEYWORDS, RuleAction, RuleCode, TableRef, Validation, ValidateOptions, Violation,
    cte_names, extract_table_refs, resolve_alias, validate,
};
