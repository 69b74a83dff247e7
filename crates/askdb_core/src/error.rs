use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kinds surfaced in tool responses.
///
/// Each kind maps to one row of the error taxonomy: a stable string name and
/// a recoverability flag. Repairable kinds drive the repair loop; everything
/// else is surfaced to the caller immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RetrievalUnavailable,
    NoRelevantSchema,
    GenerationFailed,
    ValidationFailFast,
    SyntaxError,
    UnknownTable,
    UnknownColumn,
    TypeMismatch,
    PermissionDenied,
    ConnectionError,
    ResourceExhausted,
    ServerInternal,
    DeadlineExceeded,
    ExecutionError,
    ConfigError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetrievalUnavailable => "retrieval_unavailable",
            Self::NoRelevantSchema => "no_relevant_schema",
            Self::GenerationFailed => "generation_failed",
            Self::ValidationFailFast => "validation_fail_fast",
            Self::SyntaxError => "syntax_error",
            Self::UnknownTable => "unknown_table",
            Self::UnknownColumn => "unknown_column",
            Self::TypeMismatch => "type_mismatch",
            Self::PermissionDenied => "permission_denied",
            Self::ConnectionError => "connection_error",
            Self::ResourceExhausted => "resource_exhausted",
            Self::ServerInternal => "server_internal",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::ExecutionError => "execution_error",
            Self::ConfigError => "config_error",
            Self::InternalError => "internal_error",
        }
    }

    /// Whether the repair loop (or an external caller retry) can make progress.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Self::GenerationFailed
                | Self::SyntaxError
                | Self::UnknownTable
                | Self::UnknownColumn
                | Self::TypeMismatch
        )
    }
}

/// Structured information extracted from a database error.
///
/// The repair controller classifies on `sqlstate`; `position` (1-based byte
/// offset into the statement) is kept when the server reports one so repair
/// prompts can point at the offending token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbErrorInfo {
    pub sqlstate: Option<String>,
    pub message: String,
    pub position: Option<u32>,
}

impl DbErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }
}

impl std::fmt::Display for DbErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sqlstate {
            Some(code) => write!(f, "{} (SQLSTATE {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Coarse classification of database failures, derived from SQLSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorClass {
    Syntax,
    UndefinedTable,
    UndefinedColumn,
    TypeMismatch,
    Ambiguity,
    Permission,
    Connection,
    ResourceExhausted,
    Internal,
    Other,
}

impl DbErrorClass {
    /// Map a SQLSTATE code onto a class. Unknown codes fall through to
    /// `Other` so they surface as uncategorized execution errors.
    pub fn from_sqlstate(code: &str) -> Self {
        match code {
            "42601" => Self::Syntax,
            "42P01" => Self::UndefinedTable,
            "42703" => Self::UndefinedColumn,
            "42804" | "42883" | "22P02" => Self::TypeMismatch,
            "42702" | "42725" | "42P09" => Self::Ambiguity,
            "42501" => Self::Permission,
            _ => match &code[..code.len().min(2)] {
                "28" => Self::Permission,
                "08" => Self::Connection,
                "53" | "57" => Self::ResourceExhausted,
                "XX" => Self::Internal,
                "42" => Self::Syntax,
                _ => Self::Other,
            },
        }
    }

    /// Whether the repair loop should attempt another generation round.
    pub fn repairable(&self) -> bool {
        matches!(
            self,
            Self::Syntax
                | Self::UndefinedTable
                | Self::UndefinedColumn
                | Self::TypeMismatch
                | Self::Ambiguity
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax | Self::Ambiguity => ErrorKind::SyntaxError,
            Self::UndefinedTable => ErrorKind::UnknownTable,
            Self::UndefinedColumn => ErrorKind::UnknownColumn,
            Self::TypeMismatch => ErrorKind::TypeMismatch,
            Self::Permission => ErrorKind::PermissionDenied,
            Self::Connection => ErrorKind::ConnectionError,
            Self::ResourceExhausted => ErrorKind::ResourceExhausted,
            Self::Internal => ErrorKind::ServerInternal,
            Self::Other => ErrorKind::ExecutionError,
        }
    }
}

/// A classified database failure: the raw server info plus its class.
#[derive(Debug, Clone)]
pub struct DbFailure {
    pub info: DbErrorInfo,
    pub class: DbErrorClass,
}

impl DbFailure {
    pub fn new(info: DbErrorInfo) -> Self {
        let class = info
            .sqlstate
            .as_deref()
            .map(DbErrorClass::from_sqlstate)
            .unwrap_or(DbErrorClass::Connection);
        Self { info, class }
    }
}

impl std::fmt::Display for DbFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.info)
    }
}

/// Pipeline errors.
///
/// Every internal API returns this type; only the server layer converts it
/// into a response payload. `kind()` and `recoverable()` give the taxonomy
/// view, so callers never match on variants to classify.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The embedding service could not be reached.
    #[error("embedding service unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Retrieval found no table scoring above the relevance floor.
    #[error("no schema relevant to the question was found")]
    NoRelevantSchema,

    /// Every generation call of an attempt failed.
    #[error("SQL generation failed: {0}")]
    GenerationFailed(String),

    /// A safety rule was violated; never repaired.
    #[error("query refused: {0}")]
    ValidationFailFast(String),

    /// A classified database failure from probe or execution.
    #[error("{0}")]
    Database(DbFailure),

    /// The overall request deadline fired.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// Bad configuration file, option, or environment override.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invariant breakage inside the engine.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RetrievalUnavailable(_) => ErrorKind::RetrievalUnavailable,
            Self::NoRelevantSchema => ErrorKind::NoRelevantSchema,
            Self::GenerationFailed(_) => ErrorKind::GenerationFailed,
            Self::ValidationFailFast(_) => ErrorKind::ValidationFailFast,
            Self::Database(failure) => failure.class.kind(),
            Self::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Self::Config(_) => ErrorKind::ConfigError,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    pub fn recoverable(&self) -> bool {
        self.kind().recoverable()
    }

    /// Access the database failure, if this error carries one.
    pub fn db_failure(&self) -> Option<&DbFailure> {
        match self {
            Self::Database(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
