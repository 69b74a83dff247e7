//! MCP stdio surface: the `ask_database` tool, the role-gated raw SQL tool,
//! and the `schema://` resources.

use std::sync::Arc;

use askdb_core::{AskRequest, EngineConfig, EngineError, ValidateOptions, validate};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ServerHandler, schemars, tool, tool_handler, tool_router};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::bootstrap::EngineState;

#[derive(Clone)]
pub struct AskDbServer {
    config: EngineConfig,
    state: Arc<OnceCell<EngineState>>,
    tool_router: ToolRouter<Self>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AskDatabaseParams {
    #[schemars(description = "Natural-language question answered with a single SELECT")]
    pub question: String,

    #[schemars(description = "Row cap for the result (default 100, max 1000)")]
    #[serde(default)]
    pub max_rows: Option<u32>,

    #[schemars(description = "End-to-end deadline in milliseconds")]
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[schemars(description = "Include per-stage timings and attempt details")]
    #[serde(default)]
    pub trace: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RunSqlParams {
    #[schemars(description = "A single read-only SELECT statement")]
    pub sql: String,

    #[schemars(description = "Row cap for the result (default 100, max 1000)")]
    #[serde(default)]
    pub max_rows: Option<u32>,
}

impl AskDbServer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: Arc::new(OnceCell::new()),
            tool_router: Self::tool_router(),
        }
    }

    /// Test constructor with a pre-wired engine.
    pub fn with_state(config: EngineConfig, state: EngineState) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(state);
        Self {
            config,
            state: Arc::new(cell),
            tool_router: Self::tool_router(),
        }
    }

    /// The engine, connected on first use.
    async fn engine(&self) -> Result<&EngineState, ErrorData> {
        self.state
            .get_or_try_init(|| EngineState::connect(self.config.clone()))
            .await
            .map_err(to_tool_error)
    }
}

fn to_tool_error(err: EngineError) -> ErrorData {
    ErrorData::internal_error(err.to_string(), None)
}

fn json_content(value: &impl serde::Serialize) -> CallToolResult {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    CallToolResult::success(vec![Content::text(text)])
}

#[tool_router]
impl AskDbServer {
    #[tool(
        name = "ask_database",
        description = "Answer a natural-language question by generating, validating, and \
                       executing a single read-only SELECT. Returns the rows, the SQL, the \
                       tables used, and a confidence score."
    )]
    async fn ask_database(
        &self,
        Parameters(params): Parameters<AskDatabaseParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let engine = self.engine().await?;
        let request = AskRequest {
            question: params.question,
            max_rows: params.max_rows,
            timeout_ms: params.timeout_ms,
            trace: params.trace.unwrap_or(false),
        };
        let response = engine.orchestrator.ask(request).await;
        Ok(json_content(&response))
    }

    #[tool(
        name = "run_sql",
        description = "Execute one raw read-only SELECT statement. Disabled unless the \
                       server is configured with allow_raw_sql."
    )]
    async fn run_sql(
        &self,
        Parameters(params): Parameters<RunSqlParams>,
    ) -> Result<CallToolResult, ErrorData> {
        if !self.config.allow_raw_sql {
            return Err(ErrorData::invalid_request(
                "raw SQL execution is disabled; set allow_raw_sql to enable it",
                None,
            ));
        }

        let engine = self.engine().await?;
        let options = ValidateOptions {
            allowed_tables: None,
            default_limit: self.config.default_max_rows,
            limit_ceiling: self.config.max_rows_ceiling,
            function_blocklist: &self.config.function_blocklist,
        };
        let validation = validate(&params.sql, &options);
        if let Some(violation) = validation.fail_fast() {
            return Err(ErrorData::invalid_request(violation.message.clone(), None));
        }

        let max_rows = params
            .max_rows
            .unwrap_or(self.config.default_max_rows)
            .min(self.config.max_rows_ceiling);
        let result = engine
            .executor
            .execute(&validation.sql, max_rows)
            .await
            .map_err(to_tool_error)?;

        Ok(json_content(&serde_json::json!({
            "rows": result.rows,
            "row_count": result.row_count,
            "truncated": result.truncated,
        })))
    }
}

const TABLES_URI: &str = "schema://tables";
const TABLE_URI_PREFIX: &str = "schema://tables/";
const TABLE_URI_SUFFIX: &str = "/schema";

#[tool_handler]
impl ServerHandler for AskDbServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(
            ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
        )
        .with_protocol_version(ProtocolVersion::V_2024_11_05)
        .with_server_info(Implementation::new("askdb", env!("CARGO_PKG_VERSION")))
        .with_instructions(
            "Natural-language database answering. Use ask_database for questions; \
             read schema://tables for the machine-readable schema catalog.",
        )
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        let engine = self.engine().await?;
        let mut resources = vec![RawResource::new(TABLES_URI, "tables").no_annotation()];
        for table in engine.retriever.index().tables() {
            let uri = format!("{TABLE_URI_PREFIX}{}{TABLE_URI_SUFFIX}", table.table_name);
            resources.push(RawResource::new(uri, table.table_name.clone()).no_annotation());
        }
        Ok(ListResourcesResult {
            meta: None,
            resources,
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let engine = self.engine().await?;
        let index = engine.retriever.index();

        if request.uri == TABLES_URI {
            let catalog: Vec<serde_json::Value> = index
                .tables()
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "schema": t.schema_name,
                        "table": t.table_name,
                        "module": t.module,
                        "gloss": t.gloss,
                    })
                })
                .collect();
            let text = serde_json::to_string_pretty(&catalog)
                .unwrap_or_else(|_| "[]".to_string());
            return Ok(ReadResourceResult::new(vec![ResourceContents::text(
                text,
                request.uri,
            )]));
        }

        let table_name = request
            .uri
            .strip_prefix(TABLE_URI_PREFIX)
            .and_then(|rest| rest.strip_suffix(TABLE_URI_SUFFIX))
            .ok_or_else(|| {
                ErrorData::resource_not_found(format!("unknown resource {}", request.uri), None)
            })?;

        let table = index.table(table_name).ok_or_else(|| {
            ErrorData::resource_not_found(format!("unknown table {table_name}"), None)
        })?;

        let columns: Vec<serde_json::Value> = index
            .columns(&table.table_name)
            .iter()
            .map(|c| {
                serde_json::json!({
                    "column": c.column_name,
                    "type": c.data_type,
                    "nullable": c.is_nullable,
                    "primary_key": c.is_primary_key,
                    "foreign_key": c.is_foreign_key,
                    "fk_target_table": c.fk_target_table,
                    "fk_target_column": c.fk_target_column,
                    "gloss": c.gloss,
                })
            })
            .collect();

        let detail = serde_json::json!({
            "schema": table.schema_name,
            "table": table.table_name,
            "module": table.module,
            "gloss": table.gloss,
            "columns": columns,
        });
        let text = serde_json::to_string_pretty(&detail).unwrap_or_else(|_| "{}".to_string());
        Ok(ReadResourceResult::new(vec![ResourceContents::text(
            text,
            request.uri,
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_test_support::{FakeExecutor, ScriptedGenerator, fixtures};
    use std::sync::Arc;

    fn server(allow_raw_sql: bool) -> (AskDbServer, Arc<ScriptedGenerator>, Arc<FakeExecutor>) {
        let generator = Arc::new(ScriptedGenerator::new());
        let executor = Arc::new(FakeExecutor::new());
        let config = EngineConfig {
            allow_raw_sql,
            ..Default::default()
        };
        let state = EngineState::from_parts(
            config.clone(),
            fixtures::demo_retriever(),
            generator.clone(),
            executor.clone(),
        );
        (
            AskDbServer::with_state(config, state),
            generator,
            executor,
        )
    }

    fn result_text(result: &CallToolResult) -> String {
        result.content[0]
            .as_text()
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn ask_database_returns_the_pipeline_response() {
        let (server, generator, executor) = server(false);
        generator.push_generate_sql("SELECT COUNT(*) AS n FROM accounts LIMIT 1");
        executor.set_rows(vec![serde_json::json!({"n": 12})]);

        let result = server
            .ask_database(Parameters(AskDatabaseParams {
                question: "How many records are in the accounts table?".to_string(),
                max_rows: None,
                timeout_ms: None,
                trace: None,
            }))
            .await
            .unwrap();

        let text = result_text(&result);
        let payload: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(payload["executed"], true);
        assert_eq!(payload["tables_used"][0], "accounts");
        assert_eq!(payload["row_count"], 1);
    }

    #[tokio::test]
    async fn run_sql_is_gated_by_configuration() {
        let (server, _generator, _executor) = server(false);
        let err = server
            .run_sql(Parameters(RunSqlParams {
                sql: "SELECT 1".to_string(),
                max_rows: None,
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("disabled"));
    }

    #[tokio::test]
    async fn run_sql_rejects_writes_even_when_enabled() {
        let (server, _generator, _executor) = server(true);
        let err = server
            .run_sql(Parameters(RunSqlParams {
                sql: "DROP TABLE accounts".to_string(),
                max_rows: None,
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("not allowed"));
    }

    #[tokio::test]
    async fn run_sql_appends_the_row_limit() {
        let (server, _generator, executor) = server(true);
        executor.set_rows(vec![serde_json::json!({"email": "a@example.com"})]);

        let result = server
            .run_sql(Parameters(RunSqlParams {
                sql: "SELECT email FROM accounts".to_string(),
                max_rows: Some(50),
            }))
            .await
            .unwrap();

        let executed = executor.executed_sql();
        assert_eq!(executed[0].0, "SELECT email FROM accounts LIMIT 100");
        assert_eq!(executed[0].1, 50);
        assert!(result_text(&result).contains("row_count"));
    }
}
