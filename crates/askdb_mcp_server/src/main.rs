use askdb_core::{ConfigStore, EngineConfig, EngineError, ErrorKind};
use askdb_mcp_server::{AskDbServer, bench};
use rmcp::ServiceExt;
use rmcp::transport::stdio;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let code = match run(&args) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("askdb: {err}");
            exit_code(&err)
        }
    };
    std::process::exit(code);
}

fn run(args: &[String]) -> Result<(), EngineError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| EngineError::internal(format!("cannot start runtime: {e}")))?;

    let config = load_config()?;

    match args.get(1).map(String::as_str) {
        None | Some("serve") => runtime.block_on(serve(config)),
        Some("bench") => {
            let path = args
                .get(2)
                .ok_or_else(|| EngineError::config("usage: askdb bench <questions.json>"))?;
            let summary = runtime.block_on(bench::run(config, path))?;
            if summary.failed > 0 {
                return Err(EngineError::internal(format!(
                    "{} of {} questions failed",
                    summary.failed, summary.total
                )));
            }
            Ok(())
        }
        Some(other) => Err(EngineError::config(format!(
            "unknown command `{other}`; expected `serve` or `bench`"
        ))),
    }
}

fn load_config() -> Result<EngineConfig, EngineError> {
    ConfigStore::new()?.load()
}

async fn serve(config: EngineConfig) -> Result<(), EngineError> {
    log::info!("askdb MCP server starting on stdio");
    let service = AskDbServer::new(config)
        .serve(stdio())
        .await
        .map_err(|e| EngineError::internal(format!("stdio transport failed: {e}")))?;
    service
        .waiting()
        .await
        .map_err(|e| EngineError::internal(format!("server task failed: {e}")))?;
    Ok(())
}

/// CLI exit codes: 0 success, 1 configuration error, 2 external dependency
/// unavailable, 3 internal error.
fn exit_code(err: &EngineError) -> i32 {
    match err.kind() {
        ErrorKind::ConfigError => 1,
        ErrorKind::RetrievalUnavailable
        | ErrorKind::ConnectionError
        | ErrorKind::GenerationFailed => 2,
        _ => 3,
    }
}
