use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Engine configuration.
///
/// Precedence: environment variables > local override file > default file >
/// built-in defaults. Unknown options in either file are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    /// PostgreSQL connection string for both user data and the schema index.
    pub database_url: String,

    /// Base URL of the generation service (`/generate_sql`, `/repair_sql`,
    /// `/embed`).
    pub generation_url: String,

    /// Tag recorded with every embedding row; rows with a different tag are
    /// considered stale.
    pub embedding_model: String,

    /// SQL dialect name passed to the generator and used by autocorrect.
    pub dialect: String,

    /// Parallel candidates per difficulty tier.
    pub k_easy: u32,
    pub k_medium: u32,
    pub k_hard: u32,

    /// Attempt budget, counting the initial generation as attempt 1.
    pub max_attempts: u32,

    /// Statement timeout for EXPLAIN probes.
    pub probe_timeout_ms: u64,

    /// Statement timeout for the final execution.
    pub execute_timeout_ms: u64,

    /// Timeout for one generation or embedding HTTP call.
    pub call_timeout_ms: u64,

    /// End-to-end deadline for a request when the caller sets none.
    pub request_timeout_ms: u64,

    /// LIMIT appended when a candidate has none.
    pub default_max_rows: u32,

    /// Hard ceiling; larger LIMITs are capped to this.
    pub max_rows_ceiling: u32,

    /// Connections kept in the shared pool.
    pub pool_size: usize,

    /// Tables returned by retrieval (capped at 20).
    pub retrieval_top_n: usize,

    /// Fused-score floor below which retrieval reports no relevant schema.
    pub min_score_floor: f64,

    /// FK-degree at which a table counts as a hub and earns a score bonus.
    pub hub_degree_threshold: u32,

    /// Restrict retrieval to these modules; empty means all.
    pub allowed_modules: Vec<String>,

    /// Function names (lowercase) the validator refuses outright.
    pub function_blocklist: Vec<String>,

    /// Expose the role-gated raw SQL tool.
    pub allow_raw_sql: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost:5432/askdb".to_string(),
            generation_url: "http://127.0.0.1:8089".to_string(),
            embedding_model: "askdb-embed-v1".to_string(),
            dialect: "postgresql".to_string(),
            k_easy: 2,
            k_medium: 4,
            k_hard: 6,
            max_attempts: 3,
            probe_timeout_ms: 2_000,
            execute_timeout_ms: 30_000,
            call_timeout_ms: 15_000,
            request_timeout_ms: 60_000,
            default_max_rows: 100,
            max_rows_ceiling: 1_000,
            pool_size: 8,
            retrieval_top_n: 8,
            min_score_floor: 0.18,
            hub_degree_threshold: 4,
            allowed_modules: Vec::new(),
            function_blocklist: default_function_blocklist(),
            allow_raw_sql: false,
        }
    }
}

fn default_function_blocklist() -> Vec<String> {
    [
        "pg_read_file",
        "pg_read_binary_file",
        "pg_ls_dir",
        "pg_stat_file",
        "pg_sleep",
        "pg_terminate_backend",
        "pg_cancel_backend",
        "pg_reload_conf",
        "lo_import",
        "lo_export",
        "dblink",
        "dblink_exec",
        "set_config",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl EngineConfig {
    /// Identifier sent to the generation service and used to key the
    /// embeddings index: the database name from the connection string.
    pub fn database_id(&self) -> String {
        self.database_url
            .rsplit('/')
            .next()
            .map(|tail| tail.split('?').next().unwrap_or(tail))
            .filter(|name| !name.is_empty())
            .unwrap_or("default")
            .to_string()
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_attempts == 0 {
            return Err(EngineError::config("max_attempts must be at least 1"));
        }
        if self.pool_size == 0 {
            return Err(EngineError::config("pool_size must be at least 1"));
        }
        if self.default_max_rows > self.max_rows_ceiling {
            return Err(EngineError::config(
                "default_max_rows cannot exceed max_rows_ceiling",
            ));
        }
        if self.retrieval_top_n == 0 || self.retrieval_top_n > 20 {
            return Err(EngineError::config(
                "retrieval_top_n must be between 1 and 20",
            ));
        }
        Ok(())
    }
}

/// Loads configuration with the documented precedence.
pub struct ConfigStore {
    default_path: PathBuf,
    override_path: PathBuf,
}

impl ConfigStore {
    pub fn new() -> Result<Self, EngineError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| EngineError::config("could not determine config directory"))?;
        Ok(Self {
            default_path: config_dir.join("askdb").join("config.json"),
            override_path: PathBuf::from("askdb.local.json"),
        })
    }

    pub fn with_paths(default_path: PathBuf, override_path: PathBuf) -> Self {
        Self {
            default_path,
            override_path,
        }
    }

    pub fn load(&self) -> Result<EngineConfig, EngineError> {
        let mut merged = serde_json::to_value(EngineConfig::default())
            .map_err(|e| EngineError::internal(e.to_string()))?;

        for path in [&self.default_path, &self.override_path] {
            if let Some(layer) = read_layer(path)? {
                merge_objects(&mut merged, layer);
            }
        }

        let mut config: EngineConfig = serde_json::from_value(merged)
            .map_err(|e| EngineError::config(format!("invalid configuration: {e}")))?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }
}

fn read_layer(path: &Path) -> Result<Option<serde_json::Value>, EngineError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .map_err(|e| EngineError::config(format!("cannot read {}: {e}", path.display())))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| EngineError::config(format!("malformed {}: {e}", path.display())))?;
    if !value.is_object() {
        return Err(EngineError::config(format!(
            "{} must contain a JSON object",
            path.display()
        )));
    }
    Ok(Some(value))
}

fn merge_objects(base: &mut serde_json::Value, layer: serde_json::Value) {
    if let (Some(base_map), serde_json::Value::Object(layer_map)) = (base.as_object_mut(), layer) {
        for (key, value) in layer_map {
            base_map.insert(key, value);
        }
    }
}

/// Apply `ASKDB_*` environment overrides. The lookup is injected so tests
/// never touch the process environment.
pub fn apply_env_overrides(
    config: &mut EngineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), EngineError> {
    fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, EngineError> {
        raw.parse()
            .map_err(|_| EngineError::config(format!("invalid value for {key}: {raw}")))
    }

    if let Some(v) = lookup("ASKDB_DATABASE_URL") {
        config.database_url = v;
    }
    if let Some(v) = lookup("ASKDB_GENERATION_URL") {
        config.generation_url = v;
    }
    if let Some(v) = lookup("ASKDB_EMBEDDING_MODEL") {
        config.embedding_model = v;
    }
    if let Some(v) = lookup("ASKDB_DIALECT") {
        config.dialect = v;
    }
    if let Some(v) = lookup("ASKDB_MAX_ATTEMPTS") {
        config.max_attempts = parse("ASKDB_MAX_ATTEMPTS", &v)?;
    }
    if let Some(v) = lookup("ASKDB_PROBE_TIMEOUT_MS") {
        config.probe_timeout_ms = parse("ASKDB_PROBE_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = lookup("ASKDB_EXECUTE_TIMEOUT_MS") {
        config.execute_timeout_ms = parse("ASKDB_EXECUTE_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = lookup("ASKDB_REQUEST_TIMEOUT_MS") {
        config.request_timeout_ms = parse("ASKDB_REQUEST_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = lookup("ASKDB_DEFAULT_MAX_ROWS") {
        config.default_max_rows = parse("ASKDB_DEFAULT_MAX_ROWS", &v)?;
    }
    if let Some(v) = lookup("ASKDB_POOL_SIZE") {
        config.pool_size = parse("ASKDB_POOL_SIZE", &v)?;
    }
    if let Some(v) = lookup("ASKDB_ALLOWED_MODULES") {
        config.allowed_modules = v
            .split(',')
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
    }
    if let Some(v) = lookup("ASKDB_ALLOW_RAW_SQL") {
        config.allow_raw_sql = parse("ASKDB_ALLOW_RAW_SQL", &v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn database_id_comes_from_the_connection_string() {
        let config = EngineConfig {
            database_url: "postgres://user:pw@host:5432/warehouse?sslmode=require".to_string(),
            ..Default::default()
        };
        assert_eq!(config.database_id(), "warehouse");
    }

    #[test]
    fn env_overrides_win() {
        let mut config = EngineConfig::default();
        apply_env_overrides(&mut config, |key| match key {
            "ASKDB_DATABASE_URL" => Some("postgres://db:5432/prod".to_string()),
            "ASKDB_MAX_ATTEMPTS" => Some("5".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.database_url, "postgres://db:5432/prod");
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn malformed_env_value_is_rejected() {
        let mut config = EngineConfig::default();
        let err = apply_env_overrides(&mut config, |key| {
            (key == "ASKDB_MAX_ATTEMPTS").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("ASKDB_MAX_ATTEMPTS"));
    }

    #[test]
    fn unknown_file_option_is_rejected() {
        let dir = std::env::temp_dir().join(format!("askdb-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{"no_such_option": true}"#).unwrap();

        let store = ConfigStore::with_paths(path.clone(), dir.join("none.json"));
        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("no_such_option"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn override_file_beats_default_file() {
        let dir = std::env::temp_dir().join(format!("askdb-config-ovr-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let default_path = dir.join("config.json");
        let override_path = dir.join("local.json");
        fs::write(&default_path, r#"{"k_easy": 1, "k_medium": 3}"#).unwrap();
        fs::write(&override_path, r#"{"k_medium": 9}"#).unwrap();

        let store = ConfigStore::with_paths(default_path, override_path);
        let config = store.load().unwrap();
        assert_eq!(config.k_easy, 1);
        assert_eq!(config.k_medium, 9);

        fs::remove_dir_all(&dir).ok();
    }
}
