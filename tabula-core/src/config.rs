// Configuration for the Tabula server and clients

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Upper bound on `query.time_budget_ms`. Clients allow a single request
/// this long plus a margin before timing out.
pub const MAX_TIME_BUDGET_MS: u64 = 20_000;

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub bind_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            bind_port: 8080,
        }
    }
}

/// Query execution and polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// How long one `execute` call may wait on the engine before handing
    /// back a continuation token.
    pub time_budget_ms: u64,
    /// Fixed delay between client polls.
    pub poll_interval_ms: u64,
    /// Runs not polled for this long are aborted and forgotten.
    pub run_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Rows rendered before the output is truncated.
    pub render_row_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: 3_000,
            poll_interval_ms: 1_000,
            run_ttl_secs: 600,
            sweep_interval_secs: 30,
            render_row_limit: 10_000,
        }
    }
}

impl QueryConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn run_ttl(&self) -> Duration {
        Duration::from_secs(self.run_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Upload ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsConfig {
    /// Storage schema every uploaded table lives in.
    pub schema: String,
    pub max_file_bytes: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            schema: "uploads".to_string(),
            max_file_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete Tabula configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TabulaConfig {
    pub network: NetworkConfig,
    pub query: QueryConfig,
    pub uploads: UploadsConfig,
    pub logging: LoggingConfig,
}

impl TabulaConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        if path.ends_with(".toml") {
            return toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()));
        }
        if path.ends_with(".yaml") || path.ends_with(".yml") {
            return serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()));
        }
        Self::from_str(&content)
    }

    /// Load configuration from string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        // Try JSON first
        if let Ok(config) = serde_json::from_str::<TabulaConfig>(content) {
            return Ok(config);
        }

        // Try TOML
        if let Ok(config) = toml::from_str::<TabulaConfig>(content) {
            return Ok(config);
        }

        // Try YAML
        if let Ok(config) = serde_yaml::from_str::<TabulaConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError("Unknown format".to_string()))
    }

    /// Apply `TABULA_*` environment overrides on top of this configuration
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("TABULA_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                self.network.bind_port = p;
            }
        }

        if let Ok(host) = std::env::var("TABULA_HOST") {
            self.network.bind_address = host;
        }

        if let Ok(level) = std::env::var("TABULA_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(budget) = std::env::var("TABULA_TIME_BUDGET_MS") {
            if let Ok(ms) = budget.parse::<u64>() {
                self.query.time_budget_ms = ms;
            }
        }

        if let Ok(interval) = std::env::var("TABULA_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse::<u64>() {
                self.query.poll_interval_ms = ms;
            }
        }

        if let Ok(schema) = std::env::var("TABULA_UPLOADS_SCHEMA") {
            self.uploads.schema = schema;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.bind_port == 0 {
            return Err(ConfigError::ValidationError(
                "network.bind_port cannot be 0".to_string(),
            ));
        }

        if self.query.time_budget_ms == 0 || self.query.time_budget_ms > MAX_TIME_BUDGET_MS {
            return Err(ConfigError::ValidationError(format!(
                "query.time_budget_ms must be between 1 and {}",
                MAX_TIME_BUDGET_MS
            )));
        }

        if self.query.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "query.poll_interval_ms must be > 0".to_string(),
            ));
        }

        if self.query.run_ttl_secs == 0 || self.query.sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "query.run_ttl_secs and query.sweep_interval_secs must be > 0".to_string(),
            ));
        }

        if let Err(e) = crate::schema::validate_table_name(&self.uploads.schema) {
            return Err(ConfigError::ValidationError(format!("uploads.schema: {}", e)));
        }

        if self.uploads.max_file_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "uploads.max_file_bytes must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::Error {
    fn from(e: ConfigError) -> Self {
        crate::Error::Configuration(e.to_string())
    }
}
