use std::env;
use std::path::PathBuf;

/// Diagnostics rerun policy
/// A failed case is only eligible when its recorded time and memory fit
/// under `min(ratio x submission limit, absolute cap)`.
#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub max_time_ratio: f64,
    /// Absolute time ceiling in milliseconds
    pub max_time_ms: u64,
    pub max_memory_ratio: f64,
    /// Absolute memory ceiling in KiB
    pub max_memory_kib: u64,
}

/// Daemon configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Submission source endpoint (consumed by the intake plumbing only)
    pub server_url: String,
    pub server_token: String,
    pub redis_url: String,
    /// Reserved for brokers that front the runner pool; unused by the core
    pub rabbitmq_url: Option<String>,
    /// Root directory of test-data packages
    pub test_data: PathBuf,
    /// Default task priority forwarded to the runner queue
    pub priority: u32,
    /// Scratch space for compile artifacts and preview reads
    pub temp_directory: PathBuf,
    /// Byte cap for input/output previews embedded in case details
    pub data_display_limit: usize,
    pub diagnostics: DiagnosticsConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_url: env::var("SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            server_token: env::var("SERVER_TOKEN").unwrap_or_default(),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            rabbitmq_url: env::var("RABBITMQ_URL").ok(),
            test_data: PathBuf::from(
                env::var("TEST_DATA").unwrap_or_else(|_| "testdata".to_string()),
            ),
            priority: env_parse("PRIORITY", 1),
            temp_directory: PathBuf::from(
                env::var("TEMP_DIRECTORY").unwrap_or_else(|_| "/tmp/minos".to_string()),
            ),
            data_display_limit: env_parse("DATA_DISPLAY_LIMIT", 512),
            diagnostics: DiagnosticsConfig {
                enabled: env_parse("DIAGNOSTICS_ENABLED", false),
                max_time_ratio: env_parse("DIAGNOSTICS_MAX_TIME_RATIO", 4.0),
                max_time_ms: env_parse("DIAGNOSTICS_MAX_TIME", 10_000),
                max_memory_ratio: env_parse("DIAGNOSTICS_MAX_MEMORY_RATIO", 4.0),
                max_memory_kib: env_parse("DIAGNOSTICS_MAX_MEMORY", 1_048_576),
            },
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
