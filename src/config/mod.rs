use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listening port (default: 3000)
    pub port: u16,

    /// Directory holding uploads and derived files while a request runs (default: "uploads")
    pub storage_dir: PathBuf,

    /// Directory served at the root path (default: "public")
    pub public_dir: PathBuf,

    /// External encrypt/decrypt executable (default: "file-encryptor")
    pub transform_tool: String,

    /// Arguments placed before `<encrypt|decrypt> <input> <output>` (default: none)
    pub transform_tool_args: Vec<String>,

    /// Upper bound on a single tool run (default: 300 s)
    pub transform_timeout: Duration,

    /// Maximum upload size in bytes (default: 256 MB)
    pub max_file_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            storage_dir: PathBuf::from("uploads"),
            public_dir: PathBuf::from("public"),
            transform_tool: "file-encryptor".to_string(),
            transform_tool_args: Vec::new(),
            transform_timeout: Duration::from_secs(300),
            max_file_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            storage_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.storage_dir),

            public_dir: env::var("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.public_dir),

            transform_tool: env::var("TRANSFORM_TOOL").unwrap_or(default.transform_tool),

            transform_tool_args: env::var("TRANSFORM_TOOL_ARGS")
                .map(|v| split_args(&v))
                .unwrap_or(default.transform_tool_args),

            transform_timeout: env::var("TRANSFORM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.transform_timeout),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),
        }
    }

    /// Config for local runs and tests: small limits, short timeout
    pub fn development() -> Self {
        Self {
            transform_timeout: Duration::from_secs(30),
            max_file_size: 16 * 1024 * 1024,
            ..Self::default()
        }
    }
}

/// Splits a whitespace separated argument list. No quoting rules apply.
fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
