//! Application configuration management
//!
//! This module handles loading and validating configuration from environment variables.
//! Configuration is loaded once in `main` and handed to every component explicitly.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_DATABASE_MAX_CONNECTIONS, DEFAULT_HIDDEN_PATHS, DEFAULT_MAX_FILE_SIZE_BYTES,
    DEFAULT_MAX_PARALLEL_EXECUTIONS, DEFAULT_MAX_PROCESSES, DEFAULT_MEMORY_LIMIT_MB,
    DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_SANDBOX_PATH, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT,
    DEFAULT_TIME_LIMIT_SECONDS, MAX_TIME_LIMIT_SECONDS,
};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub sandbox: SandboxConfig,
    pub grading: GradingConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    /// Emit JSON log lines instead of the human-readable format
    pub json_logs: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// JWT authentication configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
}

/// Which isolation mechanism runs submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxBackend {
    /// One OS process per test case with rlimits
    Process,
    /// One throw-away Docker container per test case
    Docker,
}

impl FromStr for SandboxBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "docker" => Ok(Self::Docker),
            _ => Err(ConfigError::InvalidValue("SANDBOX_BACKEND".to_string())),
        }
    }
}

/// Sandbox configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub backend: SandboxBackend,
    /// Python interpreter (resolved through `path` in the process backend)
    pub python_bin: String,
    /// Node.js interpreter
    pub node_bin: String,
    /// PATH visible to sandboxed processes
    pub path: String,
    /// Parent directory for per-execution workdirs
    pub work_root: PathBuf,
    /// Run process-backend children in fresh user, mount, network, IPC and
    /// UTS namespaces. Needs unprivileged user namespaces on the host.
    pub isolation: bool,
    /// Host directories masked with an empty tmpfs when `isolation` is on
    pub hidden_paths: Vec<PathBuf>,
    pub memory_limit_mb: u64,
    pub output_limit_bytes: usize,
    /// RLIMIT_NPROC in the process backend (0 = unset); pids limit in docker
    pub max_processes: u64,
    pub max_file_size_bytes: u64,
    pub docker_socket: String,
}

/// Grading pipeline configuration
#[derive(Debug, Clone)]
pub struct GradingConfig {
    /// Used when an exercise carries no positive time limit
    pub default_time_limit_seconds: f64,
    /// Upper clamp applied to every exercise time limit
    pub max_time_limit_seconds: f64,
    /// Test cases executed concurrently within one request (1 = sequential)
    pub max_parallel_executions: usize,
    /// Numeric tolerance for output comparison; `None` means exact
    pub float_tolerance: Option<f64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            jwt: JwtConfig::from_env()?,
            sandbox: SandboxConfig::from_env()?,
            grading: GradingConfig::from_env()?,
        })
    }
}

/// Read an optional variable and parse it, falling back to `default`.
fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            port: parse_or("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            json_logs: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL".to_string()))?,
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS)?,
        })
    }
}

impl RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        })
    }
}

impl JwtConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret: env::var("JWT_SECRET")
                .map_err(|_| ConfigError::Missing("JWT_SECRET".to_string()))?,
        })
    }
}

/// Split a comma-separated path list, dropping empty entries
fn parse_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn default_hidden_paths() -> Vec<PathBuf> {
    DEFAULT_HIDDEN_PATHS.iter().map(PathBuf::from).collect()
}

impl SandboxConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            backend: parse_or("SANDBOX_BACKEND", SandboxBackend::Process)?,
            python_bin: env::var("PYTHON_BIN").unwrap_or_else(|_| "python3".to_string()),
            node_bin: env::var("NODE_BIN").unwrap_or_else(|_| "node".to_string()),
            path: env::var("SANDBOX_PATH").unwrap_or_else(|_| DEFAULT_SANDBOX_PATH.to_string()),
            work_root: env::var("SANDBOX_WORK_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            isolation: parse_or("SANDBOX_ISOLATION", true)?,
            hidden_paths: env::var("SANDBOX_HIDDEN_PATHS")
                .map(|raw| parse_paths(&raw))
                .unwrap_or_else(|_| default_hidden_paths()),
            memory_limit_mb: parse_or("SANDBOX_MEMORY_LIMIT_MB", DEFAULT_MEMORY_LIMIT_MB)?,
            output_limit_bytes: parse_or("OUTPUT_LIMIT_BYTES", DEFAULT_OUTPUT_LIMIT_BYTES)?,
            max_processes: parse_or("SANDBOX_MAX_PROCESSES", DEFAULT_MAX_PROCESSES)?,
            max_file_size_bytes: parse_or("SANDBOX_MAX_FILE_SIZE_BYTES", DEFAULT_MAX_FILE_SIZE_BYTES)?,
            docker_socket: env::var("DOCKER_SOCKET")
                .unwrap_or_else(|_| "/var/run/docker.sock".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the process backend cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_limit_mb == 0 {
            return Err(ConfigError::InvalidValue("SANDBOX_MEMORY_LIMIT_MB".to_string()));
        }
        if !self.isolation {
            return Ok(());
        }
        if !self.work_root.is_absolute() {
            return Err(ConfigError::InvalidValue("SANDBOX_WORK_ROOT".to_string()));
        }
        // A masked ancestor would hide the workdir from its own process
        let hides_workdir = self
            .hidden_paths
            .iter()
            .any(|hidden| !hidden.is_absolute() || self.work_root.starts_with(hidden));
        if hides_workdir {
            return Err(ConfigError::InvalidValue("SANDBOX_HIDDEN_PATHS".to_string()));
        }
        Ok(())
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxBackend::Process,
            python_bin: "python3".to_string(),
            node_bin: "node".to_string(),
            path: DEFAULT_SANDBOX_PATH.to_string(),
            work_root: env::temp_dir(),
            isolation: true,
            hidden_paths: default_hidden_paths(),
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            max_processes: DEFAULT_MAX_PROCESSES,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            docker_socket: "/var/run/docker.sock".to_string(),
        }
    }
}

impl GradingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let float_tolerance = match env::var("FLOAT_TOLERANCE") {
            Ok(raw) if !raw.trim().is_empty() => {
                let tolerance: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("FLOAT_TOLERANCE".to_string()))?;
                if !tolerance.is_finite() || tolerance < 0.0 {
                    return Err(ConfigError::InvalidValue("FLOAT_TOLERANCE".to_string()));
                }
                Some(tolerance)
            }
            _ => None,
        };

        let max_parallel_executions =
            parse_or("MAX_PARALLEL_EXECUTIONS", DEFAULT_MAX_PARALLEL_EXECUTIONS)?;
        if max_parallel_executions == 0 {
            return Err(ConfigError::InvalidValue("MAX_PARALLEL_EXECUTIONS".to_string()));
        }

        let config = Self {
            default_time_limit_seconds: parse_or(
                "DEFAULT_TIME_LIMIT_SECONDS",
                DEFAULT_TIME_LIMIT_SECONDS,
            )?,
            max_time_limit_seconds: parse_or("MAX_TIME_LIMIT_SECONDS", MAX_TIME_LIMIT_SECONDS)?,
            max_parallel_executions,
            float_tolerance,
        };
        config.validate()?;
        Ok(config)
    }

    /// Time limits end up in `Duration::from_secs_f64`, which panics on
    /// negative, NaN or overflowing values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let usable = |secs: f64| secs.is_finite() && secs > 0.0 && secs <= u32::MAX as f64;
        if !usable(self.default_time_limit_seconds) {
            return Err(ConfigError::InvalidValue("DEFAULT_TIME_LIMIT_SECONDS".to_string()));
        }
        if !usable(self.max_time_limit_seconds) {
            return Err(ConfigError::InvalidValue("MAX_TIME_LIMIT_SECONDS".to_string()));
        }
        Ok(())
    }
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            default_time_limit_seconds: DEFAULT_TIME_LIMIT_SECONDS,
            max_time_limit_seconds: MAX_TIME_LIMIT_SECONDS,
            max_parallel_executions: DEFAULT_MAX_PARALLEL_EXECUTIONS,
            float_tolerance: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}
