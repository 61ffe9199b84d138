//! Application-wide constants
//!
//! This module contains all constant values used throughout the application.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// SERVER DEFAULTS
// =============================================================================

/// Default server host address
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

// =============================================================================
// DATABASE DEFAULTS
// =============================================================================

/// Default maximum database connections in the pool
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 20;

// =============================================================================
// SANDBOX DEFAULTS
// =============================================================================

/// Default memory ceiling per sandboxed process in megabytes
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 256;

/// Default cap on captured stdout/stderr per process (64 KiB)
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Default RLIMIT_NPROC for sandboxed processes (0 leaves it unset).
/// The kernel counts every thread of the uid, including the server's own
/// runtime threads, so only set it when the server runs as a dedicated user.
pub const DEFAULT_MAX_PROCESSES: u64 = 0;

/// pids limit for sandbox containers when `max_processes` is unset
pub const DEFAULT_CONTAINER_PIDS_LIMIT: u64 = 256;

/// Host directories replaced by an empty read-only tmpfs inside the process sandbox
pub const DEFAULT_HIDDEN_PATHS: &[&str] = &["/home", "/root", "/run", "/srv", "/mnt", "/media", "/var"];

/// RLIMIT_DATA headroom above the V8 heap flag for Node (stacks, buffers, code)
pub const NODE_DATA_HEADROOM_MB: u64 = 256;

/// Largest file a submission may write inside its workdir (1 MiB)
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 1024 * 1024;

/// PATH handed to sandboxed processes
pub const DEFAULT_SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Grace period for draining pipes after a sandboxed process was killed
pub const PIPE_DRAIN_GRACE_MS: u64 = 500;

/// Maximum characters of stderr surfaced in a test result error
pub const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

// =============================================================================
// GRADING DEFAULTS
// =============================================================================

/// Default time limit per test case in seconds
pub const DEFAULT_TIME_LIMIT_SECONDS: f64 = 5.0;

/// Maximum time limit per test case in seconds (to prevent abuse)
pub const MAX_TIME_LIMIT_SECONDS: f64 = 30.0;

/// Default number of test cases executed concurrently within one request
pub const DEFAULT_MAX_PARALLEL_EXECUTIONS: usize = 1;

/// Default points for a test case
pub const DEFAULT_TEST_CASE_POINTS: i32 = 1;

/// Maximum source code size in bytes (64 KiB)
pub const MAX_SOURCE_CODE_SIZE: usize = 64 * 1024;

/// `MAX_SOURCE_CODE_SIZE` for `validator` length rules
pub const MAX_SOURCE_CODE_LENGTH: u64 = MAX_SOURCE_CODE_SIZE as u64;

/// Maximum HTTP request body (source code plus JSON framing)
pub const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

// =============================================================================
// SUPPORTED LANGUAGES
// =============================================================================

/// Language identifiers
pub mod languages {
    pub const PYTHON: &str = "python";
    pub const JAVASCRIPT: &str = "javascript";
}

/// Container images for each language (docker sandbox backend)
pub mod container_images {
    pub const PYTHON: &str = "python:3.12-slim";
    pub const JAVASCRIPT: &str = "node:22-slim";
}

/// Files written into every sandbox workdir
pub mod sandbox_files {
    pub const ARGS: &str = "args.json";
}

// =============================================================================
// USER ROLES
// =============================================================================

/// User role identifiers
pub mod roles {
    pub const STUDENT: &str = "student";
    pub const INSTRUCTOR: &str = "instructor";
    pub const ADMIN: &str = "admin";
}

// =============================================================================
// API VERSIONING
// =============================================================================

/// API base path
pub const API_BASE_PATH: &str = "/api/v1";

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Rate limiting configuration
pub mod rate_limits {
    /// Run endpoint - max requests
    pub const RUN_MAX_REQUESTS: i64 = 30;
    /// Run endpoint - window in seconds
    pub const RUN_WINDOW_SECS: i64 = 60;

    /// Submit endpoint - max requests
    pub const SUBMIT_MAX_REQUESTS: i64 = 10;
    /// Submit endpoint - window in seconds
    pub const SUBMIT_WINDOW_SECS: i64 = 60;

    /// General API - max requests
    pub const GENERAL_MAX_REQUESTS: i64 = 100;
    /// General API - window in seconds
    pub const GENERAL_WINDOW_SECS: i64 = 60;
}

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for attempt history
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum page size for attempt history
pub const MAX_PAGE_SIZE: u32 = 100;
