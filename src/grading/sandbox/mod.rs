//! Isolated execution backends
//!
//! A [`Sandbox`] runs one command over a freshly materialized set of files
//! under a wall-clock deadline and output ceiling. It knows nothing about
//! languages or grading; the executor prepares the files and command.

pub mod docker;
pub mod process;

use std::time::Duration;

use async_trait::async_trait;

pub use docker::DockerSandbox;
pub use process::ProcessSandbox;

/// One sandboxed execution
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    /// Unique per execution; names the workdir/container
    pub execution_id: String,
    /// Files written into the workdir before running, as (relative path, contents)
    pub files: Vec<(String, String)>,
    /// Program followed by its arguments, run from inside the workdir
    pub command: Vec<String>,
    /// Image for container backends
    pub image: String,
    pub time_limit: Duration,
    pub memory_limit_mb: u64,
    /// How the process backend enforces `memory_limit_mb`
    pub memory_rlimit: MemoryRlimit,
}

/// Which rlimit carries the memory ceiling in the process backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRlimit {
    /// RLIMIT_AS at the memory limit
    AddressSpace,
    /// RLIMIT_DATA at the memory limit plus `headroom_mb`, for runtimes that
    /// reserve far more address space than they ever touch
    Data { headroom_mb: u64 },
}

/// Raw result of a sandboxed execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal or by us
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub output_truncated: bool,
    pub execution_time_ms: u64,
}

/// Infrastructure failures; the submitted code never causes these
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to prepare workdir: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while supervising process: {0}")]
    Io(#[from] std::io::Error),

    #[error("docker error: {0}")]
    Docker(String),

    #[error("invalid sandbox request: {0}")]
    InvalidRequest(String),
}

impl From<bollard::errors::Error> for SandboxError {
    fn from(err: bollard::errors::Error) -> Self {
        SandboxError::Docker(err.to_string())
    }
}

/// Isolation mechanism that runs one execution to completion
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(&self, request: SandboxRequest) -> Result<SandboxOutput, SandboxError>;
}

/// Reject paths that could escape the workdir
pub(crate) fn validate_relative_path(path: &str) -> Result<(), SandboxError> {
    let p = std::path::Path::new(path);
    let escapes = p.is_absolute()
        || p.components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));
    if path.is_empty() || escapes {
        return Err(SandboxError::InvalidRequest(format!(
            "file path '{}' must be relative to the workdir",
            path
        )));
    }
    Ok(())
}
