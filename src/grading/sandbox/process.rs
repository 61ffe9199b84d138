//! Process-per-execution sandbox
//!
//! Every execution gets a fresh temporary workdir and one OS process in its
//! own process group, with a cleared environment, stdin closed and rlimits
//! applied between fork and exec. With isolation on, the child also gets
//! fresh user, mount, network, IPC and UTS namespaces: no network
//! interfaces, the configured host directories masked by an empty tmpfs and
//! the shared work root showing only its own workdir. The wall-clock
//! deadline and output ceiling are enforced here by killing the whole group.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::mount::{MsFlags, mount};
use nix::sched::{CloneFlags, unshare};
use nix::sys::prctl;
use nix::sys::resource::{Resource, setrlimit};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, chdir};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::{
    MemoryRlimit, Sandbox, SandboxError, SandboxOutput, SandboxRequest, validate_relative_path,
};
use crate::{config::SandboxConfig, constants::PIPE_DRAIN_GRACE_MS};

/// Runs each execution as a local, resource-limited process
pub struct ProcessSandbox {
    config: SandboxConfig,
    isolation: Option<Isolation>,
}

impl ProcessSandbox {
    /// Create a new process sandbox.
    ///
    /// Also marks the calling process non-dumpable, which makes its
    /// `/proc/<pid>` entries (environ, mem) unreadable to the children.
    pub fn new(config: SandboxConfig) -> Self {
        if let Err(e) = prctl::set_dumpable(false) {
            tracing::warn!(error = %e, "Failed to mark supervisor non-dumpable");
        }

        let isolation = config.isolation.then(|| Isolation {
            masked: config
                .hidden_paths
                .iter()
                .filter(|path| path.is_dir())
                .cloned()
                .collect(),
            work_root: config.work_root.clone(),
        });

        Self { config, isolation }
    }

    /// Spawn a trivial command through the full isolation setup.
    /// Fails when the host refuses unprivileged namespaces.
    pub async fn check_isolation(&self) -> Result<(), SandboxError> {
        let output = self
            .run(SandboxRequest {
                execution_id: uuid::Uuid::new_v4().simple().to_string(),
                files: Vec::new(),
                command: vec!["true".to_string()],
                image: String::new(),
                time_limit: Duration::from_secs(5),
                memory_limit_mb: self.config.memory_limit_mb,
                memory_rlimit: MemoryRlimit::AddressSpace,
            })
            .await?;
        match output.exit_code {
            Some(0) => Ok(()),
            code => Err(SandboxError::InvalidRequest(format!(
                "isolation check exited with {:?}",
                code
            ))),
        }
    }
}

/// rlimits applied in the child before exec
#[derive(Debug, Clone, Copy)]
struct ResourceLimits {
    address_space_bytes: Option<u64>,
    data_bytes: Option<u64>,
    cpu_seconds: u64,
    file_size_bytes: u64,
    processes: Option<u64>,
}

impl ResourceLimits {
    fn for_request(request: &SandboxRequest, config: &SandboxConfig) -> Self {
        let mb = |n: u64| n.saturating_mul(1024 * 1024);
        let (address_space_bytes, data_bytes) = match request.memory_rlimit {
            MemoryRlimit::AddressSpace => (Some(mb(request.memory_limit_mb)), None),
            MemoryRlimit::Data { headroom_mb } => (
                None,
                Some(mb(request.memory_limit_mb.saturating_add(headroom_mb))),
            ),
        };

        Self {
            address_space_bytes,
            data_bytes,
            // Backstop only; the wall-clock deadline fires first for single-threaded code
            cpu_seconds: request.time_limit.as_secs_f64().ceil() as u64 + 1,
            file_size_bytes: config.max_file_size_bytes,
            processes: (config.max_processes > 0).then_some(config.max_processes),
        }
    }

    /// Runs between fork and exec: async-signal-safe calls only.
    fn apply(&self) -> std::io::Result<()> {
        if let Some(bytes) = self.address_space_bytes {
            setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
        }
        if let Some(bytes) = self.data_bytes {
            setrlimit(Resource::RLIMIT_DATA, bytes, bytes)?;
        }
        setrlimit(Resource::RLIMIT_CPU, self.cpu_seconds, self.cpu_seconds)?;
        setrlimit(Resource::RLIMIT_FSIZE, self.file_size_bytes, self.file_size_bytes)?;
        setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
        if let Some(n) = self.processes {
            setrlimit(Resource::RLIMIT_NPROC, n, n)?;
        }
        Ok(())
    }
}

/// Namespace setup applied in the child before exec
#[derive(Debug, Clone)]
struct Isolation {
    /// Existing host directories to cover with an empty tmpfs
    masked: Vec<PathBuf>,
    work_root: PathBuf,
}

impl Isolation {
    /// Runs between fork and exec, after the chdir into the workdir.
    /// Paths were resolved before the fork; only syscalls happen here.
    fn apply(&self) -> std::io::Result<()> {
        unshare(
            CloneFlags::CLONE_NEWUSER
                | CloneFlags::CLONE_NEWNS
                | CloneFlags::CLONE_NEWNET
                | CloneFlags::CLONE_NEWIPC
                | CloneFlags::CLONE_NEWUTS,
        )?;
        mount(
            None::<&str>,
            "/",
            None::<&str>,
            MsFlags::MS_REC | MsFlags::MS_PRIVATE,
            None::<&str>,
        )?;

        for path in &self.masked {
            mount(
                Some("tmpfs"),
                path.as_path(),
                Some("tmpfs"),
                MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC | MsFlags::MS_RDONLY,
                None::<&str>,
            )?;
        }

        // Sibling workdirs of concurrent executions disappear behind our own
        mount(
            Some("."),
            self.work_root.as_path(),
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None::<&str>,
        )?;
        chdir(self.work_root.as_path())?;
        Ok(())
    }
}

/// How the supervised process stopped
enum Ending {
    Exited(ExitStatus),
    OutputLimit,
    TimedOut,
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn run(&self, request: SandboxRequest) -> Result<SandboxOutput, SandboxError> {
        let (program, args) = request
            .command
            .split_first()
            .ok_or_else(|| SandboxError::InvalidRequest("empty command".to_string()))?;

        let workdir = tempfile::Builder::new()
            .prefix(&format!("exercisejudge-{}-", request.execution_id))
            .tempdir_in(&self.config.work_root)
            .map_err(SandboxError::Workspace)?;

        for (path, contents) in &request.files {
            validate_relative_path(path)?;
            let target = workdir.path().join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(SandboxError::Workspace)?;
            }
            tokio::fs::write(&target, contents)
                .await
                .map_err(SandboxError::Workspace)?;
        }

        let limits = ResourceLimits::for_request(&request, &self.config);

        // Under isolation the workdir is remounted at the work root
        let home = match &self.isolation {
            Some(isolation) => isolation.work_root.as_path(),
            None => workdir.path(),
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(workdir.path())
            .env_clear()
            .env("PATH", &self.config.path)
            .env("HOME", home)
            .env("LANG", "C.UTF-8")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);

        let isolation = self.isolation.clone();
        // SAFETY: the closure performs raw syscalls (unshare, mount, chdir,
        // setrlimit) on data prepared before the fork and never allocates.
        unsafe {
            command.pre_exec(move || {
                if let Some(isolation) = &isolation {
                    isolation.apply()?;
                }
                limits.apply()
            });
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| SandboxError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();

        tracing::debug!(
            execution_id = %request.execution_id,
            pid = ?pid,
            program = %program,
            "Spawned sandboxed process"
        );

        let overflow = Arc::new(Notify::new());
        let limit = self.config.output_limit_bytes;
        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(read_capped(pipe, limit, overflow.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(read_capped(pipe, limit, overflow.clone())));

        let ending = tokio::select! {
            biased;
            status = child.wait() => Ending::Exited(status?),
            _ = overflow.notified() => Ending::OutputLimit,
            _ = tokio::time::sleep(request.time_limit) => Ending::TimedOut,
        };
        let execution_time_ms = start.elapsed().as_millis() as u64;

        // Always take down the whole group: stray children must not outlive the test case
        if let Some(pid) = pid {
            kill_group(pid);
        }
        if !matches!(ending, Ending::Exited(_)) {
            let _ = child.wait().await;
        }

        let (stdout, stdout_truncated) = drain(stdout_task).await;
        let (stderr, stderr_truncated) = drain(stderr_task).await;

        let (exit_code, timed_out) = match ending {
            // CPU rlimit exhaustion is a time limit, not a crash
            Ending::Exited(status) => (
                status.code(),
                status.signal() == Some(Signal::SIGXCPU as i32),
            ),
            Ending::OutputLimit => (None, false),
            Ending::TimedOut => (None, true),
        };

        if timed_out {
            tracing::info!(
                execution_id = %request.execution_id,
                time_limit_ms = request.time_limit.as_millis() as u64,
                "Sandboxed process exceeded time limit"
            );
        }

        Ok(SandboxOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
            timed_out,
            output_truncated: stdout_truncated
                || stderr_truncated
                || matches!(ending, Ending::OutputLimit),
            execution_time_ms,
        })
        // `workdir` is removed on drop
    }
}

fn kill_group(pid: u32) {
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, error = %e, "Failed to kill sandbox process group"),
    }
}

/// Read a pipe to EOF, keeping at most `limit` bytes. Signals `overflow` and
/// stops reading as soon as the limit is crossed.
async fn read_capped<R>(mut reader: R, limit: usize, overflow: Arc<Notify>) -> (Vec<u8>, bool)
where
    R: AsyncRead + Unpin,
{
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return (captured, false),
            Ok(n) => n,
        };

        if captured.len() + n > limit {
            let room = limit - captured.len();
            captured.extend_from_slice(&chunk[..room]);
            overflow.notify_one();
            return (captured, true);
        }
        captured.extend_from_slice(&chunk[..n]);
    }
}

/// Collect a reader task, giving up if a leaked descendant keeps the pipe open.
async fn drain(task: Option<JoinHandle<(Vec<u8>, bool)>>) -> (Vec<u8>, bool) {
    let Some(task) = task else {
        return (Vec::new(), false);
    };
    let abort = task.abort_handle();

    match tokio::time::timeout(Duration::from_millis(PIPE_DRAIN_GRACE_MS), task).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Output reader task failed");
            (Vec::new(), false)
        }
        Err(_) => {
            abort.abort();
            (Vec::new(), false)
        }
    }
}
