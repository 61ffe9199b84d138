//! Docker-backed sandbox
//!
//! One throw-away container per execution: no network, capped memory and
//! pids, files injected through base64 so arbitrary content survives the
//! shell. The container is force-removed whatever the outcome.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use bollard::{
    Docker,
    container::LogOutput,
    exec::{CreateExecOptions, StartExecResults},
    models::ContainerCreateBody,
    query_parameters::{CreateContainerOptionsBuilder, RemoveContainerOptionsBuilder},
};
use futures::StreamExt;

use super::{Sandbox, SandboxError, SandboxOutput, SandboxRequest, validate_relative_path};
use crate::{config::SandboxConfig, constants::DEFAULT_CONTAINER_PIDS_LIMIT};

const WORKDIR: &str = "/workspace";

/// Exit status GNU/BusyBox `timeout` reports when it killed the command
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Runs each execution in a fresh container
pub struct DockerSandbox {
    docker: Docker,
    config: SandboxConfig,
}

impl DockerSandbox {
    /// Create a new docker sandbox
    pub fn new(docker: Docker, config: SandboxConfig) -> Self {
        Self { docker, config }
    }

    fn pids_limit(&self) -> i64 {
        match self.config.max_processes {
            0 => DEFAULT_CONTAINER_PIDS_LIMIT as i64,
            n => n.min(i64::MAX as u64) as i64,
        }
    }

    /// Create and start a container for one execution
    async fn create_container(&self, request: &SandboxRequest) -> Result<String, SandboxError> {
        let container_name = format!("exercisejudge-{}", request.execution_id);

        let options = CreateContainerOptionsBuilder::default()
            .name(&container_name)
            .build();

        let memory_bytes = (request.memory_limit_mb * 1024 * 1024) as i64;
        let host_config = bollard::models::HostConfig {
            memory: Some(memory_bytes),
            memory_swap: Some(memory_bytes),
            cpu_period: Some(100000),
            cpu_quota: Some(100000), // 1 CPU
            network_mode: Some("none".to_string()), // No network access
            pids_limit: Some(self.pids_limit()),
            readonly_rootfs: Some(false),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(request.image.clone()),
            tty: Some(true),
            open_stdin: Some(true),
            network_disabled: Some(true),
            host_config: Some(host_config),
            working_dir: Some(WORKDIR.to_string()),
            env: Some(vec!["LANG=C.UTF-8".to_string()]),
            labels: Some({
                let mut labels = HashMap::new();
                labels.insert("exercisejudge.execution".to_string(), request.execution_id.clone());
                labels
            }),
            ..Default::default()
        };

        let container = self.docker.create_container(Some(options), body).await?;

        self.docker
            .start_container(&container.id, None::<bollard::query_parameters::StartContainerOptions>)
            .await?;

        Ok(container.id)
    }

    /// Remove a container
    async fn remove_container(&self, container_id: &str) {
        let options = RemoveContainerOptionsBuilder::default().force(true).build();

        if let Err(e) = self.docker.remove_container(container_id, Some(options)).await {
            tracing::warn!(container_id, error = %e, "Failed to remove sandbox container");
        }
    }

    /// Write a file to the container
    async fn write_file(&self, container_id: &str, path: &str, content: &str) -> Result<(), SandboxError> {
        // Use base64 to handle special characters
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, content);
        let cmd = format!(
            "mkdir -p \"$(dirname '{WORKDIR}/{path}')\" && echo '{encoded}' | base64 -d > '{WORKDIR}/{path}'"
        );

        let result = self.exec_command(container_id, &cmd, usize::MAX).await?;
        if result.exit_code != Some(0) {
            return Err(SandboxError::Docker(format!(
                "failed to write '{}': {}",
                path, result.stderr
            )));
        }

        Ok(())
    }

    /// Execute a shell command in the container, capturing at most `limit` bytes per stream
    async fn exec_command(
        &self,
        container_id: &str,
        cmd: &str,
        limit: usize,
    ) -> Result<SandboxOutput, SandboxError> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(vec!["/bin/sh", "-c", cmd]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(WORKDIR),
                    ..Default::default()
                },
            )
            .await?;

        let output = self.docker.start_exec(&exec.id, None).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut truncated = false;

        if let StartExecResults::Attached { mut output, .. } = output {
            while let Some(msg) = output.next().await {
                let (buffer, message) = match msg? {
                    LogOutput::StdOut { message } => (&mut stdout, message),
                    LogOutput::StdErr { message } => (&mut stderr, message),
                    _ => continue,
                };
                if buffer.len() + message.len() > limit {
                    let room = limit - buffer.len();
                    buffer.extend_from_slice(&message[..room]);
                    truncated = true;
                    // Removing the container kills whatever is still writing
                    break;
                }
                buffer.extend_from_slice(&message);
            }
        }

        let exit_code = if truncated {
            None
        } else {
            let inspect = self.docker.inspect_exec(&exec.id).await?;
            inspect.exit_code.map(|c| c as i32)
        };

        Ok(SandboxOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
            timed_out: false,
            output_truncated: truncated,
            execution_time_ms: 0, // Measured by caller
        })
    }

    async fn run_in_container(
        &self,
        container_id: &str,
        request: &SandboxRequest,
    ) -> Result<SandboxOutput, SandboxError> {
        for (path, contents) in &request.files {
            self.write_file(container_id, path, contents).await?;
        }

        let command = request
            .command
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ");
        let run_cmd = format!(
            "timeout -s KILL {:.3}s {}",
            request.time_limit.as_secs_f64(),
            command
        );

        let start = Instant::now();
        // Outer deadline in case the daemon stops streaming
        let outer = request.time_limit + std::time::Duration::from_secs(2);
        let result = tokio::time::timeout(
            outer,
            self.exec_command(container_id, &run_cmd, self.config.output_limit_bytes),
        )
        .await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let mut output = match result {
            Ok(output) => output?,
            Err(_) => SandboxOutput {
                timed_out: true,
                ..Default::default()
            },
        };

        // `timeout -s KILL` reports 137 on some platforms, 124 on others
        if matches!(output.exit_code, Some(TIMEOUT_EXIT_CODE) | Some(137))
            && execution_time_ms as u128 >= request.time_limit.as_millis()
        {
            output.timed_out = true;
            output.exit_code = None;
        }
        output.execution_time_ms = execution_time_ms;

        Ok(output)
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn run(&self, request: SandboxRequest) -> Result<SandboxOutput, SandboxError> {
        if request.command.is_empty() {
            return Err(SandboxError::InvalidRequest("empty command".to_string()));
        }
        for (path, _) in &request.files {
            validate_relative_path(path)?;
        }

        let container_id = self.create_container(&request).await?;
        tracing::debug!(
            execution_id = %request.execution_id,
            container_id = %container_id,
            image = %request.image,
            "Created sandbox container"
        );

        let result = self.run_in_container(&container_id, &request).await;
        self.remove_container(&container_id).await;

        result
    }
}

/// Single-quote an argument for `/bin/sh`
fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}
