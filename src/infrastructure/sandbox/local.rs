//! Local process sandbox provider.
//!
//! Realizes the sandbox contract with OS processes on this machine: each
//! sandbox is a scratch directory, each command a `sh -c` child in its own
//! process group. Pause/resume/kill deliver SIGSTOP/SIGCONT/SIGKILL to the
//! tracked groups. Used by tests and single-host deployments.

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::error::SandboxError;
use crate::domain::models::SandboxResources;
use crate::domain::ports::{
    CommandOutcome, CommandSpec, OutputHandler, OutputStream, SandboxProvider,
};

struct TrackedProcess {
    pid: i32,
    command: String,
}

#[derive(Default)]
struct LocalSandbox {
    workspace: PathBuf,
    paused: bool,
    processes: Vec<TrackedProcess>,
}

/// Provider state: one entry per live sandbox.
pub struct LocalProcessSandbox {
    workspace_root: PathBuf,
    sandboxes: Mutex<HashMap<String, LocalSandbox>>,
}

impl LocalProcessSandbox {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            sandboxes: Mutex::new(HashMap::new()),
        }
    }

    fn signal_group(pid: i32, signal: Signal) {
        if pid <= 0 {
            return;
        }
        if let Err(err) = killpg(Pid::from_raw(pid), signal) {
            // The group may have exited already; that is fine.
            debug!(pid, %signal, %err, "signal delivery skipped");
        }
    }

    async fn read_stream<R>(
        reader: R,
        stream: OutputStream,
        handler: Option<OutputHandler>,
    ) -> String
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        let mut collected = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(handler) = &handler {
                handler(stream, &line);
            }
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    }
}

#[async_trait]
impl SandboxProvider for LocalProcessSandbox {
    async fn create(&self, _resources: &SandboxResources) -> Result<String, SandboxError> {
        let sandbox_id = format!("sbx-{}", Uuid::new_v4());
        let workspace = self.workspace_root.join(&sandbox_id);
        tokio::fs::create_dir_all(&workspace)
            .await
            .map_err(|e| SandboxError::CreationFailed(e.to_string()))?;

        self.sandboxes.lock().await.insert(
            sandbox_id.clone(),
            LocalSandbox {
                workspace,
                ..Default::default()
            },
        );
        debug!(%sandbox_id, "local sandbox created");
        Ok(sandbox_id)
    }

    async fn write_file(
        &self,
        sandbox_id: &str,
        path: &str,
        content: &str,
    ) -> Result<(), SandboxError> {
        let workspace = {
            let sandboxes = self.sandboxes.lock().await;
            sandboxes
                .get(sandbox_id)
                .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?
                .workspace
                .clone()
        };

        // Paths are rooted in the sandbox workspace.
        let target = workspace.join(path.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::Provider(e.to_string()))?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| SandboxError::Provider(e.to_string()))
    }

    async fn exec(
        &self,
        sandbox_id: &str,
        spec: CommandSpec,
        output: Option<OutputHandler>,
    ) -> Result<CommandOutcome, SandboxError> {
        let workspace = {
            let sandboxes = self.sandboxes.lock().await;
            let sandbox = sandboxes
                .get(sandbox_id)
                .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
            sandbox.workspace.clone()
        };

        let cwd = spec
            .cwd
            .as_ref()
            .map(|c| workspace.join(c.trim_start_matches('/')))
            .unwrap_or_else(|| workspace.clone());

        let mut std_cmd = std::process::Command::new("sh");
        std_cmd.arg("-c").arg(&spec.command).current_dir(&cwd);
        for (key, value) in &spec.env {
            std_cmd.env(key, value);
        }
        {
            use std::os::unix::process::CommandExt;
            std_cmd.process_group(0);
        }

        let mut child = tokio::process::Command::from(std_cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SandboxError::CommandFailed(e.to_string()))?;

        let pid = child.id().map(|p| p as i32).unwrap_or(0);
        {
            let mut sandboxes = self.sandboxes.lock().await;
            if let Some(sandbox) = sandboxes.get_mut(sandbox_id) {
                sandbox.processes.push(TrackedProcess {
                    pid,
                    command: spec.command.clone(),
                });
                // Pause covers every process, including ones spawned while
                // the sandbox is suspended.
                if sandbox.paused {
                    Self::signal_group(pid, Signal::SIGSTOP);
                }
            }
        }

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");
        let stdout_task =
            tokio::spawn(Self::read_stream(stdout, OutputStream::Stdout, output.clone()));
        let stderr_task = tokio::spawn(Self::read_stream(stderr, OutputStream::Stderr, output));

        let (status, timed_out) = match spec.timeout {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(result) => (
                    Some(result.map_err(|e| SandboxError::CommandFailed(e.to_string()))?),
                    false,
                ),
                Err(_) => {
                    Self::signal_group(pid, Signal::SIGKILL);
                    let _ = child.wait().await;
                    (None, true)
                }
            },
            None => (
                Some(
                    child
                        .wait()
                        .await
                        .map_err(|e| SandboxError::CommandFailed(e.to_string()))?,
                ),
                false,
            ),
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        {
            let mut sandboxes = self.sandboxes.lock().await;
            if let Some(sandbox) = sandboxes.get_mut(sandbox_id) {
                sandbox.processes.retain(|p| p.pid != pid);
            }
        }

        Ok(CommandOutcome {
            exit_code: status.and_then(|s| s.code()).unwrap_or(-1),
            stdout,
            stderr,
            timed_out,
        })
    }

    async fn signal_matching(&self, sandbox_id: &str, pattern: &str) -> Result<(), SandboxError> {
        let sandboxes = self.sandboxes.lock().await;
        let sandbox = sandboxes
            .get(sandbox_id)
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;

        for process in &sandbox.processes {
            if process.command.contains(pattern) {
                warn!(pid = process.pid, pattern, "killing matching process");
                Self::signal_group(process.pid, Signal::SIGKILL);
            }
        }
        Ok(())
    }

    async fn pause(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        let mut sandboxes = self.sandboxes.lock().await;
        let sandbox = sandboxes
            .get_mut(sandbox_id)
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;

        for process in &sandbox.processes {
            Self::signal_group(process.pid, Signal::SIGSTOP);
        }
        sandbox.paused = true;
        Ok(())
    }

    async fn resume(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        let mut sandboxes = self.sandboxes.lock().await;
        let sandbox = sandboxes
            .get_mut(sandbox_id)
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;

        for process in &sandbox.processes {
            Self::signal_group(process.pid, Signal::SIGCONT);
        }
        sandbox.paused = false;
        Ok(())
    }

    async fn destroy(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        let sandbox = {
            let mut sandboxes = self.sandboxes.lock().await;
            sandboxes
                .remove(sandbox_id)
                .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?
        };

        for process in &sandbox.processes {
            // A paused group ignores SIGKILL until resumed.
            Self::signal_group(process.pid, Signal::SIGCONT);
            Self::signal_group(process.pid, Signal::SIGKILL);
        }
        if let Err(err) = tokio::fs::remove_dir_all(&sandbox.workspace).await {
            debug!(sandbox_id, %err, "workspace cleanup skipped");
        }
        Ok(())
    }
}
