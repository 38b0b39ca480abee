//! Windows process runner
//!
//! Programs are started through `cmd /C` so that batch files and shell
//! built-ins resolve the way they do at a prompt. Termination kills the
//! whole tree with `taskkill`.

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Stdio;
use tracing::{debug, warn};

use super::{spawn_and_wait, ProcessRegistry, ProcessRunner, ProcessSpec};
use computation_core::{ComputationError, ComputationResult};

#[derive(Debug, Default)]
pub struct WindowsProcessRunner {
    registry: ProcessRegistry,
}

impl WindowsProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessRunner for WindowsProcessRunner {
    fn name(&self) -> &'static str {
        "windows"
    }

    async fn run(&self, spec: ProcessSpec<'_>) -> ComputationResult<i32> {
        let mut command = std::process::Command::new("cmd");
        command.arg("/C").arg(spec.program).args(spec.args);
        spawn_and_wait(command, spec, &self.registry).await
    }

    async fn terminate(&self, working_dir: &Path) -> ComputationResult<()> {
        let mut failures = Vec::new();
        for pid in self.registry.pids(working_dir) {
            let status = tokio::process::Command::new("taskkill")
                .args(["/F", "/T", "/PID", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            match status {
                Ok(status) if status.success() => debug!("Killed process tree {}", pid),
                Ok(status) => {
                    warn!("taskkill for pid {} exited with {}", pid, status);
                    failures.push(format!("pid {}: {}", pid, status));
                }
                Err(e) => {
                    warn!("Failed to run taskkill for pid {}: {}", pid, e);
                    failures.push(format!("pid {}: {}", pid, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ComputationError::Io(io::Error::other(format!(
                "failed to terminate processes in {}: {}",
                working_dir.display(),
                failures.join(", ")
            ))))
        }
    }
}
