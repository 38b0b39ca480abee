//! Unix process runner
//!
//! Programs are spawned directly, each as the leader of a new process group,
//! so that termination reaches the whole process tree.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use tracing::{debug, warn};

use super::{spawn_and_wait, ProcessRegistry, ProcessRunner, ProcessSpec};
use computation_core::{ComputationError, ComputationResult};

#[derive(Debug, Default)]
pub struct UnixProcessRunner {
    registry: ProcessRegistry,
}

impl UnixProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessRunner for UnixProcessRunner {
    fn name(&self) -> &'static str {
        "unix"
    }

    async fn run(&self, spec: ProcessSpec<'_>) -> ComputationResult<i32> {
        let mut command = std::process::Command::new(spec.program);
        command.args(spec.args).process_group(0);
        spawn_and_wait(command, spec, &self.registry).await
    }

    async fn terminate(&self, working_dir: &Path) -> ComputationResult<()> {
        let mut failures = Vec::new();
        for pid in self.registry.pids(working_dir) {
            let Ok(raw) = i32::try_from(pid) else {
                failures.push(format!("pid {} out of range", pid));
                continue;
            };
            match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
                Ok(()) => debug!("Killed process group {}", pid),
                // already gone
                Err(Errno::ESRCH) => {}
                Err(e) => {
                    warn!("Failed to kill process group {}: {}", pid, e);
                    failures.push(format!("process group {}: {}", pid, e));
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
