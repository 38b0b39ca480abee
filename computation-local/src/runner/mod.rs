//! Platform process runners
//!
//! A [`ProcessRunner`] starts one program in a working directory, waits for
//! it and reports its exit code. Runners track the processes they started per
//! working directory so that a cancelled batch can be terminated.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tracing::{debug, warn};

use computation_core::{ComputationError, ComputationResult};

#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub use unix::UnixProcessRunner;
#[cfg(windows)]
pub use windows::WindowsProcessRunner;

/// Everything needed to start one program
#[derive(Debug, Clone, Copy)]
pub struct ProcessSpec<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    pub working_dir: &'a Path,
    /// Standard output, opened in append mode
    pub stdout: &'a Path,
    /// Standard error, opened in append mode
    pub stderr: &'a Path,
    /// Variables set on top of the inherited environment
    pub variables: &'a HashMap<String, String>,
}

#[async_trait]
pub trait ProcessRunner: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Run the program to completion and return its exit code
    async fn run(&self, spec: ProcessSpec<'_>) -> ComputationResult<i32>;

    /// Forcibly stop every process this runner started in `working_dir`
    async fn terminate(&self, working_dir: &Path) -> ComputationResult<()>;
}

/// Runner for the host operating system
#[cfg(unix)]
pub fn platform_runner() -> ComputationResult<Arc<dyn ProcessRunner>> {
    Ok(Arc::new(UnixProcessRunner::new()))
}

/// Runner for the host operating system
#[cfg(windows)]
pub fn platform_runner() -> ComputationResult<Arc<dyn ProcessRunner>> {
    Ok(Arc::new(WindowsProcessRunner::new()))
}

/// Runner for the host operating system
#[cfg(not(any(unix, windows)))]
pub fn platform_runner() -> ComputationResult<Arc<dyn ProcessRunner>> {
    Err(ComputationError::UnsupportedPlatform(std::env::consts::OS.to_string()))
}

/// Process ids of running children, keyed by working directory
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    running: Mutex<HashMap<PathBuf, Vec<u32>>>,
}

/// Keeps a pid registered until dropped
pub struct Registration<'a> {
    registry: &'a ProcessRegistry,
    working_dir: PathBuf,
    pid: u32,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut running = self.registry.running.lock();
        if let Some(pids) = running.get_mut(&self.working_dir) {
            pids.retain(|pid| *pid != self.pid);
            if pids.is_empty() {
                running.remove(&self.working_dir);
            }
        }
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, working_dir: &Path, pid: u32) -> Registration<'_> {
        self.running
            .lock()
            .entry(working_dir.to_path_buf())
            .or_default()
            .push(pid);
        Registration {
            registry: self,
            working_dir: working_dir.to_path_buf(),
            pid,
        }
    }

    pub fn pids(&self, working_dir: &Path) -> Vec<u32> {
        self.running
            .lock()
            .get(working_dir)
            .cloned()
            .unwrap_or_default()
    }
}

/// Set `variables` on `command`; names ending in `PATH` are prepended to the
/// inherited value
pub(crate) fn apply_variables(command: &mut std::process::Command, variables: &HashMap<String, String>) {
    for (name, value) in variables {
        if name.ends_with("PATH") {
            if let Some(inherited) = std::env::var_os(name) {
                let paths = std::iter::once(PathBuf::from(value)).chain(std::env::split_paths(&inherited));
                match std::env::join_paths(paths) {
                    Ok(joined) => {
                        command.env(name, joined);
                        continue;
                    }
                    Err(e) => warn!("Cannot prepend {} to inherited {}: {}", value, name, e),
                }
            }
        }
        command.env(name, value);
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Exit code of a finished process; a signal `n` maps to `128 + n`
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Wire redirections and environment, spawn, register and wait
pub(crate) async fn spawn_and_wait(
    mut command: std::process::Command,
    spec: ProcessSpec<'_>,
    registry: &ProcessRegistry,
) -> ComputationResult<i32> {
    apply_variables(&mut command, spec.variables);
    command
        .current_dir(spec.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(open_append(spec.stdout)?))
        .stderr(Stdio::from(open_append(spec.stderr)?));

    let mut command = tokio::process::Command::from(command);
    command.kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| ComputationError::Spawn {
        program: spec.program.to_string(),
        source,
    })?;
    let _registration = child.id().map(|pid| {
        debug!("Started {} with pid {}", spec.program, pid);
        registry.register(spec.working_dir, pid)
    });

    let status = child.wait().await?;
    Ok(exit_code(status))
}
