//! Scripted process runner for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::runner::{ProcessRunner, ProcessSpec};
use computation_core::{ComputationError, ComputationResult, INDEX_PLACEHOLDER};

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub variables: HashMap<String, String>,
    pub working_dir: PathBuf,
}

/// Returns scripted exit codes (0 once the script runs out) and records calls
#[derive(Debug, Default)]
pub(crate) struct MockRunner {
    exit_codes: Mutex<VecDeque<i32>>,
    output_template: Option<String>,
    delay: Option<Duration>,
    hang: bool,
    fail_terminate: bool,
    calls: Mutex<Vec<RecordedCall>>,
    terminations: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl MockRunner {
    pub fn with_exit_codes(codes: impl IntoIterator<Item = i32>) -> Self {
        Self {
            exit_codes: Mutex::new(codes.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Create this file in the working directory on every run; `{index}` is
    /// replaced by the first argument
    pub fn writing(mut self, template: &str) -> Self {
        self.output_template = Some(template.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Never finish on its own
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn failing_terminate(mut self) -> Self {
        self.fail_terminate = true;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.program).collect()
    }

    pub fn args(&self) -> Vec<Vec<String>> {
        self.calls().into_iter().map(|call| call.args).collect()
    }

    pub fn variables(&self) -> Vec<HashMap<String, String>> {
        self.calls().into_iter().map(|call| call.variables).collect()
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, spec: ProcessSpec<'_>) -> ComputationResult<i32> {
        self.calls.lock().push(RecordedCall {
            program: spec.program.to_string(),
            args: spec.args.to_vec(),
            variables: spec.variables.clone(),
            working_dir: spec.working_dir.to_path_buf(),
        });

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(template) = &self.output_template {
            let index = spec.args.first().map(String::as_str).unwrap_or("0");
            let name = template.replace(INDEX_PLACEHOLDER, index);
            std::fs::write(spec.working_dir.join(name), b"mock output")?;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(self.exit_codes.lock().pop_front().unwrap_or(0))
    }

    async fn terminate(&self, _working_dir: &Path) -> ComputationResult<()> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        if self.fail_terminate {
            return Err(ComputationError::Io(std::io::Error::other("terminate refused")));
        }
        Ok(())
    }
}
