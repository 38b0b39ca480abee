//! Caller-driven execution in a caller-owned working directory
//!
//! A [`CommandExecutor`] is obtained from
//! [`LocalComputationManager::new_command_executor`](crate::LocalComputationManager::new_command_executor).
//! Unlike scheduled batches, the caller decides when to run executions and
//! when to release the directory.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

use crate::orchestrator::{BatchExecutor, ProgressFn};
use crate::permits::PermitPool;
use crate::working_dir::WorkingDirectory;
use computation_core::{CommandExecution, ComputationResult, ExecutionListener, ExecutionReport};

pub struct CommandExecutor {
    working_dir: WorkingDirectory,
    variables: HashMap<String, String>,
    batch: BatchExecutor,
    permits: Arc<PermitPool>,
    handle: Handle,
}

impl CommandExecutor {
    pub(crate) fn new(
        working_dir: WorkingDirectory,
        variables: HashMap<String, String>,
        batch: BatchExecutor,
        permits: Arc<PermitPool>,
        handle: Handle,
    ) -> Self {
        Self {
            working_dir,
            variables,
            batch,
            permits,
            handle,
        }
    }

    pub fn working_dir(&self) -> &Path {
        self.working_dir.path()
    }

    /// Run every index of `execution` under one core permit
    pub async fn start(&self, execution: CommandExecution) -> ComputationResult<ExecutionReport> {
        self.run(std::slice::from_ref(&execution)).await
    }

    /// Like [`start`](Self::start), notifying `listener` of progress
    pub async fn start_with_listener(
        &self,
        execution: CommandExecution,
        listener: &dyn ExecutionListener,
    ) -> ComputationResult<ExecutionReport> {
        listener.on_execution_start(0, execution.execution_count() - 1);

        let on_completion = |_: &CommandExecution, index: usize| listener.on_execution_completion(index);
        let progress: ProgressFn<'_> = &on_completion;
        let report = self
            .execute(std::slice::from_ref(&execution), Some(progress))
            .await?;

        listener.on_end(&report);
        Ok(report)
    }

    /// Run several executions in order under one core permit
    pub async fn run(&self, executions: &[CommandExecution]) -> ComputationResult<ExecutionReport> {
        self.execute(executions, None).await
    }

    async fn execute(
        &self,
        executions: &[CommandExecution],
        progress: Option<ProgressFn<'_>>,
    ) -> ComputationResult<ExecutionReport> {
        let _permit = self.permits.enter().await?;
        debug!(
            "Running {} execution(s) in {}",
            executions.len(),
            self.working_dir.path().display()
        );
        self.batch
            .execute(self.working_dir.path(), executions, &self.variables, progress)
            .await
    }

    /// Blocking [`start`](Self::start); must not be called from an async context
    pub fn start_blocking(&self, execution: CommandExecution) -> ComputationResult<ExecutionReport> {
        self.handle.block_on(self.start(execution))
    }

    /// Blocking [`start_with_listener`](Self::start_with_listener); must not be
    /// called from an async context
    pub fn start_with_listener_blocking(
        &self,
        execution: CommandExecution,
        listener: &dyn ExecutionListener,
    ) -> ComputationResult<ExecutionReport> {
        self.handle.block_on(self.start_with_listener(execution, listener))
    }

    /// Blocking [`run`](Self::run); must not be called from an async context
    pub fn run_blocking(&self, executions: &[CommandExecution]) -> ComputationResult<ExecutionReport> {
        self.handle.block_on(self.run(executions))
    }

    /// Release the working directory, keeping it when opened in debug mode
    pub fn close(&mut self) -> ComputationResult<()> {
        self.working_dir.close()?;
        Ok(())
    }
}
