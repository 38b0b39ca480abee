//! Asynchronous batches with cancellation
//!
//! A scheduled batch runs on the engine's worker pool: it opens a scoped
//! working directory, asks the handler for executions, waits for a core,
//! runs the executions and hands the report back to the handler. The caller
//! follows it through a [`ComputationHandle`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::{BatchControl, BatchExecutor, ProgressFn};
use crate::permits::PermitPool;
use crate::working_dir::WorkingDirectory;
use computation_core::{
    CommandExecution, ComputationError, ComputationResult, ExecutionEnvironment, ExecutionHandler,
};

/// Lifecycle of a scheduled batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Submitted, not started yet
    Created,
    /// Working directory open, handler preparing executions
    Staging,
    /// Holding a core permit
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Failed | BatchState::Cancelled)
    }
}

/// Caller's view of a scheduled batch.
///
/// Dropping the handle detaches it; the batch keeps running.
#[derive(Debug)]
pub struct ComputationHandle<R> {
    join: JoinHandle<ComputationResult<Option<R>>>,
    token: CancellationToken,
    state: watch::Receiver<BatchState>,
}

impl<R> ComputationHandle<R> {
    /// Request cancellation; running processes are terminated and the
    /// working directory is released
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn state(&self) -> BatchState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<BatchState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the batch outcome: the handler's result, or the error that
    /// stopped the batch
    pub async fn join(self) -> ComputationResult<Option<R>> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ComputationError::Cancelled),
            Err(e) => Err(ComputationError::WorkerPool(format!("batch task failed: {}", e))),
        }
    }
}

/// A batch waiting to be spawned on the worker pool
pub(crate) struct ScheduledBatch<R> {
    pub environment: ExecutionEnvironment,
    pub handler: Arc<dyn ExecutionHandler<R>>,
    pub local_dir: PathBuf,
    pub permits: Arc<PermitPool>,
    pub batch: BatchExecutor,
}

impl<R: Send + 'static> ScheduledBatch<R> {
    pub fn spawn(self, handle: &Handle) -> ComputationHandle<R> {
        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(BatchState::Created);
        let join = handle.spawn(self.run(token.clone(), state_tx));
        ComputationHandle {
            join,
            token,
            state: state_rx,
        }
    }

    async fn run(self, token: CancellationToken, state: watch::Sender<BatchState>) -> ComputationResult<Option<R>> {
        let result = self.run_in_working_dir(&token, &state).await;

        let final_state = match &result {
            Ok(_) => BatchState::Completed,
            Err(e) if e.is_cancelled() => {
                info!("Batch {} cancelled", self.environment.working_dir_prefix);
                BatchState::Cancelled
            }
            Err(e) => {
                warn!("Batch {} failed: {}", self.environment.working_dir_prefix, e);
                BatchState::Failed
            }
        };
        state.send_replace(final_state);
        result
    }

    async fn run_in_working_dir(
        &self,
        token: &CancellationToken,
        state: &watch::Sender<BatchState>,
    ) -> ComputationResult<Option<R>> {
        if token.is_cancelled() {
            return Err(ComputationError::Cancelled);
        }

        let mut working_dir = WorkingDirectory::scoped(
            &self.local_dir,
            &self.environment.working_dir_prefix,
            self.environment.debug,
        )?;
        let result = self.run_batch(working_dir.path(), token, state).await;

        if let Err(e) = working_dir.close() {
            warn!("Failed to release working directory {}: {}", working_dir.path().display(), e);
        }
        result
    }

    async fn run_batch(
        &self,
        working_dir: &Path,
        token: &CancellationToken,
        state: &watch::Sender<BatchState>,
    ) -> ComputationResult<Option<R>> {
        state.send_replace(BatchState::Staging);
        let executions = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ComputationError::Cancelled),
            executions = self.handler.before(working_dir) => executions?,
        };

        let control = BatchControl::new(token.clone());
        let report = {
            let on_progress = |execution: &CommandExecution, index: usize| self.handler.on_progress(execution, index);
            let progress: ProgressFn<'_> = &on_progress;

            let batch = async {
                let _permit = self.permits.enter().await?;
                state.send_replace(BatchState::Running);
                debug!("Running {} execution(s) in {}", executions.len(), working_dir.display());
                self.batch
                    .execute_with(working_dir, &executions, &self.environment.variables, Some(progress), &control)
                    .await
            };
            tokio::pin!(batch);

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    if let Err(e) = self.batch.runner().terminate(working_dir).await {
                        warn!("Failed to terminate processes in {}: {}", working_dir.display(), e);
                    }
                    // a staging task may still be writing into the directory;
                    // the in-flight batch and its permit are dropped on return
                    control.cancel_and_wait().await;
                    return Err(ComputationError::Cancelled);
                }
                report = &mut batch => report?,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ComputationError::Cancelled),
            result = self.handler.after(working_dir, report) => Ok(result?),
        }
    }
}
