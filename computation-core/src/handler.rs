//! Hooks through which callers take part in batch execution

use async_trait::async_trait;
use std::path::Path;

use crate::execution::{CommandExecution, ExecutionReport};

/// Caller logic around an engine-managed batch.
///
/// `before` prepares the working directory and returns the executions to run,
/// `after` turns the report into the caller's result. Returning `Ok(None)`
/// from `after` completes the batch without a value.
#[async_trait]
pub trait ExecutionHandler<R>: Send + Sync {
    async fn before(&self, working_dir: &Path) -> anyhow::Result<Vec<CommandExecution>>;

    /// Called after each (execution, index) completes, whatever its outcome
    fn on_progress(&self, _execution: &CommandExecution, _index: usize) {}

    async fn after(&self, working_dir: &Path, report: ExecutionReport) -> anyhow::Result<Option<R>>;
}

/// Progress notifications for a single execution started on a command executor
pub trait ExecutionListener: Send + Sync {
    /// Called once before the first index with the inclusive index range
    fn on_execution_start(&self, _from_index: usize, _to_index: usize) {}

    fn on_execution_completion(&self, _index: usize) {}

    fn on_end(&self, _report: &ExecutionReport) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        progress: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionHandler<usize> for CountingHandler {
        async fn before(&self, _working_dir: &Path) -> anyhow::Result<Vec<CommandExecution>> {
            let command = Arc::new(Command::simple("noop", "true").build()?);
            Ok(vec![CommandExecution::new(command, 2)?])
        }

        fn on_progress(&self, _execution: &CommandExecution, _index: usize) {
            self.progress.fetch_add(1, Ordering::SeqCst);
        }

        async fn after(&self, _working_dir: &Path, report: ExecutionReport) -> anyhow::Result<Option<usize>> {
            Ok(Some(report.errors().len()))
        }
    }

    #[tokio::test]
    async fn test_handler_hooks() {
        let handler = CountingHandler {
            progress: AtomicUsize::new(0),
        };
        let executions = handler.before(Path::new("/tmp")).await.unwrap();
        assert_eq!(executions.len(), 1);

        handler.on_progress(&executions[0], 0);
        handler.on_progress(&executions[0], 1);
        assert_eq!(handler.progress.load(Ordering::SeqCst), 2);

        let result = handler
            .after(Path::new("/tmp"), ExecutionReport::default())
            .await
            .unwrap();
        assert_eq!(result, Some(0));
    }
}
