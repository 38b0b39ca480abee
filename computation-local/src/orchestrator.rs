//! Sequential execution of a batch inside one working directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::runner::{ProcessRunner, ProcessSpec};
use crate::staging;
use computation_core::{
    Command, CommandExecution, CommandKind, ComputationError, ComputationResult, ExecutionError,
    ExecutionReport, ProgramInvocation,
};

/// Callback fired after every (execution, index), whatever its outcome
pub type ProgressFn<'a> = &'a (dyn Fn(&CommandExecution, usize) + Send + Sync);

/// Cancellation and bookkeeping for the blocking staging work of one batch.
///
/// Dropping a batch future does not stop a staging task already running on
/// the blocking pool. Owners that release the working directory after a
/// cancellation call [`cancel_and_wait`](Self::cancel_and_wait) first.
#[derive(Debug, Clone, Default)]
pub struct BatchControl {
    token: CancellationToken,
    tasks: TaskTracker,
}

impl BatchControl {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            tasks: TaskTracker::new(),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel staging and wait until no staging task touches the directory
    pub async fn cancel_and_wait(&self) {
        self.token.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    async fn blocking<F>(&self, f: F) -> ComputationResult<()>
    where
        F: FnOnce() -> ComputationResult<()> + Send + 'static,
    {
        self.tasks
            .spawn_blocking(f)
            .await
            .map_err(|e| ComputationError::WorkerPool(format!("staging task failed: {}", e)))?
    }
}

/// Runs executions one index at a time: stage inputs, run, stage outputs
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    common_dir: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl BatchExecutor {
    pub fn new(common_dir: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            common_dir: common_dir.into(),
            runner,
        }
    }

    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    /// Run every index of every execution in order.
    ///
    /// A nonzero exit code is recorded in the report and the batch goes on.
    /// Staging and spawn failures abort the batch with an error.
    pub async fn execute(
        &self,
        working_dir: &Path,
        executions: &[CommandExecution],
        variables: &HashMap<String, String>,
        progress: Option<ProgressFn<'_>>,
    ) -> ComputationResult<ExecutionReport> {
        self.execute_with(working_dir, executions, variables, progress, &BatchControl::default())
            .await
    }

    /// Like [`execute`](Self::execute), with staging tracked by `control`
    pub async fn execute_with(
        &self,
        working_dir: &Path,
        executions: &[CommandExecution],
        variables: &HashMap<String, String>,
        progress: Option<ProgressFn<'_>>,
        control: &BatchControl,
    ) -> ComputationResult<ExecutionReport> {
        let mut errors = Vec::new();

        for execution in executions {
            let command = execution.command();
            for index in 0..execution.execution_count() {
                self.stage_inputs(working_dir, command, index, control).await?;

                let variables = execution.execution_variables(variables, index);
                let exit_code = self.run_command(working_dir, command, index, &variables).await?;

                if exit_code != 0 {
                    errors.push(ExecutionError::new(Arc::clone(command), index, exit_code));
                } else {
                    self.stage_outputs(working_dir, command, index, control).await?;
                }

                if let Some(progress) = progress {
                    progress(execution, index);
                }
            }
        }

        Ok(ExecutionReport::new(errors))
    }

    async fn run_command(
        &self,
        working_dir: &Path,
        command: &Command,
        index: usize,
        variables: &HashMap<String, String>,
    ) -> ComputationResult<i32> {
        let stdout = working_dir.join(command.stdout_file_name(index));
        let stderr = working_dir.join(command.stderr_file_name(index));
        tokio::fs::File::create(&stdout).await?;
        tokio::fs::File::create(&stderr).await?;

        debug!("Executing {}", command.describe(index));

        let run = |invocation: &ProgramInvocation| {
            let args = invocation.args(index);
            let stdout = &stdout;
            let stderr = &stderr;
            let program = invocation.program.clone();
            async move {
                self.runner
                    .run(ProcessSpec {
                        program: &program,
                        args: &args,
                        working_dir,
                        stdout,
                        stderr,
                        variables,
                    })
                    .await
            }
        };

        match command.kind() {
            CommandKind::Simple(invocation) => run(invocation).await,
            CommandKind::Group { sub_commands } => {
                for sub_command in sub_commands {
                    let exit_code = run(sub_command).await?;
                    if exit_code != 0 {
                        return Ok(exit_code);
                    }
                }
                Ok(0)
            }
        }
    }

    async fn stage_inputs(
        &self,
        working_dir: &Path,
        command: &Arc<Command>,
        index: usize,
        control: &BatchControl,
    ) -> ComputationResult<()> {
        if command.inputs().is_empty() {
            return Ok(());
        }
        let working_dir = working_dir.to_path_buf();
        let common_dir = self.common_dir.clone();
        let command = Arc::clone(command);
        let token = control.token().clone();
        control
            .blocking(move || staging::stage_inputs(&working_dir, &common_dir, command.inputs(), index, &token))
            .await
    }

    async fn stage_outputs(
        &self,
        working_dir: &Path,
        command: &Arc<Command>,
        index: usize,
        control: &BatchControl,
    ) -> ComputationResult<()> {
        if command.outputs().is_empty() {
            return Ok(());
        }
        let working_dir = working_dir.to_path_buf();
        let command = Arc::clone(command);
        control
            .blocking(move || staging::stage_outputs(&working_dir, command.outputs(), index))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRunner;
    use computation_core::{FilePostProcessor, InputFile, OutputFile};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let working = root.path().join("working");
        let common = root.path().join("common");
        fs::create_dir(&working).unwrap();
        fs::create_dir(&common).unwrap();
        (root, working, common)
    }

    #[tokio::test]
    async fn test_group_stops_at_first_failure() {
        let (_root, working, common) = setup();
        let runner = Arc::new(MockRunner::with_exit_codes([0, 0, 3, 0]));
        let executor = BatchExecutor::new(&common, runner.clone());

        let command = Command::group("chain")
            .sub_command("a", Vec::<String>::new())
            .sub_command("b", Vec::<String>::new())
            .sub_command("c", Vec::<String>::new())
            .sub_command("d", Vec::<String>::new())
            .build()
            .unwrap();
        let execution = CommandExecution::new(command, 1).unwrap();

        let report = executor
            .execute(&working, &[execution], &HashMap::new(), None)
            .await
            .unwrap();

        assert_eq!(runner.programs(), vec!["a", "b", "c"]);
        assert_eq!(report.errors().len(), 1);
        assert_eq!(report.errors()[0].exit_code(), 3);
        assert_eq!(report.errors()[0].index(), 0);
    }

    #[tokio::test]
    async fn test_failed_index_skips_output_staging() {
        let (_root, working, common) = setup();
        let runner = Arc::new(MockRunner::with_exit_codes([0, 1]).writing("result_{index}.txt"));
        let executor = BatchExecutor::new(&common, runner.clone());

        let command = Command::simple("solve", "solver")
            .arg("{index}")
            .output(OutputFile::with_post_processor("result_{index}.txt", FilePostProcessor::FileGzip))
            .build()
            .unwrap();
        let progress_calls = AtomicUsize::new(0);
        let progress = |_: &CommandExecution, _: usize| {
            progress_calls.fetch_add(1, Ordering::SeqCst);
        };
        let progress: ProgressFn<'_> = &progress;

        let report = executor
            .execute(
                &working,
                &[CommandExecution::new(command, 2).unwrap()],
                &HashMap::new(),
                Some(progress),
            )
            .await
            .unwrap();

        assert_eq!(report.errors().len(), 1);
        assert_eq!(report.errors()[0].index(), 1);
        assert_eq!(report.errors()[0].exit_code(), 1);
        assert!(working.join("result_0.txt.gz").is_file());
        assert!(working.join("result_1.txt").is_file());
        assert!(!working.join("result_1.txt.gz").exists());
        assert_eq!(progress_calls.load(Ordering::SeqCst), 2);
        assert_eq!(runner.args(), vec![vec!["0".to_string()], vec!["1".to_string()]]);
    }

    #[tokio::test]
    async fn test_missing_input_aborts_before_spawning() {
        let (_root, working, common) = setup();
        let runner = Arc::new(MockRunner::default());
        let executor = BatchExecutor::new(&common, runner.clone());

        let command = Command::simple("load", "loader")
            .input(InputFile::new("absent.xiidm"))
            .build()
            .unwrap();

        let err = executor
            .execute(&working, &[CommandExecution::new(command, 1).unwrap()], &HashMap::new(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ComputationError::MissingInputFile(name) if name == "absent.xiidm"));
        assert!(runner.programs().is_empty());
    }

    #[tokio::test]
    async fn test_staging_error_discards_recorded_failures() {
        let (_root, working, common) = setup();
        let runner = Arc::new(MockRunner::with_exit_codes([5]));
        let executor = BatchExecutor::new(&common, runner.clone());

        let first = Command::simple("first", "a").build().unwrap();
        let second = Command::simple("second", "b")
            .input(InputFile::new("never_there.txt"))
            .build()
            .unwrap();
        let executions = [
            CommandExecution::new(first, 1).unwrap(),
            CommandExecution::new(second, 1).unwrap(),
        ];

        let result = executor.execute(&working, &executions, &HashMap::new(), None).await;
        assert!(matches!(result, Err(ComputationError::MissingInputFile(_))));
        assert_eq!(runner.programs(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_cancelled_control_skips_staging_and_spawning() {
        let (_root, working, common) = setup();
        fs::write(common.join("shared.txt"), b"shared").unwrap();
        let runner = Arc::new(MockRunner::default());
        let executor = BatchExecutor::new(&common, runner.clone());

        let command = Command::simple("load", "loader")
            .input(InputFile::new("shared.txt"))
            .build()
            .unwrap();
        let control = BatchControl::default();
        control.cancel_and_wait().await;

        let err = executor
            .execute_with(&working, &[CommandExecution::new(command, 1).unwrap()], &HashMap::new(), None, &control)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!working.join("shared.txt").exists());
        assert!(runner.programs().is_empty());
    }

    #[tokio::test]
    async fn test_variables_and_output_files_per_index() {
        let (_root, working, common) = setup();
        let runner = Arc::new(MockRunner::default());
        let executor = BatchExecutor::new(&common, runner.clone());

        let command = Command::simple("export", "exporter").build().unwrap();
        let execution = CommandExecution::new(command, 2)
            .unwrap()
            .with_variables(HashMap::from([("MODE".to_string(), "batch".to_string())]))
            .with_index_variables(1, HashMap::from([("MODE".to_string(), "last".to_string())]));
        let base = HashMap::from([("HOME_DIR".to_string(), "/opt".to_string())]);

        let report = executor.execute(&working, &[execution], &base, None).await.unwrap();
        assert!(report.is_ok());

        let variables = runner.variables();
        assert_eq!(variables[0]["MODE"], "batch");
        assert_eq!(variables[1]["MODE"], "last");
        assert_eq!(variables[1]["HOME_DIR"], "/opt");
        assert!(working.join("export_0.out").is_file());
        assert!(working.join("export_1.err").is_file());
    }
}
