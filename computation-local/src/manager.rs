//! Local computation manager
//!
//! The manager owns the engine resources: the worker pool, the core permits,
//! the process runner and the common directory shared by every batch.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

use crate::executor::CommandExecutor;
use crate::orchestrator::BatchExecutor;
use crate::permits::PermitPool;
use crate::pool::WorkerPool;
use crate::runner::{platform_runner, ProcessRunner};
use crate::scheduler::{ComputationHandle, ScheduledBatch};
use crate::working_dir::WorkingDirectory;
use computation_config::{ConfigError, LocalComputationConfig, Validatable};
use computation_core::{ComputationError, ComputationResult, ExecutionEnvironment, ExecutionHandler, ResourcesStatus};

/// Version reported by local managers, which have no remote engine
pub const LOCAL_VERSION: &str = "none (local mode)";

pub(crate) fn config_error(error: ConfigError) -> ComputationError {
    ComputationError::Config(error.to_string())
}

pub struct LocalComputationManager {
    // declared first so running batches are dropped before the common
    // directory is removed
    pool: WorkerPool,
    config: LocalComputationConfig,
    permits: Arc<PermitPool>,
    batch: BatchExecutor,
    common_dir: Mutex<WorkingDirectory>,
    common_path: PathBuf,
}

impl LocalComputationManager {
    /// Create a manager using the runner for the host operating system
    pub fn new(config: LocalComputationConfig) -> ComputationResult<Self> {
        let runner = platform_runner()?;
        Self::with_runner(config, runner)
    }

    /// Create a manager with a dedicated worker pool and the given runner
    pub fn with_runner(config: LocalComputationConfig, runner: Arc<dyn ProcessRunner>) -> ComputationResult<Self> {
        config.validate().map_err(config_error)?;
        let pool = WorkerPool::new(config.available_core)?;
        Self::build(config, runner, pool)
    }

    /// Create a manager whose batches run on an existing runtime
    pub fn with_handle(
        config: LocalComputationConfig,
        runner: Arc<dyn ProcessRunner>,
        handle: Handle,
    ) -> ComputationResult<Self> {
        config.validate().map_err(config_error)?;
        Self::build(config, runner, WorkerPool::from_handle(handle))
    }

    fn build(config: LocalComputationConfig, runner: Arc<dyn ProcessRunner>, pool: WorkerPool) -> ComputationResult<Self> {
        info!("{}", config);
        let common_dir = WorkingDirectory::common(&config.local_dir)?;
        let common_path = common_dir.path().to_path_buf();
        info!("Using {} process runner, common directory {}", runner.name(), common_path.display());

        Ok(Self {
            pool,
            permits: Arc::new(PermitPool::new(config.available_core)),
            batch: BatchExecutor::new(&common_path, runner),
            common_dir: Mutex::new(common_dir),
            common_path,
            config,
        })
    }

    pub fn version(&self) -> &'static str {
        LOCAL_VERSION
    }

    pub fn config(&self) -> &LocalComputationConfig {
        &self.config
    }

    pub fn local_dir(&self) -> &Path {
        &self.config.local_dir
    }

    pub fn common_dir(&self) -> &Path {
        &self.common_path
    }

    /// Runtime on which batches run, for callers scheduling their own work
    pub fn handle(&self) -> &Handle {
        self.pool.handle()
    }

    pub fn resources_status(&self) -> ResourcesStatus {
        self.permits.status()
    }

    /// Create (or truncate) a file in the common directory
    pub fn new_common_file(&self, name: &str) -> ComputationResult<BufWriter<File>> {
        let file = File::create(self.common_path.join(name))?;
        Ok(BufWriter::new(file))
    }

    /// Open a caller-owned working directory for synchronous execution
    pub fn new_command_executor(
        &self,
        variables: HashMap<String, String>,
        working_dir_prefix: &str,
        debug: bool,
    ) -> ComputationResult<CommandExecutor> {
        let working_dir = WorkingDirectory::scoped(&self.config.local_dir, working_dir_prefix, debug)?;
        Ok(CommandExecutor::new(
            working_dir,
            variables,
            self.batch.clone(),
            Arc::clone(&self.permits),
            self.pool.handle().clone(),
        ))
    }

    /// Schedule a batch on the worker pool and return immediately
    pub fn execute<R, H>(&self, environment: ExecutionEnvironment, handler: H) -> ComputationHandle<R>
    where
        R: Send + 'static,
        H: ExecutionHandler<R> + 'static,
    {
        ScheduledBatch {
            environment,
            handler: Arc::new(handler),
            local_dir: self.config.local_dir.clone(),
            permits: Arc::clone(&self.permits),
            batch: self.batch.clone(),
        }
        .spawn(self.pool.handle())
    }

    /// Release the common directory; later calls do nothing
    pub fn close(&self) -> ComputationResult<()> {
        self.common_dir.lock().close()?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.common_dir.lock().is_closed()
    }
}

impl std::fmt::Debug for LocalComputationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComputationManager")
            .field("config", &self.config)
            .field("common_dir", &self.common_path)
            .field("runner", &self.batch.runner().name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRunner;
    use async_trait::async_trait;
    use computation_core::{Command, CommandExecution, ComputationError, ExecutionReport, InputFile};
    use std::io::Write;

    struct CopyHandler;

    #[async_trait]
    impl ExecutionHandler<bool> for CopyHandler {
        async fn before(&self, _working_dir: &Path) -> anyhow::Result<Vec<CommandExecution>> {
            let command = Command::simple("use-common", "reader")
                .input(InputFile::new("shared.txt"))
                .build()?;
            Ok(vec![CommandExecution::new(command, 1)?])
        }

        async fn after(&self, working_dir: &Path, report: ExecutionReport) -> anyhow::Result<Option<bool>> {
            Ok(Some(report.is_ok() && working_dir.join("shared.txt").is_file()))
        }
    }

    fn config(base: &Path, cores: usize) -> LocalComputationConfig {
        LocalComputationConfig::new(base).with_available_core(cores)
    }

    #[test]
    fn test_manager_lifecycle() {
        let base = tempfile::tempdir().unwrap();
        let manager = LocalComputationManager::with_runner(config(base.path(), 3), Arc::new(MockRunner::default())).unwrap();

        assert_eq!(manager.version(), "none (local mode)");
        assert_eq!(manager.local_dir(), base.path());
        assert!(manager.common_dir().starts_with(base.path()));
        assert!(manager.common_dir().is_dir());

        let status = manager.resources_status();
        assert_eq!(status.available_cores, 3);
        assert_eq!(status.busy_cores, 0);

        let common = manager.common_dir().to_path_buf();
        manager.close().unwrap();
        manager.close().unwrap();
        assert!(manager.is_closed());
        assert!(!common.exists());
    }

    #[test]
    fn test_handle_runs_caller_work() {
        let base = tempfile::tempdir().unwrap();
        let manager = LocalComputationManager::with_runner(config(base.path(), 2), Arc::new(MockRunner::default())).unwrap();

        let task = manager.handle().spawn(async { 6 * 7 });
        assert_eq!(manager.handle().block_on(task).unwrap(), 42);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let base = tempfile::tempdir().unwrap();
        let err = LocalComputationManager::with_runner(config(base.path(), 0), Arc::new(MockRunner::default())).unwrap_err();
        match err {
            ComputationError::Config(message) => assert!(message.contains("available_core")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_common_file_is_visible_to_batches() {
        let base = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::default());
        let manager = LocalComputationManager::with_runner(config(base.path(), 2), runner.clone()).unwrap();

        let mut writer = manager.new_common_file("shared.txt").unwrap();
        writer.write_all(b"shared").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let handle = manager.execute(ExecutionEnvironment::new(HashMap::new(), "copy_", false), CopyHandler);
        let result = futures::executor::block_on(handle.join()).unwrap();

        assert_eq!(result, Some(true));
        assert_eq!(runner.programs(), vec!["reader"]);
        assert_eq!(std::fs::read(manager.common_dir().join("shared.txt")).unwrap(), b"shared");
    }

    #[tokio::test]
    async fn test_manager_on_existing_runtime() {
        let base = tempfile::tempdir().unwrap();
        let manager = LocalComputationManager::with_handle(
            config(base.path(), 1),
            Arc::new(MockRunner::default()),
            Handle::current(),
        )
        .unwrap();

        let mut writer = manager.new_common_file("shared.txt").unwrap();
        writer.write_all(b"x").unwrap();
        drop(writer);

        let handle = manager.execute(ExecutionEnvironment::new(HashMap::new(), "rt_", false), CopyHandler);
        assert_eq!(handle.join().await.unwrap(), Some(true));
    }

    #[test]
    fn test_drop_releases_common_directory() {
        let base = tempfile::tempdir().unwrap();
        let common = {
            let manager =
                LocalComputationManager::with_runner(config(base.path(), 1), Arc::new(MockRunner::default())).unwrap();
            manager.common_dir().to_path_buf()
        };
        assert!(!common.exists());
    }
}
